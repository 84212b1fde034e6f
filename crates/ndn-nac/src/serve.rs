//! Answers Interests from a [`RetainingCache`].

use std::sync::Arc;

use ndn_nac_core::{Interest, Name};
use ndn_nac_face::{Face, InterestHandler};
use ndn_nac_store::RetainingCache;

/// Interest handler that serves whatever a component has published.
pub(crate) struct ServeFromCache {
    cache: Arc<RetainingCache>,
    /// Label for log lines, e.g. "KEK/KDK".
    what: &'static str,
}

impl ServeFromCache {
    pub(crate) fn new(cache: Arc<RetainingCache>, what: &'static str) -> Arc<Self> {
        Arc::new(Self { cache, what })
    }
}

impl InterestHandler for ServeFromCache {
    fn on_interest(&self, _prefix: &Name, interest: &Interest, face: &dyn Face) {
        match self.cache.find(interest) {
            Some(data) => {
                tracing::debug!(name = %data.name, "Serving {} from storage", self.what);
                if let Err(e) = face.put_data(&data) {
                    tracing::warn!(name = %data.name, error = %e, "put_data failed");
                }
            }
            None => {
                tracing::debug!(name = %interest.name, "Didn't find {} data", self.what);
            }
        }
    }
}
