//! Face abstraction for expressing Interests and serving Data.
//!
//! Implementations may sit on a real forwarder or, as in [`memory`], on an
//! in-process network.

use async_trait::async_trait;
use std::sync::Arc;

use ndn_nac_core::{Data, Interest, Name};

use crate::error::Result;

/// Handle for a prefix registration, used to withdraw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisteredPrefixId(pub u64);

/// Receives Interests under a registered prefix.
///
/// Handlers answer by calling [`Face::put_data`] on the face they are given.
/// Not answering lets the Interest time out.
pub trait InterestHandler: Send + Sync {
    fn on_interest(&self, prefix: &Name, interest: &Interest, face: &dyn Face);
}

impl<F> InterestHandler for F
where
    F: Fn(&Name, &Interest, &dyn Face) + Send + Sync,
{
    fn on_interest(&self, prefix: &Name, interest: &Interest, face: &dyn Face) {
        self(prefix, interest, face)
    }
}

/// Face trait for the network operations the access-control components need.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Face: Send + Sync {
    /// Send an Interest and wait for the matching Data, a timeout, or a Nack.
    ///
    /// Dropping the returned future withdraws the Interest.
    async fn express_interest(&self, interest: Interest) -> Result<Data>;

    /// Route Interests under `prefix` to `handler`.
    fn register_prefix(
        &self,
        prefix: &Name,
        handler: Arc<dyn InterestHandler>,
    ) -> Result<RegisteredPrefixId>;

    /// Withdraw a registration. Unknown ids are ignored.
    fn unregister_prefix(&self, id: RegisteredPrefixId);

    /// Send a Data packet, satisfying any pending Interest it matches.
    fn put_data(&self, data: &Data) -> Result<()>;
}

/// An in-process network for tests and single-process deployments.
///
/// Every face created from one [`MemoryNetwork`](memory::MemoryNetwork)
/// shares its routes and content store.
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::time::Instant;

    use crate::error::{FaceError, NackReason};

    /// A scripted outcome for matching Interests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Fault {
        /// Wait out the Interest lifetime, then time out.
        Timeout,
        /// Reject immediately.
        Nack(NackReason),
    }

    struct Route {
        id: RegisteredPrefixId,
        face_id: u64,
        prefix: Name,
        handler: Arc<dyn InterestHandler>,
    }

    struct StoredData {
        data: Data,
        arrival: Instant,
    }

    impl StoredData {
        fn is_fresh(&self, now: Instant) -> bool {
            match self.data.meta_info.freshness_period {
                Some(period) => now < self.arrival + period,
                None => false,
            }
        }
    }

    struct ScriptedFault {
        prefix: Name,
        fault: Fault,
        remaining: usize,
    }

    #[derive(Default)]
    struct NetworkState {
        routes: Vec<Route>,
        content_store: BTreeMap<Name, StoredData>,
        faults: Vec<ScriptedFault>,
        expressed: Vec<Interest>,
        served: Vec<Data>,
        closed_faces: Vec<u64>,
        next_route_id: u64,
        next_face_id: u64,
    }

    /// Shared state for the memory network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        state: Mutex<NetworkState>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a face connected to this network.
        pub fn create_face(self: &Arc<Self>) -> MemoryFace {
            let mut state = self.lock();
            state.next_face_id += 1;
            MemoryFace {
                id: state.next_face_id,
                network: Arc::clone(self),
            }
        }

        /// Make the next `count` Interests under `prefix` fail with `fault`.
        pub fn inject_fault(&self, prefix: &Name, fault: Fault, count: usize) {
            self.lock().faults.push(ScriptedFault {
                prefix: prefix.clone(),
                fault,
                remaining: count,
            });
        }

        /// Remove every scripted fault.
        pub fn clear_faults(&self) {
            self.lock().faults.clear();
        }

        /// Every Interest expressed so far, in order.
        pub fn expressed_interests(&self) -> Vec<Interest> {
            self.lock().expressed.clone()
        }

        /// Number of expressed Interests whose name starts with `prefix`.
        pub fn count_expressed(&self, prefix: &Name) -> usize {
            self.lock()
                .expressed
                .iter()
                .filter(|interest| prefix.is_prefix_of(&interest.name))
                .count()
        }

        /// Every Data put by any face, in order.
        pub fn served_data(&self) -> Vec<Data> {
            self.lock().served.clone()
        }

        /// Place `data` in the content store as if it just arrived.
        pub fn insert_content(&self, data: Data) {
            let now = Instant::now();
            self.lock().content_store.insert(
                data.name.clone(),
                StoredData {
                    data,
                    arrival: now,
                },
            );
        }

        pub fn clear_content_store(&self) {
            self.lock().content_store.clear();
        }

        /// Number of live prefix registrations.
        pub fn route_count(&self) -> usize {
            self.lock().routes.len()
        }

        fn lock(&self) -> MutexGuard<'_, NetworkState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Content store lookup. Entries that arrived at or after `fresh_since`
        /// count as fresh regardless of their freshness period, since they
        /// answer this very Interest.
        fn lookup(&self, interest: &Interest, fresh_since: Option<Instant>) -> Option<Data> {
            let now = Instant::now();
            let state = self.lock();
            state
                .content_store
                .values()
                .find(|stored| match fresh_since {
                    Some(since) => {
                        stored.arrival >= since && interest.matches_data(&stored.data, true)
                    }
                    None => interest.matches_data(&stored.data, stored.is_fresh(now)),
                })
                .map(|stored| stored.data.clone())
        }

        fn take_fault(&self, name: &Name) -> Option<Fault> {
            let mut state = self.lock();
            let scripted = state
                .faults
                .iter_mut()
                .find(|f| f.remaining > 0 && f.prefix.is_prefix_of(name))?;
            scripted.remaining -= 1;
            Some(scripted.fault)
        }

        async fn express(self: &Arc<Self>, face_id: u64, interest: Interest) -> Result<Data> {
            {
                let mut state = self.lock();
                if state.closed_faces.contains(&face_id) {
                    return Err(FaceError::Closed);
                }
                state.expressed.push(interest.clone());
            }
            tracing::trace!(name = %interest.name, "Interest expressed");

            match self.take_fault(&interest.name) {
                Some(Fault::Nack(reason)) => return Err(FaceError::Nack(reason)),
                Some(Fault::Timeout) => {
                    tokio::time::sleep(interest.lifetime).await;
                    return Err(FaceError::Timeout);
                }
                None => {}
            }

            if let Some(data) = self.lookup(&interest, None) {
                return Ok(data);
            }

            let handlers: Vec<(Name, u64, Arc<dyn InterestHandler>)> = {
                let state = self.lock();
                state
                    .routes
                    .iter()
                    .filter(|route| route.prefix.is_prefix_of(&interest.name))
                    .map(|route| (route.prefix.clone(), route.face_id, Arc::clone(&route.handler)))
                    .collect()
            };
            if handlers.is_empty() {
                return Err(FaceError::Nack(NackReason::NoRoute));
            }

            let dispatched_at = Instant::now();
            for (prefix, owner, handler) in handlers {
                let face = MemoryFace {
                    id: owner,
                    network: Arc::clone(self),
                };
                handler.on_interest(&prefix, &interest, &face);
            }

            if let Some(data) = self.lookup(&interest, Some(dispatched_at)) {
                return Ok(data);
            }

            tokio::time::sleep(interest.lifetime).await;
            Err(FaceError::Timeout)
        }
    }

    /// A face on a [`MemoryNetwork`].
    pub struct MemoryFace {
        id: u64,
        network: Arc<MemoryNetwork>,
    }

    impl MemoryFace {
        pub fn network(&self) -> &Arc<MemoryNetwork> {
            &self.network
        }

        /// Withdraw every registration of this face and refuse new Interests.
        pub fn close(&self) {
            let mut state = self.network.lock();
            state.routes.retain(|route| route.face_id != self.id);
            if !state.closed_faces.contains(&self.id) {
                state.closed_faces.push(self.id);
            }
        }
    }

    #[async_trait]
    impl Face for MemoryFace {
        async fn express_interest(&self, interest: Interest) -> Result<Data> {
            self.network.express(self.id, interest).await
        }

        fn register_prefix(
            &self,
            prefix: &Name,
            handler: Arc<dyn InterestHandler>,
        ) -> Result<RegisteredPrefixId> {
            let mut state = self.network.lock();
            if state.closed_faces.contains(&self.id) {
                return Err(FaceError::Closed);
            }
            state.next_route_id += 1;
            let id = RegisteredPrefixId(state.next_route_id);
            state.routes.push(Route {
                id,
                face_id: self.id,
                prefix: prefix.clone(),
                handler,
            });
            tracing::debug!(prefix = %prefix, "Registered prefix");
            Ok(id)
        }

        fn unregister_prefix(&self, id: RegisteredPrefixId) {
            self.network.lock().routes.retain(|route| route.id != id);
        }

        fn put_data(&self, data: &Data) -> Result<()> {
            let now = Instant::now();
            let mut state = self.network.lock();
            state.served.push(data.clone());
            state.content_store.insert(
                data.name.clone(),
                StoredData {
                    data: data.clone(),
                    arrival: now,
                },
            );
            Ok(())
        }
    }
}
