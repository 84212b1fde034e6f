//! Bounded retry for Interests.
//!
//! A timeout is retried at once. A Nack is retried after `nack_backoff`
//! when the policy allows it, otherwise it is returned as-is. Either way the
//! total number of attempts never exceeds `max_retries + 1`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use ndn_nac_core::{Data, Interest};

use crate::error::{FaceError, Result};
use crate::face::Face;

/// How many times to re-express an Interest and how long to wait after a
/// Nack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_on_nack: bool,
    #[serde(with = "millis")]
    pub nack_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_on_nack: false,
            nack_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Upper bound on `express_interest` calls for one request.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Express `interest`, retrying per `policy`.
///
/// Returns the last error once the attempts are used up.
pub async fn express_with_retry(
    face: &dyn Face,
    interest: &Interest,
    policy: &RetryPolicy,
) -> Result<Data> {
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;
    loop {
        let err = match face.express_interest(interest.clone()).await {
            Ok(data) => return Ok(data),
            Err(err) => err,
        };
        if attempt >= max_attempts {
            return Err(err);
        }
        match err {
            FaceError::Timeout => {
                tracing::debug!(name = %interest.name, attempt, "Interest timed out, retrying");
            }
            FaceError::Nack(reason) if policy.retry_on_nack => {
                tracing::debug!(name = %interest.name, attempt, %reason, "Interest nacked, backing off");
                tokio::time::sleep(policy.nack_backoff).await;
            }
            other => return Err(other),
        }
        attempt += 1;
    }
}

/// Serde adapter for durations written as integer milliseconds.
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NackReason;
    use crate::face::memory::{Fault, MemoryNetwork};
    use crate::face::InterestHandler;
    use ndn_nac_core::Name;
    use std::sync::Arc;

    fn n(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn answering() -> Arc<dyn InterestHandler> {
        Arc::new(|_: &Name, interest: &Interest, face: &dyn Face| {
            face.put_data(&Data::new(interest.name.clone())).unwrap();
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retry_bound() {
        let network = MemoryNetwork::new();
        let face = network.create_face();
        face.register_prefix(&n("/ck"), answering()).unwrap();
        network.inject_fault(&n("/ck"), Fault::Timeout, 100);

        let policy = RetryPolicy::default();
        let err = express_with_retry(&face, &Interest::new(n("/ck/1")), &policy)
            .await
            .unwrap_err();
        assert_eq!(err, FaceError::Timeout);
        assert_eq!(network.count_expressed(&n("/ck")), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_timeouts() {
        let network = MemoryNetwork::new();
        let face = network.create_face();
        face.register_prefix(&n("/ck"), answering()).unwrap();
        network.inject_fault(&n("/ck"), Fault::Timeout, 3);

        let data = express_with_retry(&face, &Interest::new(n("/ck/1")), &RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(data.name, n("/ck/1"));
        assert_eq!(network.count_expressed(&n("/ck")), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_not_retried_by_default() {
        let network = MemoryNetwork::new();
        let face = network.create_face();
        face.register_prefix(&n("/ck"), answering()).unwrap();
        network.inject_fault(&n("/ck"), Fault::Nack(NackReason::Congestion), 1);

        let err = express_with_retry(&face, &Interest::new(n("/ck/1")), &RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err, FaceError::Nack(NackReason::Congestion));
        assert_eq!(network.count_expressed(&n("/ck")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_backoff() {
        let network = MemoryNetwork::new();
        let face = network.create_face();
        face.register_prefix(&n("/kek"), answering()).unwrap();
        network.inject_fault(&n("/kek"), Fault::Nack(NackReason::Congestion), 2);

        let policy = RetryPolicy {
            retry_on_nack: true,
            ..RetryPolicy::default()
        };
        let start = tokio::time::Instant::now();
        express_with_retry(&face, &Interest::new(n("/kek/1")), &policy)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(start.elapsed() < Duration::from_millis(3000));
        assert_eq!(network.count_expressed(&n("/kek")), 3);
    }

    #[test]
    fn test_policy_serde_millis() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries":2,"retry_on_nack":true,"nack_backoff":250}"#)
                .unwrap();
        assert_eq!(policy.nack_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_attempts(), 3);
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"nack_backoff\":250"));
    }
}
