//! Configuration shared by the access-control components.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use ndn_nac_face::retry::millis;
use ndn_nac_face::RetryPolicy;
use ndn_nac_store::safe_bag::DEFAULT_ITERATIONS;

use crate::error::{ErrorCode, NacError, Result};

/// Freshness period of KEK, KDK and CK Data. Expiry is the only revocation.
pub const DEFAULT_FRESHNESS_PERIOD: Duration = Duration::from_millis(3_600_000);

/// How random grant secrets are turned into passphrase bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassphraseMapping {
    /// Every byte in 1..=127, for tools that read the passphrase as a
    /// NUL-terminated ASCII string.
    #[default]
    Ascii7,
    /// Bytes used as generated.
    Raw,
}

impl PassphraseMapping {
    pub fn apply(&self, secret: &mut [u8]) {
        if let Self::Ascii7 = self {
            for byte in secret.iter_mut() {
                // Clear the high bit first so 0x80 cannot become 0.
                *byte &= 0x7f;
                if *byte == 0 {
                    *byte = 1;
                }
            }
        }
    }
}

/// Configuration for the Access Manager, Encryptor and Decryptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NacConfig {
    /// KEK fetches by the Encryptor. Nacks are retried after a short
    /// backoff.
    pub kek_retry: RetryPolicy,
    /// CK and KDK fetches by the Decryptor. Nacks fail at once.
    pub fetch_retry: RetryPolicy,
    /// Wait before starting over once a KEK fetch has used up its retries.
    #[serde(with = "millis")]
    pub retry_delay_kek_retrieval: Duration,
    #[serde(with = "millis")]
    pub kek_freshness: Duration,
    #[serde(with = "millis")]
    pub kdk_freshness: Duration,
    #[serde(with = "millis")]
    pub ck_freshness: Duration,
    /// Content key length in bytes.
    pub aes_key_size: usize,
    pub aes_iv_size: usize,
    /// Modulus size for a newly created NAC key.
    pub rsa_key_bits: usize,
    /// Length of the passphrase protecting each KDK bundle.
    pub secret_length: usize,
    pub passphrase_mapping: PassphraseMapping,
    /// PBKDF2 rounds for KDK bundles.
    pub safe_bag_iterations: u32,
}

impl Default for NacConfig {
    fn default() -> Self {
        Self {
            kek_retry: RetryPolicy {
                max_retries: 3,
                retry_on_nack: true,
                nack_backoff: Duration::from_millis(1000),
            },
            fetch_retry: RetryPolicy {
                max_retries: 3,
                retry_on_nack: false,
                nack_backoff: Duration::from_millis(1000),
            },
            retry_delay_kek_retrieval: Duration::from_millis(60_000),
            kek_freshness: DEFAULT_FRESHNESS_PERIOD,
            kdk_freshness: DEFAULT_FRESHNESS_PERIOD,
            ck_freshness: DEFAULT_FRESHNESS_PERIOD,
            aes_key_size: 32,
            aes_iv_size: 16,
            rsa_key_bits: 2048,
            secret_length: 32,
            passphrase_mapping: PassphraseMapping::Ascii7,
            safe_bag_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl NacConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| NacError::new(ErrorCode::General, format!("invalid config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let config = NacConfig::default();
        assert_eq!(config.kek_freshness, Duration::from_millis(3_600_000));
        assert_eq!(config.kek_retry.max_attempts(), 4);
        assert!(config.kek_retry.retry_on_nack);
        assert!(!config.fetch_retry.retry_on_nack);
        assert_eq!(config.retry_delay_kek_retrieval, Duration::from_secs(60));
        assert_eq!(config.aes_key_size * 8, 256);
        assert_eq!(config.aes_iv_size * 8, 128);
    }

    #[test]
    fn test_from_json_partial() {
        let config = NacConfig::from_json(
            r#"{"rsa_key_bits":1024,"ck_freshness":5000,"passphrase_mapping":"Raw"}"#,
        )
        .unwrap();
        assert_eq!(config.rsa_key_bits, 1024);
        assert_eq!(config.ck_freshness, Duration::from_millis(5000));
        assert_eq!(config.passphrase_mapping, PassphraseMapping::Raw);
        assert_eq!(config.kdk_freshness, DEFAULT_FRESHNESS_PERIOD);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = NacConfig::from_json("{\"aes_key_size\":\"big\"}").unwrap_err();
        assert_eq!(err.code(), ErrorCode::General);
    }

    #[test]
    fn test_ascii7_high_zero_byte() {
        let mut secret = [0x00, 0x80, 0xff, 0x41];
        PassphraseMapping::Ascii7.apply(&mut secret);
        assert_eq!(secret, [0x01, 0x01, 0x7f, 0x41]);

        let mut raw = [0x00, 0x80];
        PassphraseMapping::Raw.apply(&mut raw);
        assert_eq!(raw, [0x00, 0x80]);
    }

    proptest! {
        #[test]
        fn prop_ascii7_range(mut secret in proptest::collection::vec(any::<u8>(), 0..64)) {
            PassphraseMapping::Ascii7.apply(&mut secret);
            prop_assert!(secret.iter().all(|b| (1..=0x7f).contains(b)));
        }
    }
}
