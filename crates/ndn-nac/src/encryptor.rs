//! The Encryptor: owns the content key and encrypts under it.
//!
//! A producer holds one Encryptor per access prefix. It keeps a current CK,
//! fetches the dataset's KEK, and publishes the CK wrapped under the KEK as
//! `<ck-name>/ENCRYPTED-BY/<kek-name>`. Application payloads are encrypted
//! with AES-CBC under the CK and locate it by `<ck-name>`.
//!
//! KEK retrieval runs on the Tokio runtime that created the Encryptor. At
//! most one retrieval is in flight. When the retries are used up the error
//! callback fires and a fresh retrieval is scheduled after
//! [`NacConfig::retry_delay_kek_retrieval`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use zeroize::Zeroizing;

use ndn_nac_core::{Data, Interest, KeyLocator, Name};
use ndn_nac_crypto::{
    asymmetric, symmetric, CompactEnvelope, EncryptAlgorithm, EncryptParams, FullEnvelope,
};
use ndn_nac_face::{express_with_retry, Face, RegisteredPrefixId};
use ndn_nac_store::{KeyChain, RetainingCache, SigningInfo};

use crate::config::NacConfig;
use crate::error::{ErrorCode, NacError, Result};
use crate::naming;
use crate::serve::ServeFromCache;

/// Receives errors from background work. May be called many times.
pub type ErrorCallback = Arc<dyn Fn(&NacError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KekReadiness {
    Waiting,
    Ready,
    Closed,
}

/// Produces encrypted content for one access prefix.
pub struct Encryptor {
    inner: Arc<Inner>,
}

struct Inner {
    access_prefix: Name,
    ck_prefix: Name,
    ck_signing_info: SigningInfo,
    keychain: Arc<dyn KeyChain>,
    face: Arc<dyn Face>,
    cache: Arc<RetainingCache>,
    config: NacConfig,
    on_error: ErrorCallback,
    runtime: Handle,
    kek_ready: watch::Sender<KekReadiness>,
    state: Mutex<State>,
}

struct State {
    ck_name: Name,
    ck_bits: Zeroizing<Vec<u8>>,
    kek_data: Option<Data>,
    kek_retrieval_in_progress: bool,
    kek_task: Option<AbortHandle>,
    retry_task: Option<AbortHandle>,
    registration: Option<RegisteredPrefixId>,
    shut_down: bool,
}

impl Encryptor {
    /// Create an Encryptor for `access_prefix` (`<identity>/NAC/<dataset>`)
    /// that names its CKs under `ck_prefix`.
    ///
    /// Generates the first CK and starts fetching the KEK, so it must be
    /// called from within a Tokio runtime.
    pub fn new(
        access_prefix: &Name,
        ck_prefix: &Name,
        ck_signing_info: SigningInfo,
        on_error: ErrorCallback,
        keychain: Arc<dyn KeyChain>,
        face: Arc<dyn Face>,
        config: NacConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            NacError::new(ErrorCode::General, format!("Encryptor needs a Tokio runtime: {}", e))
        })?;

        let cache = Arc::new(RetainingCache::new());
        let registered = naming::ck_prefix(ck_prefix);
        let registration = face
            .register_prefix(&registered, ServeFromCache::new(Arc::clone(&cache), "CK"))
            .map_err(|e| {
                NacError::new(
                    ErrorCode::General,
                    format!("Failed to register prefix {}: {}", registered, e),
                )
            })?;

        let (kek_ready, _) = watch::channel(KekReadiness::Waiting);
        let inner = Arc::new(Inner {
            access_prefix: access_prefix.clone(),
            ck_prefix: ck_prefix.clone(),
            ck_signing_info,
            keychain,
            face,
            cache,
            config,
            on_error,
            runtime,
            kek_ready,
            state: Mutex::new(State {
                ck_name: Name::new(),
                ck_bits: Zeroizing::new(Vec::new()),
                kek_data: None,
                kek_retrieval_in_progress: false,
                kek_task: None,
                retry_task: None,
                registration: Some(registration),
                shut_down: false,
            }),
        });

        let encryptor = Self { inner };
        encryptor.rotate_content_key();
        Ok(encryptor)
    }

    /// Encrypt `plaintext` under the current CK with a fresh IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<FullEnvelope> {
        let (ck_name, ck_bits) = {
            let state = self.inner.lock();
            (state.ck_name.clone(), state.ck_bits.clone())
        };

        let params = EncryptParams::new(EncryptAlgorithm::AesCbc)
            .with_random_iv(self.inner.config.aes_iv_size);
        let payload = symmetric::encrypt(&ck_bits, plaintext, &params).map_err(|e| {
            NacError::new(
                ErrorCode::EncryptionFailure,
                format!("Failed to encrypt with CK {}: {}", ck_name, e),
            )
        })?;

        Ok(FullEnvelope {
            algorithm: EncryptAlgorithm::AesCbc,
            key_locator: KeyLocator::Name(ck_name),
            initial_vector: params.initial_vector,
            payload,
        })
    }

    /// Replace the current CK with a new one and publish it.
    ///
    /// If no KEK is known yet, a KEK retrieval is started and the CK is
    /// published when it completes. Rotating again before then means the
    /// earlier CK is never published.
    #[doc(alias = "regenerate_ck")]
    pub fn rotate_content_key(&self) {
        self.inner.rotate_content_key();
    }

    /// Resolves once a KEK has been fetched and the current CK published.
    pub async fn wait_for_kek(&self) -> Result<()> {
        let mut rx = self.inner.kek_ready.subscribe();
        let readiness = rx
            .wait_for(|r| *r != KekReadiness::Waiting)
            .await
            .map(|r| *r)
            .unwrap_or(KekReadiness::Closed);
        match readiness {
            KekReadiness::Ready => Ok(()),
            _ => Err(NacError::new(ErrorCode::Cancelled, "Encryptor was shut down")),
        }
    }

    /// Number of CK Data packets published.
    pub fn size(&self) -> usize {
        self.inner.cache.size()
    }

    /// Name of the current CK, `<ck-prefix>/CK/<version>`.
    pub fn ck_name(&self) -> Name {
        self.inner.lock().ck_name.clone()
    }

    /// The KEK Data last fetched, if any.
    pub fn kek_data(&self) -> Option<Data> {
        self.inner.lock().kek_data.clone()
    }

    pub fn is_kek_retrieval_in_progress(&self) -> bool {
        self.inner.lock().kek_retrieval_in_progress
    }

    /// Withdraw the CK prefix and cancel KEK retrieval. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for Encryptor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rotate_content_key(self: &Arc<Self>) {
        let bits = match symmetric::generate_key(self.config.aes_key_size * 8) {
            Ok(bits) => bits,
            Err(e) => {
                self.report(NacError::new(
                    ErrorCode::EncryptionFailure,
                    format!("Failed to generate CK: {}", e),
                ));
                return;
            }
        };

        let published = {
            let mut state = self.lock();
            // Versions are the rotation time in ms, kept strictly increasing.
            let mut version = now_millis();
            if let Some(previous) = state.ck_name.get(-1).and_then(|c| c.as_version()) {
                version = version.max(previous + 1);
            }
            state.ck_name = naming::ck_prefix(&self.ck_prefix).append_version(version);
            state.ck_bits = bits;
            tracing::debug!(ck = %state.ck_name, "Generating new CK");

            if state.kek_data.is_some() {
                Some(self.publish_ck_data(&state))
            } else {
                None
            }
        };

        match published {
            Some(Ok(())) => {}
            Some(Err(e)) => self.report(e),
            None => self.retry_fetching_kek(),
        }
    }

    fn retry_fetching_kek(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.shut_down || state.kek_retrieval_in_progress {
            return;
        }
        state.kek_retrieval_in_progress = true;
        tracing::debug!("Retrying fetching of the KEK");

        let inner = Arc::clone(self);
        let task = self
            .runtime
            .spawn(async move { inner.fetch_kek_and_publish_ck_data().await });
        state.kek_task = Some(task.abort_handle());
    }

    async fn fetch_kek_and_publish_ck_data(self: Arc<Self>) {
        let kek_prefix = naming::kek_prefix(&self.access_prefix);
        tracing::debug!(name = %kek_prefix, "Fetching KEK");
        let interest = Interest::new(kek_prefix.clone())
            .with_must_be_fresh(true)
            .with_can_be_prefix(true);

        let fetched =
            express_with_retry(self.face.as_ref(), &interest, &self.config.kek_retry).await;

        let outcome = {
            let mut state = self.lock();
            state.kek_retrieval_in_progress = false;
            state.kek_task = None;
            if state.shut_down {
                return;
            }
            match fetched {
                Ok(kek_data) => {
                    // TODO: validate the KEK against the owner's trust schema.
                    state.kek_data = Some(kek_data);
                    if let Some(task) = state.retry_task.take() {
                        task.abort();
                    }
                    self.publish_ck_data(&state)
                }
                Err(e) => Err(NacError::retrieval(
                    e,
                    "KEK",
                    &kek_prefix,
                    ErrorCode::KekRetrievalTimeout,
                    ErrorCode::KekRetrievalFailure,
                )),
            }
        };

        match outcome {
            Ok(()) => {
                tracing::debug!("The KEK was retrieved and published");
                self.kek_ready.send_replace(KekReadiness::Ready);
            }
            Err(e) if matches!(
                e.code,
                ErrorCode::KekRetrievalTimeout | ErrorCode::KekRetrievalFailure
            ) =>
            {
                tracing::warn!(error = %e, "Failed to retrieve KEK, scheduling retry");
                self.report(e);
                self.schedule_kek_retry();
            }
            Err(e) => self.report(e),
        }
    }

    fn schedule_kek_retry(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        let inner = Arc::clone(self);
        let delay = self.config.retry_delay_kek_retrieval;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.lock().kek_data.is_none() {
                inner.retry_fetching_kek();
            }
        });
        if let Some(previous) = state.retry_task.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    /// Wrap the current CK under the KEK and insert the CK Data.
    fn publish_ck_data(&self, state: &State) -> Result<()> {
        let kek = state
            .kek_data
            .as_ref()
            .ok_or_else(|| NacError::new(ErrorCode::General, "No KEK to publish the CK with"))?;

        let wrapped = asymmetric::encrypt(&kek.content, &state.ck_bits, EncryptAlgorithm::RsaOaep)
            .map_err(|e| {
                NacError::new(
                    ErrorCode::EncryptionFailure,
                    format!("Failed to encrypt generated CK with KEK {}: {}", kek.name, e),
                )
            })?;
        let envelope = CompactEnvelope {
            payload: wrapped,
            wrapped_secret: None,
        };

        let mut ck_data = Data::new(naming::ck_data_name(&state.ck_name, &kek.name))
            .with_content(envelope.wire_encode())
            .with_freshness_period(self.config.ck_freshness);
        self.keychain
            .sign(&mut ck_data, &self.ck_signing_info)
            .map_err(|e| {
                NacError::new(
                    ErrorCode::EncryptionFailure,
                    format!("Failed to sign CK data {}: {}", ck_data.name, e),
                )
            })?;

        tracing::debug!(name = %ck_data.name, "Publishing CK data");
        self.cache.insert(ck_data);
        Ok(())
    }

    fn report(&self, error: NacError) {
        let on_error = Arc::clone(&self.on_error);
        if panic::catch_unwind(AssertUnwindSafe(|| on_error(&error))).is_err() {
            tracing::error!(error = %error, "Encryptor error callback panicked");
        }
    }

    fn shutdown(&self) {
        let registration = {
            let mut state = self.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.kek_retrieval_in_progress = false;
            if let Some(task) = state.kek_task.take() {
                task.abort();
            }
            if let Some(task) = state.retry_task.take() {
                task.abort();
            }
            state.registration.take()
        };
        if let Some(id) = registration {
            self.face.unregister_prefix(id);
        }
        self.kek_ready.send_if_modified(|r| {
            if *r == KekReadiness::Waiting {
                *r = KekReadiness::Closed;
                true
            } else {
                false
            }
        });
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndn_nac_crypto::decrypt_envelope;
    use ndn_nac_face::memory::{Fault, MemoryNetwork};
    use ndn_nac_face::NackReason;
    use ndn_nac_store::{KeyParams, MemoryKeyChain};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::access_manager::AccessManager;

    fn n(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn config() -> NacConfig {
        NacConfig {
            rsa_key_bits: 1024,
            safe_bag_iterations: 16,
            ..NacConfig::default()
        }
    }

    struct Fixture {
        network: Arc<MemoryNetwork>,
        keychain: Arc<MemoryKeyChain>,
        errors: Arc<Mutex<Vec<NacError>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let keychain = Arc::new(MemoryKeyChain::new());
            keychain
                .create_identity(&n("/owner"), &KeyParams::Rsa { bits: 1024 })
                .unwrap();
            Self {
                network: MemoryNetwork::new(),
                keychain,
                errors: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn access_manager(&self) -> AccessManager {
            AccessManager::new(
                &n("/owner"),
                "ds",
                self.keychain.clone(),
                Arc::new(self.network.create_face()),
                config(),
            )
            .unwrap()
        }

        fn encryptor(&self) -> Encryptor {
            let errors = Arc::clone(&self.errors);
            Encryptor::new(
                &n("/owner/NAC/ds"),
                &n("/producer"),
                SigningInfo::DigestSha256,
                Arc::new(move |e: &NacError| errors.lock().unwrap().push(e.clone())),
                self.keychain.clone(),
                Arc::new(self.network.create_face()),
                config(),
            )
            .unwrap()
        }

        fn error_codes(&self) -> Vec<ErrorCode> {
            self.errors.lock().unwrap().iter().map(|e| e.code).collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_ck_after_kek() {
        let f = Fixture::new();
        let manager = f.access_manager();
        let encryptor = f.encryptor();
        assert!(encryptor.is_kek_retrieval_in_progress());

        encryptor.wait_for_kek().await.unwrap();
        assert!(!encryptor.is_kek_retrieval_in_progress());
        assert_eq!(encryptor.kek_data().unwrap().name, *manager.kek_name());
        assert_eq!(encryptor.size(), 1);
        assert_eq!(f.network.count_expressed(&n("/owner/NAC/ds/KEK")), 1);

        let ck_name = encryptor.ck_name();
        assert_eq!(ck_name.prefix(-1), n("/producer/CK"));
        assert!(ck_name.get(-1).unwrap().as_version().is_some());

        let consumer = f.network.create_face();
        let ck_data = consumer
            .express_interest(Interest::new(ck_name.clone()).with_can_be_prefix(true))
            .await
            .unwrap();
        assert_eq!(
            ck_data.name,
            naming::ck_data_name(&ck_name, manager.kek_name())
        );
        assert_eq!(ck_data.meta_info.freshness_period, Some(Duration::from_millis(3_600_000)));

        let envelope = CompactEnvelope::wire_decode(&ck_data.content).unwrap();
        assert!(envelope.wrapped_secret.is_none());
        let ck_bits = f
            .keychain
            .decrypt(&envelope.payload, &manager.nac_key_name())
            .unwrap();
        assert_eq!(ck_bits.len(), 32);
        assert!(f.error_codes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_encrypt_uses_current_ck() {
        let f = Fixture::new();
        let _manager = f.access_manager();
        let encryptor = f.encryptor();
        encryptor.wait_for_kek().await.unwrap();

        let envelope = encryptor.encrypt(b"hello world").unwrap();
        assert_eq!(envelope.algorithm, EncryptAlgorithm::AesCbc);
        assert_eq!(envelope.key_name(), Some(&encryptor.ck_name()));
        assert_eq!(envelope.initial_vector.as_ref().map(Vec::len), Some(16));

        let other = encryptor.encrypt(b"hello world").unwrap();
        assert_ne!(envelope.initial_vector, other.initial_vector);

        let ck_bits = {
            let state = encryptor.inner.lock();
            state.ck_bits.clone()
        };
        assert_eq!(decrypt_envelope(&envelope, &ck_bits).unwrap(), b"hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_publishes_new_ck() {
        let f = Fixture::new();
        let _manager = f.access_manager();
        let encryptor = f.encryptor();
        encryptor.wait_for_kek().await.unwrap();

        let first = encryptor.ck_name();
        encryptor.rotate_content_key();
        let second = encryptor.ck_name();
        assert_ne!(first, second);
        assert!(second > first);
        assert_eq!(encryptor.size(), 2);
        assert_eq!(f.network.count_expressed(&n("/owner/NAC/ds/KEK")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_before_kek_skips_previous_ck() {
        let f = Fixture::new();
        let _manager = f.access_manager();
        let encryptor = f.encryptor();
        let first = encryptor.ck_name();
        encryptor.rotate_content_key();
        let second = encryptor.ck_name();

        encryptor.wait_for_kek().await.unwrap();
        assert_eq!(encryptor.size(), 1);
        assert_eq!(f.network.count_expressed(&n("/owner/NAC/ds/KEK")), 1);

        let consumer = f.network.create_face();
        assert!(consumer
            .express_interest(Interest::new(second).with_can_be_prefix(true))
            .await
            .is_ok());
        assert!(consumer
            .express_interest(Interest::new(first).with_can_be_prefix(true))
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kek_timeouts_report_and_reschedule() {
        let f = Fixture::new();
        let kek_prefix = n("/owner/NAC/ds/KEK");
        let _manager = f.access_manager();
        f.network.inject_fault(&kek_prefix, Fault::Timeout, 4);

        let encryptor = f.encryptor();
        // Four attempts of 4 s each.
        tokio::time::sleep(Duration::from_secs(17)).await;
        assert_eq!(f.error_codes(), vec![ErrorCode::KekRetrievalTimeout]);
        assert_eq!(f.network.count_expressed(&kek_prefix), 4);
        assert!(!encryptor.is_kek_retrieval_in_progress());
        assert!(encryptor.kek_data().is_none());

        // The scheduled retry succeeds.
        tokio::time::sleep(Duration::from_secs(60)).await;
        encryptor.wait_for_kek().await.unwrap();
        assert_eq!(f.network.count_expressed(&kek_prefix), 5);
        assert_eq!(encryptor.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_during_backoff_cancels_scheduled_retry() {
        let f = Fixture::new();
        let kek_prefix = n("/owner/NAC/ds/KEK");
        let _manager = f.access_manager();
        f.network.inject_fault(&kek_prefix, Fault::Timeout, 4);

        let encryptor = f.encryptor();
        tokio::time::sleep(Duration::from_secs(17)).await;
        assert_eq!(f.error_codes(), vec![ErrorCode::KekRetrievalTimeout]);
        assert_eq!(f.network.count_expressed(&kek_prefix), 4);

        encryptor.rotate_content_key();
        encryptor.wait_for_kek().await.unwrap();
        assert_eq!(f.network.count_expressed(&kek_prefix), 5);

        // Past the point where the 60 s retry would have fired.
        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(f.network.count_expressed(&kek_prefix), 5);
        assert_eq!(encryptor.size(), 1);
        assert_eq!(f.error_codes(), vec![ErrorCode::KekRetrievalTimeout]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kek_nacks_back_off() {
        let f = Fixture::new();
        let kek_prefix = n("/owner/NAC/ds/KEK");
        let _manager = f.access_manager();
        f.network
            .inject_fault(&kek_prefix, Fault::Nack(NackReason::Congestion), 4);

        let encryptor = f.encryptor();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(f.error_codes(), vec![ErrorCode::KekRetrievalFailure]);
        assert_eq!(f.network.count_expressed(&kek_prefix), 4);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(encryptor.kek_data().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_access_manager_keeps_reporting() {
        let f = Fixture::new();
        let _encryptor = f.encryptor();

        // Rounds end at 3 s, 66 s and 129 s.
        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(
            f.error_codes(),
            vec![ErrorCode::KekRetrievalFailure; 3]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_is_contained() {
        let f = Fixture::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let encryptor = Encryptor::new(
            &n("/owner/NAC/ds"),
            &n("/producer"),
            SigningInfo::DigestSha256,
            Arc::new(move |_: &NacError| {
                counted.fetch_add(1, Ordering::SeqCst);
                panic!("callback failure");
            }),
            f.keychain.clone(),
            Arc::new(f.network.create_face()),
            config(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(encryptor.encrypt(b"still usable").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_retrieval() {
        let f = Fixture::new();
        let kek_prefix = n("/owner/NAC/ds/KEK");
        let _manager = f.access_manager();
        f.network.inject_fault(&kek_prefix, Fault::Timeout, 100);

        let encryptor = f.encryptor();
        assert_eq!(f.network.route_count(), 3);
        tokio::time::sleep(Duration::from_secs(1)).await;
        encryptor.shutdown();
        assert_eq!(f.network.route_count(), 2);
        assert!(!encryptor.is_kek_retrieval_in_progress());

        let err = encryptor.wait_for_kek().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.network.count_expressed(&kek_prefix), 1);
        assert!(f.error_codes().is_empty());
    }

    #[test]
    fn test_requires_runtime() {
        let f = Fixture::new();
        let err = Encryptor::new(
            &n("/owner/NAC/ds"),
            &n("/producer"),
            SigningInfo::DigestSha256,
            Arc::new(|_: &NacError| {}),
            f.keychain.clone(),
            Arc::new(f.network.create_face()),
            config(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), ErrorCode::General);
    }
}
