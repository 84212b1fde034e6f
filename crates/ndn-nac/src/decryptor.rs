//! The Decryptor: resolves content keys and decrypts for a consumer.
//!
//! For each CK name the Decryptor runs at most one resolution:
//!
//! 1. fetch `<ck-name>` (prefix match) to learn the KEK it was wrapped with
//! 2. unless the KDK is already imported, fetch
//!    `<nac-identity>/KDK/<key-id>/ENCRYPTED-BY/<credentials-key>`, unwrap
//!    its passphrase with the consumer's credentials key and import the
//!    bundle into a private key chain
//! 3. decrypt the CK with the KDK
//!
//! Requests that arrive while a resolution is running are queued and
//! answered in submission order once it finishes. A failed resolution fails
//! every queued request and is forgotten, so the next request starts over.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use zeroize::Zeroizing;

use ndn_nac_core::{Data, Interest, KeyLocator, Name};
use ndn_nac_crypto::{symmetric, CompactEnvelope, EncryptAlgorithm, EncryptParams, FullEnvelope};
use ndn_nac_face::{express_with_retry, Face};
use ndn_nac_store::{KeyChain, MemoryKeyChain, SafeBag, StoreError};

use crate::config::NacConfig;
use crate::error::{ErrorCode, NacError, Result};
use crate::naming;

type SuccessCallback = Box<dyn FnOnce(Vec<u8>) + Send>;
type FailureCallback = Box<dyn FnOnce(NacError) + Send>;

/// Where the outcome of one decrypt request goes.
enum Completion {
    Callbacks {
        on_success: SuccessCallback,
        on_error: FailureCallback,
    },
    Channel(oneshot::Sender<Result<Vec<u8>>>),
}

impl Completion {
    fn complete(self, result: Result<Vec<u8>>) {
        match self {
            Completion::Callbacks {
                on_success,
                on_error,
            } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || match result {
                    Ok(plaintext) => on_success(plaintext),
                    Err(e) => on_error(e),
                }));
                if outcome.is_err() {
                    tracing::error!("Decrypt callback panicked");
                }
            }
            Completion::Channel(tx) => {
                // The receiver may have given up.
                let _ = tx.send(result);
            }
        }
    }
}

struct PendingDecrypt {
    envelope: FullEnvelope,
    completion: Completion,
}

/// Resolution record for one CK name.
#[derive(Default)]
struct ContentKey {
    bits: Option<Zeroizing<Vec<u8>>>,
    /// Set once the bits are known and the queue has been drained.
    is_retrieved: bool,
    task: Option<AbortHandle>,
    pending: VecDeque<PendingDecrypt>,
}

#[derive(Default)]
struct State {
    content_keys: HashMap<Name, ContentKey>,
    shut_down: bool,
}

/// Decrypts content for the holder of one credentials key.
pub struct Decryptor {
    inner: Arc<Inner>,
}

struct Inner {
    credentials_key: Name,
    keychain: Arc<dyn KeyChain>,
    /// Holds imported KDKs only.
    internal_keychain: MemoryKeyChain,
    face: Arc<dyn Face>,
    config: NacConfig,
    runtime: Handle,
    state: Mutex<State>,
}

impl Decryptor {
    /// Create a Decryptor that unlocks KDKs with `credentials_key`, a key
    /// name in `keychain` that the Access Manager granted access to.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        credentials_key: &Name,
        keychain: Arc<dyn KeyChain>,
        face: Arc<dyn Face>,
        config: NacConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            NacError::new(ErrorCode::General, format!("Decryptor needs a Tokio runtime: {}", e))
        })?;
        Ok(Self {
            inner: Arc::new(Inner {
                credentials_key: credentials_key.clone(),
                keychain,
                internal_keychain: MemoryKeyChain::new(),
                face,
                config,
                runtime,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Decrypt `envelope`, waiting for its CK to be resolved if needed.
    pub async fn decrypt(&self, envelope: FullEnvelope) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.inner.submit(envelope, Completion::Channel(tx));
        rx.await
            .unwrap_or_else(|_| Err(NacError::new(ErrorCode::Cancelled, "Decryptor was dropped")))
    }

    /// Decrypt `envelope` and report through exactly one of the callbacks.
    ///
    /// Callbacks run on whichever thread finishes the work, possibly the
    /// caller's own before this returns.
    pub fn decrypt_with<S, E>(&self, envelope: FullEnvelope, on_success: S, on_error: E)
    where
        S: FnOnce(Vec<u8>) + Send + 'static,
        E: FnOnce(NacError) + Send + 'static,
    {
        self.inner.submit(
            envelope,
            Completion::Callbacks {
                on_success: Box::new(on_success),
                on_error: Box::new(on_error),
            },
        );
    }

    /// Whether the CK named `ck_name` is resolved and cached.
    pub fn has_content_key(&self, ck_name: &Name) -> bool {
        self.inner
            .lock()
            .content_keys
            .get(ck_name)
            .map_or(false, |ck| ck.is_retrieved)
    }

    /// Requests waiting on the CK named `ck_name`.
    pub fn pending_count(&self, ck_name: &Name) -> usize {
        self.inner
            .lock()
            .content_keys
            .get(ck_name)
            .map_or(0, |ck| ck.pending.len())
    }

    /// Cancel every resolution and fail queued requests with
    /// [`ErrorCode::Cancelled`]. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for Decryptor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(self: &Arc<Self>, envelope: FullEnvelope, completion: Completion) {
        let ck_name = match &envelope.key_locator {
            KeyLocator::Name(name) => name.clone(),
            KeyLocator::KeyDigest(_) => {
                tracing::debug!("Missing required KeyLocator in the supplied EncryptedContent block");
                completion.complete(Err(NacError::new(
                    ErrorCode::MissingRequiredKeyLocator,
                    "Missing required KeyLocator in the supplied EncryptedContent block",
                )));
                return;
            }
        };
        if envelope.initial_vector.is_none() {
            tracing::debug!("Missing required initial vector in the supplied EncryptedContent block");
            completion.complete(Err(NacError::new(
                ErrorCode::MissingRequiredInitialVector,
                "Missing required initial vector in the supplied EncryptedContent block",
            )));
            return;
        }

        let mut state = self.lock();
        if state.shut_down {
            drop(state);
            completion.complete(Err(NacError::new(
                ErrorCode::Cancelled,
                "Decryptor is shut down",
            )));
            return;
        }

        let request = PendingDecrypt {
            envelope,
            completion,
        };
        match state.content_keys.get_mut(&ck_name) {
            Some(ContentKey {
                is_retrieved: true,
                bits: Some(bits),
                ..
            }) => {
                let bits = bits.clone();
                drop(state);
                let result = decrypt_payload(&request.envelope, &bits);
                request.completion.complete(result);
            }
            Some(ck) => {
                tracing::debug!(
                    ck = %ck_name,
                    "CK not yet available, so adding to the pending decrypt queue"
                );
                ck.pending.push_back(request);
            }
            None => {
                let mut ck = ContentKey::default();
                ck.pending.push_back(request);

                let inner = Arc::clone(self);
                let name = ck_name.clone();
                let task = self.runtime.spawn(async move {
                    let result = inner.resolve(&name).await;
                    inner.finish(&name, result);
                });
                ck.task = Some(task.abort_handle());
                state.content_keys.insert(ck_name, ck);
            }
        }
    }

    /// Fetch and unwrap the CK bits for `ck_name`.
    async fn resolve(&self, ck_name: &Name) -> Result<Zeroizing<Vec<u8>>> {
        tracing::debug!(ck = %ck_name, "Fetching CK");
        let interest = Interest::new(ck_name.clone())
            .with_must_be_fresh(false)
            .with_can_be_prefix(true);
        let ck_data = express_with_retry(self.face.as_ref(), &interest, &self.config.fetch_retry)
            .await
            .map_err(|e| {
                NacError::retrieval(
                    e,
                    "CK",
                    ck_name,
                    ErrorCode::CkRetrievalTimeout,
                    ErrorCode::CkRetrievalFailure,
                )
            })?;

        // TODO: validate the CK Data against the owner's trust schema.
        let kdk = naming::extract_kdk_info(&ck_data.name, ck_name)?;

        if self.internal_keychain.has_key(&kdk.kdk_key_name) {
            tracing::debug!(
                kdk = %kdk.kdk_key_name,
                "KDK already exists, so directly using it to decrypt the CK"
            );
        } else {
            let kdk_name = naming::kdk_name(&kdk.kdk_prefix, &self.credentials_key);
            tracing::debug!(kdk = %kdk_name, "Fetching KDK");
            let interest = Interest::new(kdk_name.clone())
                .with_must_be_fresh(true)
                .with_can_be_prefix(false);
            let kdk_data =
                express_with_retry(self.face.as_ref(), &interest, &self.config.fetch_retry)
                    .await
                    .map_err(|e| {
                        NacError::retrieval(
                            e,
                            "KDK",
                            &kdk_name,
                            ErrorCode::KdkRetrievalTimeout,
                            ErrorCode::KdkRetrievalFailure,
                        )
                    })?;
            self.import_kdk(&kdk_data)?;
        }

        self.decrypt_ck(&ck_data, &kdk.kdk_key_name)
    }

    fn import_kdk(&self, kdk_data: &Data) -> Result<()> {
        tracing::debug!(kdk = %kdk_data.name, "Decrypting and importing KDK");
        let failed = |e: &dyn std::fmt::Display| {
            NacError::new(
                ErrorCode::DecryptionFailure,
                format!("Failed to decrypt KDK [{}]: {}", kdk_data.name, e),
            )
        };

        let envelope = CompactEnvelope::wire_decode(&kdk_data.content).map_err(|e| failed(&e))?;
        let wrapped_secret = envelope
            .wrapped_secret
            .as_ref()
            .ok_or_else(|| failed(&"no wrapped secret"))?;
        let bag = SafeBag::wire_decode(&envelope.payload).map_err(|e| failed(&e))?;

        let secret = self
            .keychain
            .decrypt(wrapped_secret, &self.credentials_key)
            .map(Zeroizing::new)
            .map_err(|e| match e {
                StoreError::KeyNotFound(_) => NacError::new(
                    ErrorCode::TpmKeyNotFound,
                    format!(
                        "Could not decrypt secret, {} not found in TPM",
                        self.credentials_key
                    ),
                ),
                other => failed(&other),
            })?;

        self.internal_keychain
            .import_safe_bag(&bag, &secret)
            .map_err(|e| failed(&e))
    }

    fn decrypt_ck(&self, ck_data: &Data, kdk_key_name: &Name) -> Result<Zeroizing<Vec<u8>>> {
        tracing::debug!(ck = %ck_data.name, "Decrypting CK data");
        let envelope = CompactEnvelope::wire_decode(&ck_data.content).map_err(|e| {
            NacError::new(
                ErrorCode::InvalidEncryptedFormat,
                format!("Error decrypting EncryptedContent: {}", e),
            )
        })?;

        self.internal_keychain
            .decrypt(&envelope.payload, kdk_key_name)
            .map(Zeroizing::new)
            .map_err(|e| match e {
                StoreError::KeyNotFound(_) => NacError::new(
                    ErrorCode::TpmKeyNotFound,
                    format!("Could not decrypt secret, {} not found in TPM", kdk_key_name),
                ),
                other => NacError::new(
                    ErrorCode::DecryptionFailure,
                    format!("Error decrypting the CK EncryptedContent: {}", other),
                ),
            })
    }

    /// Record the outcome of a resolution and answer everything queued on it.
    fn finish(&self, ck_name: &Name, result: Result<Zeroizing<Vec<u8>>>) {
        let bits = match result {
            Ok(bits) => bits,
            Err(error) => {
                tracing::warn!(ck = %ck_name, error = %error, "CK resolution failed");
                let pending = {
                    let mut state = self.lock();
                    match state.content_keys.remove(ck_name) {
                        Some(ck) => ck.pending,
                        None => return,
                    }
                };
                for request in pending {
                    request.completion.complete(Err(error.clone()));
                }
                return;
            }
        };

        {
            let mut state = self.lock();
            let Some(ck) = state.content_keys.get_mut(ck_name) else {
                return;
            };
            ck.bits = Some(bits.clone());
            ck.task = None;
        }

        // Requests that arrive while draining join the queue, so answers
        // keep submission order.
        loop {
            let batch = {
                let mut state = self.lock();
                let Some(ck) = state.content_keys.get_mut(ck_name) else {
                    return;
                };
                if ck.pending.is_empty() {
                    ck.is_retrieved = true;
                    return;
                }
                std::mem::take(&mut ck.pending)
            };
            for request in batch {
                let result = decrypt_payload(&request.envelope, &bits);
                request.completion.complete(result);
            }
        }
    }

    fn shutdown(&self) {
        let pending: Vec<PendingDecrypt> = {
            let mut state = self.lock();
            state.shut_down = true;
            state
                .content_keys
                .drain()
                .flat_map(|(_, ck)| {
                    if let Some(task) = ck.task {
                        task.abort();
                    }
                    ck.pending
                })
                .collect()
        };
        for request in pending {
            request.completion.complete(Err(NacError::new(
                ErrorCode::Cancelled,
                "Canceling pending decrypt as ContentKey is being destroyed",
            )));
        }
    }
}

/// AES-CBC decrypt the envelope payload with the resolved CK.
fn decrypt_payload(envelope: &FullEnvelope, ck_bits: &[u8]) -> Result<Vec<u8>> {
    let params = EncryptParams {
        algorithm: EncryptAlgorithm::AesCbc,
        initial_vector: envelope.initial_vector.clone(),
    };
    symmetric::decrypt(ck_bits, &envelope.payload, &params).map_err(|e| {
        NacError::new(
            ErrorCode::DecryptionFailure,
            format!("Failed to decrypt content: {}", e),
        )
    })
}
