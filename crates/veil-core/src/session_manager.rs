//! KEM handshake and envelope session management
//!
//! # Handshake Flow
//!
//! ```text
//! Client                               Server
//!    |                                    |
//!    |---- initiate {client_id} --------->|  generate ML-KEM key pair
//!    |                                    |  store PENDING
//!    |<--- {public_key_b64} --------------|
//!    |                                    |
//!    |  encapsulate(public_key)           |
//!    |---- complete {ciphertext_b64} ---->|  decapsulate, drop key pair
//!    |                                    |  store ESTABLISHED
//!    |                                    |
//!    |==== envelope(request) ============>|  open with session key
//!    |<=== envelope(response) ============|  seal with session key
//! ```
//!
//! Initiating again for a client id replaces whatever session it had. The
//! [`Initiated`] result reports what was replaced.
//!
//! The 32-byte KEM shared secret is used directly as the AEAD key.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use veil_crypto::{AeadKey, Envelope, EnvelopeCodec, KemKeyPair, KemParameterSet};

use crate::clock::{Clock, SystemClock};
use crate::config::{ExchangeConfig, SessionConfig};
use crate::error::{ExchangeError, Result};
use crate::store::{CompleteOutcome, PendingHandshake, Replaced, SessionState, SessionStore};
use crate::wire::{KemCompleteRequest, KemInitiateRequest, KemInitiateResponse};

/// Result of [`SessionManager::initiate_handshake`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initiated {
    /// Encapsulation key to send to the client
    pub public_key: Vec<u8>,
    /// What the new pending handshake replaced
    pub replaced: Replaced,
}

/// Server side of the handshake plus the envelope operations that depend on it
///
/// Thread-safe; share it behind an `Arc`.
pub struct SessionManager {
    store: Arc<SessionStore>,
    config: SessionConfig,
    codec: EnvelopeCodec,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a session manager on the system clock
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a session manager on an injected clock
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::InvalidConfig` if the configuration is invalid.
    pub fn with_clock(config: &ExchangeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let session = config.session.clone();

        Ok(Self {
            store: Arc::new(SessionStore::new(session.pending_ttl)),
            codec: EnvelopeCodec::new(session.aead),
            config: session,
            clock,
        })
    }

    /// KEM parameter set used for new handshakes
    #[must_use]
    pub fn parameter_set(&self) -> KemParameterSet {
        self.config.kem
    }

    /// Envelope codec shared by all sessions
    #[must_use]
    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// Clock used for expiry and TOTP steps
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Underlying session store
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Start a handshake: generate a key pair and store it as pending
    ///
    /// Also sweeps expired pending handshakes of other clients when a sweep
    /// is due, see [`SessionStore::insert_pending`].
    pub fn initiate_handshake(&self, client_id: &str) -> Initiated {
        let keypair = KemKeyPair::generate(self.config.kem);
        let public_key = keypair.public_key().to_vec();

        let replaced = self
            .store
            .insert_pending(client_id, PendingHandshake::new(keypair, self.clock.now()));

        match replaced {
            Replaced::Nothing => {
                tracing::debug!(client_id, kem = %self.config.kem, "handshake initiated");
            }
            Replaced::Pending => {
                tracing::info!(
                    client_id,
                    "handshake re-initiated, previous pending key pair discarded"
                );
            }
            Replaced::Established => {
                tracing::info!(
                    client_id,
                    "handshake re-initiated, established session invalidated"
                );
            }
        }

        Initiated {
            public_key,
            replaced,
        }
    }

    /// Finish a handshake with the client's KEM ciphertext
    ///
    /// # Errors
    ///
    /// - `ExchangeError::UnknownSession` if no pending handshake exists, which
    ///   covers replays, expired handshakes and already established sessions.
    /// - `ExchangeError::HandshakeFailed` if the ciphertext is rejected. The
    ///   pending handshake is dropped.
    pub fn complete_handshake(&self, client_id: &str, ciphertext: &[u8]) -> Result<()> {
        let outcome = self
            .store
            .complete_pending(client_id, self.clock.now(), |keypair| {
                let secret = keypair.decapsulate(ciphertext)?;
                AeadKey::from_slice(secret.as_bytes())
            });

        match outcome {
            CompleteOutcome::Established => {
                tracing::info!(client_id, "session established");
                Ok(())
            }
            CompleteOutcome::NotPending => {
                tracing::warn!(client_id, "handshake completion without pending handshake");
                Err(ExchangeError::UnknownSession(client_id.to_string()))
            }
            CompleteOutcome::Expired => {
                tracing::warn!(client_id, "handshake completion after pending handshake expired");
                Err(ExchangeError::UnknownSession(client_id.to_string()))
            }
            CompleteOutcome::Rejected(e) => {
                tracing::warn!(client_id, error = %e, "handshake rejected");
                Err(e.into())
            }
        }
    }

    /// Encrypt `plaintext` for `client_id` under its session key
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::SessionNotEstablished` if the client has no
    /// established session.
    pub fn seal(&self, client_id: &str, plaintext: &[u8]) -> Result<Envelope> {
        self.with_session_key(client_id, |key| {
            self.codec.encrypt(client_id, plaintext, key)
        })
    }

    /// Decrypt an inbound envelope under its client's session key
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::SessionNotEstablished` if the envelope's client
    /// has no established session, `ExchangeError::DecryptionFailed` if the
    /// envelope does not authenticate.
    pub fn open(&self, envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
        let client_id = envelope.client_id.as_str();
        self.with_session_key(client_id, |key| self.codec.decrypt(envelope, key))
            .inspect_err(|e| {
                if matches!(e, ExchangeError::DecryptionFailed) {
                    tracing::warn!(client_id, "envelope failed authentication");
                }
            })
    }

    /// Serialize `payload` as JSON and seal it for `client_id`
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::seal`].
    pub fn seal_json<T: Serialize + ?Sized>(
        &self,
        client_id: &str,
        payload: &T,
    ) -> Result<Envelope> {
        self.with_session_key(client_id, |key| {
            self.codec.seal_json(client_id, payload, key)
        })
    }

    /// Open an envelope and parse its plaintext as JSON
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::open`], plus `ExchangeError::InvalidPayload`
    /// if the authenticated plaintext is not a `T`.
    pub fn open_json<T: DeserializeOwned>(&self, envelope: &Envelope) -> Result<T> {
        let client_id = envelope.client_id.as_str();
        self.with_session_key(client_id, |key| self.codec.open_json(envelope, key))
    }

    /// Tear down any session for `client_id`
    ///
    /// Returns true if a session existed.
    pub fn invalidate(&self, client_id: &str) -> bool {
        let removed = self.store.invalidate(client_id);
        if removed {
            tracing::info!(client_id, "session invalidated");
        }
        removed
    }

    /// Evict every expired pending handshake
    ///
    /// Returns the number evicted.
    pub fn purge_expired(&self) -> usize {
        let evicted = self.store.purge_expired(self.clock.now());
        if evicted > 0 {
            tracing::debug!(evicted, "purged expired pending handshakes");
        }
        evicted
    }

    /// Current session state for `client_id`
    #[must_use]
    pub fn session_state(&self, client_id: &str) -> Option<SessionState> {
        self.store.state(client_id, self.clock.now())
    }

    /// Answer a [`KemInitiateRequest`]
    pub fn handle_initiate(&self, request: &KemInitiateRequest) -> KemInitiateResponse {
        let initiated = self.initiate_handshake(&request.client_id);
        KemInitiateResponse::from_public_key(&initiated.public_key)
    }

    /// Answer a [`KemCompleteRequest`]
    ///
    /// A ciphertext that is not valid base64 fails the handshake and drops
    /// the pending entry, like any other malformed ciphertext.
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::complete_handshake`].
    pub fn handle_complete(&self, request: &KemCompleteRequest) -> Result<()> {
        let client_id = request.client_id.as_str();
        match request.ciphertext() {
            Ok(ciphertext) => self.complete_handshake(client_id, &ciphertext),
            Err(e) => {
                if self.store.discard_pending(client_id) {
                    tracing::warn!(client_id, "handshake rejected: undecodable ciphertext");
                    Err(e)
                } else {
                    Err(ExchangeError::UnknownSession(client_id.to_string()))
                }
            }
        }
    }

    fn with_session_key<R>(
        &self,
        client_id: &str,
        f: impl FnOnce(&AeadKey) -> std::result::Result<R, veil_crypto::CryptoError>,
    ) -> Result<R> {
        self.store
            .with_established(client_id, self.clock.now(), f)
            .ok_or_else(|| ExchangeError::SessionNotEstablished(client_id.to_string()))?
            .map_err(ExchangeError::from)
    }
}
