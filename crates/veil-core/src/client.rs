//! Client side of the handshake
//!
//! [`HandshakeClient`] is what an embedded device runs: it encapsulates to the
//! server's public key, keeps its copy of the shared secret and seals requests
//! with it.

use serde::Serialize;
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use veil_crypto::{AeadAlgorithm, AeadKey, Envelope, EnvelopeCodec, KemParameterSet, kem};

use crate::config::SessionConfig;
use crate::error::{ExchangeError, Result};
use crate::wire::{KemCompleteRequest, KemInitiateRequest, KemInitiateResponse};

/// Device-side session state
pub struct HandshakeClient {
    client_id: String,
    parameter_set: KemParameterSet,
    codec: EnvelopeCodec,
    key: Option<AeadKey>,
}

impl HandshakeClient {
    /// Create a client for `client_id`
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        parameter_set: KemParameterSet,
        aead: AeadAlgorithm,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            parameter_set,
            codec: EnvelopeCodec::new(aead),
            key: None,
        }
    }

    /// Create a client speaking the same algorithms as a server config
    #[must_use]
    pub fn from_config(client_id: impl Into<String>, config: &SessionConfig) -> Self {
        Self::new(client_id, config.kem, config.aead)
    }

    /// Client identifier sent with every message
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// True once [`HandshakeClient::complete_request`] has succeeded
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.key.is_some()
    }

    /// First handshake message
    #[must_use]
    pub fn initiate_request(&self) -> KemInitiateRequest {
        KemInitiateRequest {
            client_id: self.client_id.clone(),
        }
    }

    /// Encapsulate to the server's public key and build the second message
    ///
    /// Replaces any previously held session key.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::HandshakeFailed` if the public key is malformed
    /// or has the wrong size for the parameter set.
    pub fn complete_request(
        &mut self,
        response: &KemInitiateResponse,
    ) -> Result<KemCompleteRequest> {
        let public_key = response.public_key()?;
        let (ciphertext, secret) = kem::encapsulate(self.parameter_set, &public_key)
            .map_err(|_| ExchangeError::handshake("server public key rejected"))?;

        self.key = Some(AeadKey::from_slice(secret.as_bytes())?);
        Ok(KemCompleteRequest::new(self.client_id.clone(), &ciphertext))
    }

    /// Drop the session key
    pub fn reset(&mut self) {
        self.key = None;
    }

    /// Encrypt a raw request body
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::SessionNotEstablished` before the handshake.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Envelope> {
        Ok(self.codec.encrypt(&self.client_id, plaintext, self.key()?)?)
    }

    /// Decrypt a raw response body
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::SessionNotEstablished` before the handshake and
    /// `ExchangeError::DecryptionFailed` if the envelope does not authenticate.
    pub fn open(&self, envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.codec.decrypt(envelope, self.key()?)?)
    }

    /// Serialize and encrypt a request body
    ///
    /// # Errors
    ///
    /// Same as [`HandshakeClient::seal`].
    pub fn seal_request<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Envelope> {
        Ok(self.codec.seal_json(&self.client_id, payload, self.key()?)?)
    }

    /// Decrypt and parse a response body
    ///
    /// # Errors
    ///
    /// Same as [`HandshakeClient::open`], plus `ExchangeError::InvalidPayload`
    /// if the plaintext is not a `T`.
    pub fn open_response<T: DeserializeOwned>(&self, envelope: &Envelope) -> Result<T> {
        Ok(self.codec.open_json(envelope, self.key()?)?)
    }

    fn key(&self) -> Result<&AeadKey> {
        self.key
            .as_ref()
            .ok_or_else(|| ExchangeError::SessionNotEstablished(self.client_id.clone()))
    }
}
