//! JSON request and response bodies for the handshake and credential endpoints
//!
//! Binary fields travel as standard padded base64. [`Envelope`] itself lives in
//! `veil-crypto` and is re-exported here.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use veil_crypto::TotpCode;

pub use veil_crypto::Envelope;

use crate::error::{ExchangeError, Result};

/// First handshake message: client asks for a fresh public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemInitiateRequest {
    /// Peer-supplied client identifier
    pub client_id: String,
}

/// Server answer to [`KemInitiateRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemInitiateResponse {
    /// Encapsulation key, base64
    pub public_key_b64: String,
}

impl KemInitiateResponse {
    /// Encode a raw public key
    #[must_use]
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self {
            public_key_b64: BASE64.encode(public_key),
        }
    }

    /// Decode the public key
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::HandshakeFailed` on malformed base64.
    pub fn public_key(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.public_key_b64)
            .map_err(|_| ExchangeError::handshake("public key is not valid base64"))
    }
}

/// Second handshake message: client returns the KEM ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemCompleteRequest {
    /// Peer-supplied client identifier
    pub client_id: String,
    /// Encapsulation ciphertext, base64
    pub ciphertext_b64: String,
}

impl KemCompleteRequest {
    /// Build a request from a raw ciphertext
    #[must_use]
    pub fn new(client_id: impl Into<String>, ciphertext: &[u8]) -> Self {
        Self {
            client_id: client_id.into(),
            ciphertext_b64: BASE64.encode(ciphertext),
        }
    }

    /// Decode the ciphertext
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::HandshakeFailed` on malformed base64.
    pub fn ciphertext(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.ciphertext_b64)
            .map_err(|_| ExchangeError::handshake("ciphertext is not valid base64"))
    }
}

/// Decrypted body of a credential request
///
/// `code` is accepted either as a JSON number or a six-character string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequest {
    /// Device whose credentials are requested
    pub device_id: String,
    /// One-time code shown on the device
    pub code: TotpCode,
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP-equivalent status
    pub status_code: u16,
    /// Human-readable message, free of secrets
    pub detail: String,
}

impl From<&ExchangeError> for ErrorBody {
    fn from(err: &ExchangeError) -> Self {
        Self {
            status_code: err.status_code(),
            detail: err.to_string(),
        }
    }
}
