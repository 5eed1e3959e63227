//! Error types for the session and credential exchange API
//!
//! Variants caused by peer input map to a 4xx-class response in the web layer.
//! Configuration and local crypto failures map to 500, see
//! [`ExchangeError::status_code`].
//!
//! # Disclosure rules
//!
//! `Display` output is safe to return to the network: it never contains key
//! material, plaintext, submitted codes or expected codes. `TotpMismatch` in
//! particular carries no detail at all.
//!
//! # Example
//!
//! ```
//! use veil_core::ExchangeError;
//!
//! fn respond(err: &ExchangeError) -> (u16, String) {
//!     (err.status_code(), err.to_string())
//! }
//!
//! assert_eq!(respond(&ExchangeError::TotpMismatch).0, 401);
//! ```

use std::borrow::Cow;
use thiserror::Error;
use veil_crypto::CryptoError;

/// Errors surfaced by the handshake, envelope and credential operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    // ============ Handshake Errors ============
    /// No handshake is in flight for this client id
    #[error("no pending handshake for client `{0}`")]
    UnknownSession(String),

    /// KEM ciphertext was malformed or incompatible with the parameter set
    #[error("handshake failed: {0}")]
    HandshakeFailed(Cow<'static, str>),

    // ============ Envelope Errors ============
    /// Protected call before, or without, a completed handshake
    #[error("no established session for client `{0}`")]
    SessionNotEstablished(String),

    /// Tag mismatch or malformed envelope fields
    #[error("decryption failed")]
    DecryptionFailed,

    /// Decrypted request body did not have the expected shape
    #[error("invalid payload: {0}")]
    InvalidPayload(Cow<'static, str>),

    // ============ Credential Errors ============
    /// No enrollment or credential record for the device
    #[error("device `{0}` not found")]
    DeviceNotFound(String),

    /// Submitted one-time code did not match
    #[error("invalid one-time code")]
    TotpMismatch,

    // ============ Configuration Errors ============
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    // ============ Internal Errors ============
    /// Local cryptographic failure unrelated to peer input
    #[error("internal error: {0}")]
    Internal(Cow<'static, str>),
}

impl ExchangeError {
    /// HTTP-equivalent status the web layer should answer with
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            ExchangeError::UnknownSession(_) => 409,
            ExchangeError::HandshakeFailed(_) | ExchangeError::DecryptionFailed => 400,
            ExchangeError::SessionNotEstablished(_) | ExchangeError::TotpMismatch => 401,
            ExchangeError::DeviceNotFound(_) => 404,
            ExchangeError::InvalidPayload(_) => 422,
            ExchangeError::InvalidConfig(_) | ExchangeError::Internal(_) => 500,
        }
    }

    /// Returns true if the client should start a fresh handshake
    ///
    /// Decryption failures are included: with implicit KEM rejection a forged
    /// or corrupted completion message only shows up at the first envelope.
    #[must_use]
    pub fn requires_rehandshake(&self) -> bool {
        matches!(
            self,
            ExchangeError::UnknownSession(_)
                | ExchangeError::HandshakeFailed(_)
                | ExchangeError::SessionNotEstablished(_)
                | ExchangeError::DecryptionFailed
        )
    }

    /// Create a handshake error with static context (zero allocation)
    #[must_use]
    pub const fn handshake(context: &'static str) -> Self {
        ExchangeError::HandshakeFailed(Cow::Borrowed(context))
    }

    /// Create an invalid payload error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_payload(context: &'static str) -> Self {
        ExchangeError::InvalidPayload(Cow::Borrowed(context))
    }

    /// Create an invalid config error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        ExchangeError::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create an internal error with static context (zero allocation)
    #[must_use]
    pub const fn internal(context: &'static str) -> Self {
        ExchangeError::Internal(Cow::Borrowed(context))
    }
}

impl From<CryptoError> for ExchangeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed
            | CryptoError::InvalidNonceLength { .. }
            | CryptoError::InvalidEncoding(_) => ExchangeError::DecryptionFailed,
            CryptoError::InvalidCiphertextLength { .. } => {
                ExchangeError::handshake("ciphertext length does not match parameter set")
            }
            CryptoError::HandshakeFailed | CryptoError::InvalidPublicKey => {
                ExchangeError::handshake("decapsulation rejected")
            }
            CryptoError::InvalidKeyLength { .. } | CryptoError::InvalidKeyMaterial => {
                ExchangeError::handshake("derived key material rejected")
            }
            CryptoError::InvalidPayload(_) => {
                ExchangeError::invalid_payload("body is not the expected JSON document")
            }
            CryptoError::InvalidCode => ExchangeError::invalid_payload("malformed one-time code"),
            CryptoError::UnknownParameterSet(name) | CryptoError::UnknownAlgorithm(name) => {
                ExchangeError::InvalidConfig(Cow::Owned(format!("unknown algorithm `{name}`")))
            }
            CryptoError::EncryptionFailed => ExchangeError::internal("encryption failed"),
            CryptoError::RandomFailed => ExchangeError::internal("random number generation failed"),
        }
    }
}

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ExchangeError::UnknownSession("c".into()).status_code(), 409);
        assert_eq!(ExchangeError::handshake("x").status_code(), 400);
        assert_eq!(
            ExchangeError::SessionNotEstablished("c".into()).status_code(),
            401
        );
        assert_eq!(ExchangeError::DecryptionFailed.status_code(), 400);
        assert_eq!(ExchangeError::DeviceNotFound("d".into()).status_code(), 404);
        assert_eq!(ExchangeError::TotpMismatch.status_code(), 401);
        assert_eq!(ExchangeError::invalid_payload("x").status_code(), 422);
    }

    #[test]
    fn test_requires_rehandshake() {
        assert!(ExchangeError::UnknownSession("c".into()).requires_rehandshake());
        assert!(ExchangeError::handshake("x").requires_rehandshake());
        assert!(ExchangeError::SessionNotEstablished("c".into()).requires_rehandshake());
        assert!(ExchangeError::DecryptionFailed.requires_rehandshake());

        assert!(!ExchangeError::TotpMismatch.requires_rehandshake());
        assert!(!ExchangeError::DeviceNotFound("d".into()).requires_rehandshake());
        assert!(!ExchangeError::invalid_payload("x").requires_rehandshake());
    }

    #[test]
    fn test_totp_mismatch_display_has_no_detail() {
        assert_eq!(ExchangeError::TotpMismatch.to_string(), "invalid one-time code");
    }

    #[test]
    fn test_crypto_error_conversion() {
        let err: ExchangeError = CryptoError::InvalidCiphertextLength {
            expected: 768,
            actual: 12,
        }
        .into();
        assert!(matches!(err, ExchangeError::HandshakeFailed(_)));

        let err: ExchangeError = CryptoError::DecryptionFailed.into();
        assert_eq!(err, ExchangeError::DecryptionFailed);

        let err: ExchangeError = CryptoError::InvalidEncoding("nonce_b64").into();
        assert_eq!(err, ExchangeError::DecryptionFailed);

        let err: ExchangeError = CryptoError::InvalidPayload("trailing".into()).into();
        assert!(matches!(err, ExchangeError::InvalidPayload(_)));

        let err: ExchangeError = CryptoError::UnknownParameterSet("ml-kem-9".into()).into();
        assert!(matches!(err, ExchangeError::InvalidConfig(_)));
    }

    #[test]
    fn test_local_failures_are_not_decryption_failures() {
        let err: ExchangeError = CryptoError::EncryptionFailed.into();
        assert!(matches!(err, ExchangeError::Internal(_)));
        assert_eq!(err.status_code(), 500);
        assert!(!err.requires_rehandshake());

        let err: ExchangeError = CryptoError::RandomFailed.into();
        assert!(matches!(err, ExchangeError::Internal(_)));

        let err: ExchangeError = CryptoError::InvalidKeyMaterial.into();
        assert!(matches!(err, ExchangeError::HandshakeFailed(_)));

        let err: ExchangeError = CryptoError::InvalidKeyLength {
            expected: 32,
            actual: 16,
        }
        .into();
        assert!(matches!(err, ExchangeError::HandshakeFailed(_)));
        assert!(err.requires_rehandshake());
    }

    #[test]
    fn test_convenience_constructors() {
        assert!(matches!(
            ExchangeError::handshake("bad"),
            ExchangeError::HandshakeFailed(Cow::Borrowed("bad"))
        ));
        assert!(matches!(
            ExchangeError::invalid_config("ttl"),
            ExchangeError::InvalidConfig(_)
        ));
    }
}
