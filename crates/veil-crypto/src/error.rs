//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
///
/// Messages never carry key material, plaintext or one-time codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure or malformed envelope)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid nonce length
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Base64 field could not be decoded
    #[error("invalid base64 encoding in field `{0}`")]
    InvalidEncoding(&'static str),

    /// Decrypted payload was not the expected JSON document
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// KEM ciphertext has the wrong size for the parameter set
    #[error("invalid ciphertext length: expected {expected}, got {actual}")]
    InvalidCiphertextLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// KEM public key is malformed or has the wrong size
    #[error("invalid public key")]
    InvalidPublicKey,

    /// KEM decapsulation failed
    #[error("handshake failed: decapsulation rejected")]
    HandshakeFailed,

    /// Stored key material is corrupted or of the wrong format
    #[error("invalid key material")]
    InvalidKeyMaterial,

    /// One-time code is not a number in `0..=999999` or a 6-digit string
    #[error("invalid one-time code format")]
    InvalidCode,

    /// Unknown ML-KEM parameter set name
    #[error("unknown KEM parameter set: {0}")]
    UnknownParameterSet(String),

    /// Unknown AEAD algorithm name
    #[error("unknown AEAD algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
