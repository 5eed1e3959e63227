//! # VEIL Crypto
//!
//! Cryptographic building blocks for the VEIL device session protocol.
//!
//! This crate provides:
//! - ML-KEM key pairs for the post-quantum handshake (FIPS 203)
//! - 96-bit-nonce AEAD ciphers with 256-bit keys
//! - The base64 JSON envelope that wraps every protected message
//! - Per-device TOTP code derivation and verification
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Key Encapsulation | ML-KEM-512 / 768 / 1024 | 32-byte shared secret |
//! | AEAD | AES-256-GCM or ChaCha20-Poly1305 | 12-byte random nonce, 16-byte tag |
//! | One-time codes | HMAC-SHA1, dynamic truncation | 30 s step, 6 digits |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod aead;
pub mod constant_time;
pub mod envelope;
pub mod error;
pub mod kem;
pub mod random;
pub mod totp;

pub use aead::{AeadAlgorithm, AeadKey, Nonce};
pub use envelope::{Envelope, EnvelopeCodec};
pub use error::CryptoError;
pub use kem::{KemKeyPair, KemParameterSet, SharedSecret};
pub use totp::{EnrollmentSecret, TotpCode};

/// AEAD key size (256 bits).
pub const AEAD_KEY_SIZE: usize = 32;

/// AEAD nonce size (96 bits).
pub const AEAD_NONCE_SIZE: usize = 12;

/// AEAD authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// Shared secret size produced by every ML-KEM parameter set.
pub const SHARED_SECRET_SIZE: usize = 32;
