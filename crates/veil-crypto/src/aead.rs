//! 96-bit-nonce AEAD encryption.
//!
//! Two interchangeable ciphers are supported, both with 256-bit keys,
//! 96-bit nonces and 128-bit authentication tags:
//!
//! - `AES-256-GCM` (default, what deployed device clients speak)
//! - `ChaCha20-Poly1305` (IETF variant, for targets without AES acceleration)
//!
//! ## Nonce discipline
//!
//! A 96-bit nonce is small enough that it must never repeat under one key.
//! [`Nonce::generate`] draws every nonce from the OS CSPRNG; there is no
//! counter mode, so nothing needs to be persisted across restarts.
//!
//! ## Usage
//!
//! ```
//! use veil_crypto::aead::{AeadAlgorithm, AeadKey, Nonce};
//!
//! let key = AeadKey::new([7u8; 32]);
//! let nonce = Nonce::generate();
//! let algorithm = AeadAlgorithm::Aes256Gcm;
//!
//! let ciphertext = algorithm.encrypt(&key, &nonce, b"secret", b"").unwrap();
//! let plaintext = algorithm.decrypt(&key, &nonce, &ciphertext, b"").unwrap();
//! assert_eq!(plaintext, b"secret");
//! ```

use std::fmt;
use std::str::FromStr;

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{AEAD_KEY_SIZE, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, CryptoError, random};

/// AEAD cipher selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadAlgorithm {
    /// AES-256 in Galois/Counter Mode.
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// ChaCha20 stream cipher with Poly1305 MAC (RFC 8439).
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// Canonical configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }

    /// Encrypt plaintext with associated data.
    ///
    /// Returns ciphertext with appended authentication tag (`plaintext.len()` + 16 bytes).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt(
        self,
        key: &AeadKey,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };

        let result = match self {
            Self::Aes256Gcm => Aes256Gcm::new((&key.0).into()).encrypt((&nonce.0).into(), payload),
            Self::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new((&key.0).into()).encrypt((&nonce.0).into(), payload)
            }
        };

        result.map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext with associated data.
    ///
    /// Input must include the authentication tag at the end.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on authentication failure or if
    /// the input is shorter than a tag.
    pub fn decrypt(
        self,
        key: &AeadKey,
        nonce: &Nonce,
        ciphertext_and_tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < AEAD_TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let payload = Payload {
            msg: ciphertext_and_tag,
            aad,
        };

        let result = match self {
            Self::Aes256Gcm => Aes256Gcm::new((&key.0).into()).decrypt((&nonce.0).into(), payload),
            Self::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new((&key.0).into()).decrypt((&nonce.0).into(), payload)
            }
        };

        result.map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl fmt::Display for AeadAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AeadAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" | "aes256gcm" | "aes-gcm" => Ok(Self::Aes256Gcm),
            "chacha20-poly1305" | "chacha20poly1305" => Ok(Self::ChaCha20Poly1305),
            _ => Err(CryptoError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// 96-bit AEAD nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; AEAD_NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; AEAD_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidNonceLength` if the slice is not 12 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; AEAD_NONCE_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: AEAD_NONCE_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Generate a fresh nonce from the OS CSPRNG.
    ///
    /// Aborts the process if the CSPRNG is unavailable.
    #[must_use]
    pub fn generate() -> Self {
        Self(random::random_12())
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AEAD_NONCE_SIZE] {
        &self.0
    }
}

/// AEAD encryption key (32 bytes).
///
/// Key is zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; AEAD_KEY_SIZE]);

impl AeadKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; AEAD_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != AEAD_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: AEAD_KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; AEAD_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Generate a random key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if the OS CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        random::random_32().map(Self)
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with extreme care - this exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AeadKey([REDACTED])")
    }
}
