//! ML-KEM (Kyber) key encapsulation mechanism (FIPS 203).
//!
//! The server side of the handshake generates a [`KemKeyPair`], publishes the
//! encapsulation key, and later decapsulates the client's ciphertext into a
//! 32-byte [`SharedSecret`]. The client side calls [`encapsulate`].
//!
//! Sizes are fixed by the chosen [`KemParameterSet`]:
//!
//! | Set | Public key | Ciphertext | Decapsulation key |
//! |-----|-----------|------------|-------------------|
//! | ML-KEM-512 | 800 | 768 | 1632 |
//! | ML-KEM-768 | 1184 | 1088 | 2400 |
//! | ML-KEM-1024 | 1568 | 1568 | 3168 |
//!
//! # Security
//!
//! - Decapsulation key bytes and shared secrets live in zeroizing buffers.
//! - ML-KEM uses implicit rejection: a well-sized but forged ciphertext
//!   decapsulates to an unrelated secret rather than an error. Only a size
//!   mismatch fails here; a forged ciphertext surfaces later as an AEAD
//!   authentication failure.
//!
//! # Example
//!
//! ```
//! use veil_crypto::kem::{self, KemKeyPair, KemParameterSet};
//!
//! let server = KemKeyPair::generate(KemParameterSet::MlKem512);
//! let (ciphertext, client_secret) =
//!     kem::encapsulate(KemParameterSet::MlKem512, server.public_key()).unwrap();
//!
//! let server_secret = server.decapsulate(&ciphertext).unwrap();
//! assert_eq!(client_secret.as_bytes(), server_secret.as_bytes());
//! ```

use std::fmt;
use std::str::FromStr;

use ::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore, MlKem512, MlKem768, MlKem1024};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{CryptoError, SHARED_SECRET_SIZE};

/// Named ML-KEM parameter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KemParameterSet {
    /// ML-KEM-512 (NIST security category 1).
    #[default]
    #[serde(rename = "ml-kem-512")]
    MlKem512,
    /// ML-KEM-768 (NIST security category 3).
    #[serde(rename = "ml-kem-768")]
    MlKem768,
    /// ML-KEM-1024 (NIST security category 5).
    #[serde(rename = "ml-kem-1024")]
    MlKem1024,
}

impl KemParameterSet {
    /// Canonical configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MlKem512 => "ml-kem-512",
            Self::MlKem768 => "ml-kem-768",
            Self::MlKem1024 => "ml-kem-1024",
        }
    }

    /// Encapsulation (public) key size in bytes.
    #[must_use]
    pub const fn public_key_size(self) -> usize {
        match self {
            Self::MlKem512 => 800,
            Self::MlKem768 => 1184,
            Self::MlKem1024 => 1568,
        }
    }

    /// Ciphertext size in bytes.
    #[must_use]
    pub const fn ciphertext_size(self) -> usize {
        match self {
            Self::MlKem512 => 768,
            Self::MlKem768 => 1088,
            Self::MlKem1024 => 1568,
        }
    }

    /// Decapsulation (private) key size in bytes.
    #[must_use]
    pub const fn decapsulation_key_size(self) -> usize {
        match self {
            Self::MlKem512 => 1632,
            Self::MlKem768 => 2400,
            Self::MlKem1024 => 3168,
        }
    }
}

impl fmt::Display for KemParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KemParameterSet {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ml-kem-512" | "mlkem512" | "kyber512" => Ok(Self::MlKem512),
            "ml-kem-768" | "mlkem768" | "kyber768" => Ok(Self::MlKem768),
            "ml-kem-1024" | "mlkem1024" | "kyber1024" => Ok(Self::MlKem1024),
            _ => Err(CryptoError::UnknownParameterSet(s.to_string())),
        }
    }
}

/// 32-byte secret produced by decapsulation, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    /// Wrap raw secret bytes.
    #[must_use]
    pub fn new(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get raw secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

/// Server-side ML-KEM key pair for one pending handshake.
///
/// The decapsulation key is held only as zeroizing bytes and is wiped when the
/// key pair is dropped.
pub struct KemKeyPair {
    parameter_set: KemParameterSet,
    decapsulation_key_bytes: Zeroizing<Vec<u8>>,
    encapsulation_key_bytes: Vec<u8>,
}

impl KemKeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    #[must_use]
    pub fn generate(parameter_set: KemParameterSet) -> Self {
        let (decapsulation_key_bytes, encapsulation_key_bytes) = match parameter_set {
            KemParameterSet::MlKem512 => generate_with::<MlKem512>(),
            KemParameterSet::MlKem768 => generate_with::<MlKem768>(),
            KemParameterSet::MlKem1024 => generate_with::<MlKem1024>(),
        };

        Self {
            parameter_set,
            decapsulation_key_bytes,
            encapsulation_key_bytes,
        }
    }

    /// Parameter set this key pair belongs to.
    #[must_use]
    pub fn parameter_set(&self) -> KemParameterSet {
        self.parameter_set
    }

    /// Encapsulation key bytes, safe to publish.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.encapsulation_key_bytes
    }

    /// Recover the shared secret from a client ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidCiphertextLength` if the ciphertext does not
    /// match the parameter set, `CryptoError::HandshakeFailed` if
    /// decapsulation is rejected.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret, CryptoError> {
        let expected = self.parameter_set.ciphertext_size();
        if ciphertext.len() != expected {
            return Err(CryptoError::InvalidCiphertextLength {
                expected,
                actual: ciphertext.len(),
            });
        }

        match self.parameter_set {
            KemParameterSet::MlKem512 => {
                decapsulate_with::<MlKem512>(&self.decapsulation_key_bytes, ciphertext)
            }
            KemParameterSet::MlKem768 => {
                decapsulate_with::<MlKem768>(&self.decapsulation_key_bytes, ciphertext)
            }
            KemParameterSet::MlKem1024 => {
                decapsulate_with::<MlKem1024>(&self.decapsulation_key_bytes, ciphertext)
            }
        }
    }
}

impl fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("parameter_set", &self.parameter_set)
            .field("public_key_len", &self.encapsulation_key_bytes.len())
            .finish_non_exhaustive()
    }
}

/// Client side: encapsulate a fresh shared secret to a server public key.
///
/// Returns the ciphertext to send and the client's copy of the secret.
///
/// # Errors
///
/// Returns `CryptoError::InvalidPublicKey` if the key has the wrong size for
/// the parameter set or encapsulation fails.
pub fn encapsulate(
    parameter_set: KemParameterSet,
    public_key: &[u8],
) -> Result<(Vec<u8>, SharedSecret), CryptoError> {
    if public_key.len() != parameter_set.public_key_size() {
        return Err(CryptoError::InvalidPublicKey);
    }

    match parameter_set {
        KemParameterSet::MlKem512 => encapsulate_with::<MlKem512>(public_key),
        KemParameterSet::MlKem768 => encapsulate_with::<MlKem768>(public_key),
        KemParameterSet::MlKem1024 => encapsulate_with::<MlKem1024>(public_key),
    }
}

fn generate_with<K: KemCore>() -> (Zeroizing<Vec<u8>>, Vec<u8>) {
    let (decapsulation_key, encapsulation_key) = K::generate(&mut OsRng);

    let mut dk_encoded = decapsulation_key.as_bytes();
    let dk_bytes = Zeroizing::new(dk_encoded[..].to_vec());
    dk_encoded[..].zeroize();

    (dk_bytes, encapsulation_key.as_bytes()[..].to_vec())
}

fn decapsulate_with<K: KemCore>(
    dk_bytes: &[u8],
    ciphertext: &[u8],
) -> Result<SharedSecret, CryptoError> {
    let mut dk_encoded = Encoded::<K::DecapsulationKey>::try_from(dk_bytes)
        .map_err(|_| CryptoError::InvalidKeyMaterial)?;
    let decapsulation_key = K::DecapsulationKey::from_bytes(&dk_encoded);
    dk_encoded[..].zeroize();

    let ciphertext =
        Ciphertext::<K>::try_from(ciphertext).map_err(|_| CryptoError::HandshakeFailed)?;

    let mut shared = decapsulation_key
        .decapsulate(&ciphertext)
        .map_err(|_| CryptoError::HandshakeFailed)?;

    let secret = secret_from_slice(&shared[..]);
    shared[..].zeroize();
    secret
}

fn encapsulate_with<K: KemCore>(public_key: &[u8]) -> Result<(Vec<u8>, SharedSecret), CryptoError> {
    let ek_encoded = Encoded::<K::EncapsulationKey>::try_from(public_key)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let encapsulation_key = K::EncapsulationKey::from_bytes(&ek_encoded);

    let (ciphertext, mut shared) = encapsulation_key
        .encapsulate(&mut OsRng)
        .map_err(|_| CryptoError::InvalidPublicKey)?;

    let secret = secret_from_slice(&shared[..]);
    shared[..].zeroize();
    Ok((ciphertext[..].to_vec(), secret?))
}

fn secret_from_slice(bytes: &[u8]) -> Result<SharedSecret, CryptoError> {
    let array: [u8; SHARED_SECRET_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::InvalidKeyMaterial)?;
    Ok(SharedSecret(array))
}
