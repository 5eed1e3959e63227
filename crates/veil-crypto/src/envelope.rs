//! Base64 JSON envelope for AEAD-protected messages.
//!
//! Every protected request and response body travels as
//!
//! ```json
//! { "client_id": "...", "nonce_b64": "...", "ciphertext_b64": "..." }
//! ```
//!
//! where the nonce is 12 random bytes and the ciphertext carries the 16-byte
//! tag at its end. No associated data is bound.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use zeroize::Zeroizing;

use crate::aead::{AeadAlgorithm, AeadKey, Nonce};
use crate::{AEAD_TAG_SIZE, CryptoError};

/// Wire representation of an encrypted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Peer-supplied session identifier.
    pub client_id: String,
    /// Base64 of the 12-byte nonce.
    #[serde(rename = "nonce_b64")]
    pub nonce: String,
    /// Base64 of ciphertext followed by the authentication tag.
    #[serde(rename = "ciphertext_b64")]
    pub ciphertext: String,
}

impl Envelope {
    /// Decode the nonce field.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidEncoding` or `CryptoError::InvalidNonceLength`.
    pub fn nonce_bytes(&self) -> Result<Nonce, CryptoError> {
        let raw = BASE64
            .decode(&self.nonce)
            .map_err(|_| CryptoError::InvalidEncoding("nonce_b64"))?;
        Nonce::from_slice(&raw)
    }

    /// Decode the ciphertext field.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidEncoding` if the field is not valid base64.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        BASE64
            .decode(&self.ciphertext)
            .map_err(|_| CryptoError::InvalidEncoding("ciphertext_b64"))
    }
}

/// Encrypts and decrypts envelopes with one AEAD algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeCodec {
    algorithm: AeadAlgorithm,
}

impl EnvelopeCodec {
    /// Create a codec for the given algorithm.
    #[must_use]
    pub const fn new(algorithm: AeadAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Algorithm used by this codec.
    #[must_use]
    pub const fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    /// Encrypt `plaintext` under `key` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the cipher rejects the input.
    pub fn encrypt(
        &self,
        client_id: &str,
        plaintext: &[u8],
        key: &AeadKey,
    ) -> Result<Envelope, CryptoError> {
        let nonce = Nonce::generate();
        let ciphertext = self.algorithm.encrypt(key, &nonce, plaintext, &[])?;

        Ok(Envelope {
            client_id: client_id.to_string(),
            nonce: BASE64.encode(nonce.as_bytes()),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Verify and decrypt an envelope.
    ///
    /// Every failure mode (bad base64, wrong nonce length, truncated
    /// ciphertext, tag mismatch) collapses to `CryptoError::DecryptionFailed`
    /// so callers cannot distinguish them.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed`.
    pub fn decrypt(
        &self,
        envelope: &Envelope,
        key: &AeadKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let nonce = envelope
            .nonce_bytes()
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let ciphertext = envelope
            .ciphertext_bytes()
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        self.algorithm
            .decrypt(key, &nonce, &ciphertext, &[])
            .map(Zeroizing::new)
    }

    /// Serialize `payload` as JSON and encrypt it.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidPayload` if serialization fails, or any
    /// error from [`EnvelopeCodec::encrypt`].
    pub fn seal_json<T: Serialize + ?Sized>(
        &self,
        client_id: &str,
        payload: &T,
        key: &AeadKey,
    ) -> Result<Envelope, CryptoError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(payload).map_err(|e| CryptoError::InvalidPayload(e.to_string()))?,
        );
        self.encrypt(client_id, &plaintext, key)
    }

    /// Decrypt an envelope and parse its plaintext as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` if authentication fails and
    /// `CryptoError::InvalidPayload` if the authenticated plaintext is not the
    /// expected JSON document.
    pub fn open_json<T: DeserializeOwned>(
        &self,
        envelope: &Envelope,
        key: &AeadKey,
    ) -> Result<T, CryptoError> {
        let plaintext = self.decrypt(envelope, key)?;
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::InvalidPayload(e.to_string()))
    }
}
