//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG. Nonces and keys are
//! never derived from a fallback source: if the OS generator fails, the
//! process aborts.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Fill a buffer with random bytes, aborting the process on CSPRNG failure.
///
/// Used for nonces, where a predictable value would silently break
/// confidentiality of every message under the same key.
pub fn fill_random_or_abort(buf: &mut [u8]) {
    if fill_random(buf).is_err() {
        std::process::abort();
    }
}

/// Generate a random 12-byte array (AEAD nonce size).
#[must_use]
pub fn random_12() -> [u8; 12] {
    let mut buf = [0u8; 12];
    fill_random_or_abort(&mut buf);
    buf
}

/// Generate a random 32-byte array.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn random_32() -> Result<[u8; 32], CryptoError> {
    let mut buf = [0u8; 32];
    fill_random(&mut buf)?;
    Ok(buf)
}
