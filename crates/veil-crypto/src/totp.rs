//! Per-device time-based one-time codes.
//!
//! HOTP (RFC 4226) over a time-derived counter, with one difference from
//! RFC 6238: time is measured from the device's enrollment instant, not the
//! Unix epoch.
//!
//! ```text
//! elapsed = floor(now - enrolled_at)      (seconds, saturating at 0)
//! counter = floor(elapsed / 30)           (8 bytes, big-endian)
//! digest  = HMAC-SHA1(secret, counter)
//! offset  = digest[19] & 0x0F
//! code    = (digest[offset..offset + 4] as u31) mod 10^6
//! ```
//!
//! Verification accepts only the code of the current step. There is no
//! look-behind or look-ahead window.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, constant_time, random};

/// Time step in seconds.
pub const TIME_STEP_SECS: u64 = 30;

/// Number of decimal digits in a code.
pub const CODE_DIGITS: usize = 6;

/// Length of a generated enrollment secret.
pub const ENROLLMENT_SECRET_LEN: usize = 32;

const CODE_MODULUS: u32 = 1_000_000;

type HmacSha1 = Hmac<Sha1>;

/// A six-digit one-time code.
///
/// Serializes as a zero-padded string and deserializes from either a decimal
/// integer or an exactly-six-digit string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TotpCode(u32);

impl TotpCode {
    /// Create a code from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidCode` if `value` exceeds 999999.
    pub fn new(value: u32) -> Result<Self, CryptoError> {
        if value >= CODE_MODULUS {
            return Err(CryptoError::InvalidCode);
        }
        Ok(Self(value))
    }

    /// Numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TotpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = CODE_DIGITS)
    }
}

impl fmt::Debug for TotpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpCode(******)")
    }
}

impl FromStr for TotpCode {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CODE_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::InvalidCode);
        }
        let value = s.parse::<u32>().map_err(|_| CryptoError::InvalidCode)?;
        Self::new(value)
    }
}

impl Serialize for TotpCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TotpCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(u64),
            Text(String),
        }

        let code = match Wire::deserialize(deserializer)? {
            Wire::Number(n) => u32::try_from(n)
                .map_err(|_| CryptoError::InvalidCode)
                .and_then(TotpCode::new),
            Wire::Text(s) => s.parse(),
        };
        code.map_err(serde::de::Error::custom)
    }
}

/// Shared per-device TOTP secret.
///
/// Held as raw bytes; the registry stores the text form handed to the device
/// at registration. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EnrollmentSecret(Vec<u8>);

impl EnrollmentSecret {
    /// Wrap existing secret bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Generate a 32-character secret from printable ASCII (`0x21..=0x7E`).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if the OS CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        const ALPHABET_START: u8 = 0x21;
        const ALPHABET_LEN: u8 = 0x7F - 0x21;
        // Largest multiple of the alphabet size that fits in a byte.
        const ACCEPT_BELOW: u8 = (u8::MAX / ALPHABET_LEN) * ALPHABET_LEN;

        let mut secret = Vec::with_capacity(ENROLLMENT_SECRET_LEN);
        let mut pool = [0u8; 64];
        while secret.len() < ENROLLMENT_SECRET_LEN {
            random::fill_random(&mut pool)?;
            for &byte in pool.iter().filter(|&&b| b < ACCEPT_BELOW) {
                if secret.len() == ENROLLMENT_SECRET_LEN {
                    break;
                }
                secret.push(ALPHABET_START + byte % ALPHABET_LEN);
            }
        }
        pool.zeroize();

        Ok(Self(secret))
    }

    /// Raw secret bytes used as the HMAC key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Text form, if the secret is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for EnrollmentSecret {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl fmt::Debug for EnrollmentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnrollmentSecret([REDACTED])")
    }
}

/// Step counter for `now`, measured from `enrolled_at`.
///
/// A clock reading earlier than the enrollment instant maps to step 0.
#[must_use]
pub fn time_counter(enrolled_at: SystemTime, now: SystemTime) -> u64 {
    let elapsed = now
        .duration_since(enrolled_at)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    elapsed / TIME_STEP_SECS
}

/// HOTP value for an explicit counter.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` if the MAC rejects the key.
pub fn hotp(secret: &[u8], counter: u64) -> Result<TotpCode, CryptoError> {
    let mut mac = HmacSha1::new_from_slice(secret).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 0,
        actual: secret.len(),
    })?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[19] & 0x0F);
    let truncated = (u32::from(digest[offset] & 0x7F) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    Ok(TotpCode(truncated % CODE_MODULUS))
}

/// Code for `now` under a device's secret and enrollment instant.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` if the MAC rejects the key.
pub fn derive_code(
    secret: &EnrollmentSecret,
    enrolled_at: SystemTime,
    now: SystemTime,
) -> Result<TotpCode, CryptoError> {
    hotp(secret.as_bytes(), time_counter(enrolled_at, now))
}

/// Check `submitted` against the code for `now`, in constant time.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` if the MAC rejects the key.
pub fn verify(
    secret: &EnrollmentSecret,
    enrolled_at: SystemTime,
    submitted: TotpCode,
    now: SystemTime,
) -> Result<bool, CryptoError> {
    let expected = derive_code(secret, enrolled_at, now)?;
    Ok(constant_time::ct_eq_u32(expected.value(), submitted.value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    const RFC_SECRET: &str = "12345678901234567890";

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_rfc4226_hotp_vectors() {
        let expected = [
            755_224, 287_082, 359_152, 969_429, 338_314, 254_676, 287_922, 162_583, 399_871,
            520_489,
        ];
        for (counter, &code) in expected.iter().enumerate() {
            assert_eq!(
                hotp(RFC_SECRET.as_bytes(), counter as u64).unwrap().value(),
                code,
                "counter {counter}"
            );
        }
    }

    #[test]
    fn test_rfc6238_sha1_vectors_with_unix_epoch_enrollment() {
        // Appendix B, truncated to six digits.
        let secret = EnrollmentSecret::from(RFC_SECRET);
        let vectors = [
            (59, 287_082),
            (1_111_111_109, 81_804),
            (1_111_111_111, 50_471),
            (1_234_567_890, 5_924),
            (2_000_000_000, 279_037),
            (20_000_000_000, 353_130),
        ];
        for (time, code) in vectors {
            assert_eq!(
                derive_code(&secret, UNIX_EPOCH, at(time)).unwrap().value(),
                code,
                "time {time}"
            );
        }
    }

    #[test]
    fn test_counter_measured_from_enrollment() {
        let t0 = at(1_700_000_000);
        assert_eq!(time_counter(t0, t0), 0);
        assert_eq!(time_counter(t0, t0 + Duration::from_secs(29)), 0);
        assert_eq!(time_counter(t0, t0 + Duration::from_secs(30)), 1);
        assert_eq!(time_counter(t0, t0 + Duration::from_millis(59_999)), 1);
        assert_eq!(time_counter(t0, t0 + Duration::from_secs(75)), 2);
    }

    #[test]
    fn test_clock_before_enrollment_saturates() {
        let t0 = at(1_700_000_000);
        assert_eq!(time_counter(t0, t0 - Duration::from_secs(3600)), 0);
    }

    #[test]
    fn test_same_window_same_code() {
        let secret = EnrollmentSecret::from("device-secret");
        let t0 = at(1_650_000_000);
        let first = derive_code(&secret, t0, t0).unwrap();
        for offset in 1..30 {
            let code = derive_code(&secret, t0, t0 + Duration::from_secs(offset)).unwrap();
            assert_eq!(code, first);
        }
    }

    #[test]
    fn test_verify_exact_step_only() {
        let secret = EnrollmentSecret::from("device-secret");
        let t0 = at(1_650_000_000);
        let now = t0 + Duration::from_secs(45);
        let code = derive_code(&secret, t0, now).unwrap();

        assert!(verify(&secret, t0, code, now).unwrap());
        assert!(!verify(&secret, t0, code, now + Duration::from_secs(30)).unwrap());
        assert!(!verify(&secret, t0, code, now - Duration::from_secs(30)).unwrap());
    }

    #[test]
    fn test_code_formatting_and_parsing() {
        let code = TotpCode::new(5_924).unwrap();
        assert_eq!(code.to_string(), "005924");
        assert_eq!("005924".parse::<TotpCode>().unwrap(), code);

        assert!("5924".parse::<TotpCode>().is_err());
        assert!("12345a".parse::<TotpCode>().is_err());
        assert!("+12345".parse::<TotpCode>().is_err());
        assert!("1234567".parse::<TotpCode>().is_err());
        assert!(TotpCode::new(1_000_000).is_err());
    }

    #[test]
    fn test_code_json_forms() {
        let from_number: TotpCode = serde_json::from_str("5924").unwrap();
        let from_text: TotpCode = serde_json::from_str("\"005924\"").unwrap();
        assert_eq!(from_number, from_text);
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"005924\"");

        assert!(serde_json::from_str::<TotpCode>("1000000").is_err());
        assert!(serde_json::from_str::<TotpCode>("\"5924\"").is_err());
        assert!(serde_json::from_str::<TotpCode>("-1").is_err());
    }

    #[test]
    fn test_code_debug_hides_value() {
        let code = TotpCode::new(123_456).unwrap();
        assert!(!format!("{code:?}").contains("123456"));
    }

    #[test]
    fn test_generated_secret_alphabet() {
        let secret = EnrollmentSecret::generate().unwrap();
        assert_eq!(secret.as_bytes().len(), ENROLLMENT_SECRET_LEN);
        assert!(secret.as_bytes().iter().all(|b| (0x21..=0x7E).contains(b)));
        assert!(secret.as_str().is_some());
        assert_ne!(secret, EnrollmentSecret::generate().unwrap());
    }
}
