//! Device enrollment and credential lookup
//!
//! The exchange reads device data through two collaborator traits so the
//! owning application can back them with whatever storage it uses.
//! [`MemoryRegistry`] implements both over concurrent maps for tests, demos
//! and single-process deployments.

use std::fmt;
use std::future::{self, Future};
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use veil_crypto::{CryptoError, EnrollmentSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A device's TOTP secret and the instant its code clock started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    /// Shared HMAC key
    pub secret: EnrollmentSecret,
    /// Origin of the device's time steps
    pub enrolled_at: SystemTime,
}

impl EnrollmentRecord {
    /// Create a record
    #[must_use]
    pub fn new(secret: EnrollmentSecret, enrolled_at: SystemTime) -> Self {
        Self {
            secret,
            enrolled_at,
        }
    }
}

/// Login credentials released after a valid one-time code
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DeviceCredentials {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl DeviceCredentials {
    /// Create a credential pair
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Source of enrollment records
pub trait EnrollmentSource: Send + Sync {
    /// Look up the enrollment record for `device_id`
    fn fetch_enrollment_record(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Option<EnrollmentRecord>> + Send;
}

/// Source of device credentials
pub trait CredentialSource: Send + Sync {
    /// Look up the credentials for `device_id`
    fn fetch_credentials(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Option<DeviceCredentials>> + Send;
}

/// In-memory device registry
#[derive(Default)]
pub struct MemoryRegistry {
    enrollments: DashMap<String, EnrollmentRecord>,
    credentials: DashMap<String, DeviceCredentials>,
}

impl MemoryRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a device with a freshly generated secret
    ///
    /// Returns the secret to hand to the device. Replaces any previous
    /// enrollment and credentials for the same id.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if the OS CSPRNG fails.
    pub fn register(
        &self,
        device_id: &str,
        enrolled_at: SystemTime,
        credentials: DeviceCredentials,
    ) -> Result<EnrollmentSecret, CryptoError> {
        let secret = EnrollmentSecret::generate()?;
        self.insert_enrollment(device_id, EnrollmentRecord::new(secret.clone(), enrolled_at));
        self.insert_credentials(device_id, credentials);
        tracing::info!(device_id, "device registered");
        Ok(secret)
    }

    /// Store an enrollment record, replacing any existing one
    pub fn insert_enrollment(&self, device_id: &str, record: EnrollmentRecord) {
        self.enrollments.insert(device_id.to_owned(), record);
    }

    /// Store credentials, replacing any existing ones
    pub fn insert_credentials(&self, device_id: &str, credentials: DeviceCredentials) {
        self.credentials.insert(device_id.to_owned(), credentials);
    }

    /// Replace an enrolled device's secret and restart its code clock at `now`
    ///
    /// Returns `None` if the device is not enrolled.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if the OS CSPRNG fails.
    pub fn rotate_secret(
        &self,
        device_id: &str,
        now: SystemTime,
    ) -> Result<Option<EnrollmentSecret>, CryptoError> {
        let Some(mut record) = self.enrollments.get_mut(device_id) else {
            return Ok(None);
        };
        let secret = EnrollmentSecret::generate()?;
        *record = EnrollmentRecord::new(secret.clone(), now);
        tracing::info!(device_id, "enrollment secret rotated");
        Ok(Some(secret))
    }

    /// Forget a device entirely
    ///
    /// Returns true if anything was removed.
    pub fn remove(&self, device_id: &str) -> bool {
        let enrolled = self.enrollments.remove(device_id).is_some();
        let had_credentials = self.credentials.remove(device_id).is_some();
        enrolled || had_credentials
    }

    /// True if the device has an enrollment record
    #[must_use]
    pub fn is_enrolled(&self, device_id: &str) -> bool {
        self.enrollments.contains_key(device_id)
    }

    /// Number of enrolled devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.enrollments.len()
    }

    /// True if no device is enrolled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enrollments.is_empty()
    }
}

impl EnrollmentSource for MemoryRegistry {
    fn fetch_enrollment_record(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Option<EnrollmentRecord>> + Send {
        future::ready(self.enrollments.get(device_id).map(|r| r.value().clone()))
    }
}

impl CredentialSource for MemoryRegistry {
    fn fetch_credentials(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Option<DeviceCredentials>> + Send {
        future::ready(self.credentials.get(device_id).map(|c| c.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn t0() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[tokio::test]
    async fn test_register_and_fetch() {
        let registry = MemoryRegistry::new();
        let secret = registry
            .register("cam-1", t0(), DeviceCredentials::new("admin", "hunter2"))
            .unwrap();
        assert_eq!(secret.as_bytes().len(), 32);

        let record = registry.fetch_enrollment_record("cam-1").await.unwrap();
        assert_eq!(record.secret, secret);
        assert_eq!(record.enrolled_at, t0());

        let creds = registry.fetch_credentials("cam-1").await.unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "hunter2");
    }

    #[tokio::test]
    async fn test_missing_device() {
        let registry = MemoryRegistry::new();
        assert!(registry.fetch_enrollment_record("nope").await.is_none());
        assert!(registry.fetch_credentials("nope").await.is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_rotate_secret() {
        let registry = MemoryRegistry::new();
        let old = registry
            .register("cam-1", t0(), DeviceCredentials::new("a", "b"))
            .unwrap();

        let later = t0() + Duration::from_secs(3600);
        let new = registry.rotate_secret("cam-1", later).unwrap().unwrap();
        assert_ne!(old, new);

        let record = registry.fetch_enrollment_record("cam-1").await.unwrap();
        assert_eq!(record.secret, new);
        assert_eq!(record.enrolled_at, later);

        assert!(registry.rotate_secret("other", later).unwrap().is_none());
    }

    #[test]
    fn test_remove() {
        let registry = MemoryRegistry::new();
        registry
            .register("cam-1", t0(), DeviceCredentials::new("a", "b"))
            .unwrap();
        assert!(registry.is_enrolled("cam-1"));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("cam-1"));
        assert!(!registry.remove("cam-1"));
        assert!(!registry.is_enrolled("cam-1"));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = DeviceCredentials::new("admin", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
