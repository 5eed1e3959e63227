//! TOTP-gated credential release
//!
//! ```text
//! envelope ──open──▶ { device_id, code } ──▶ enrollment record
//!                                              │
//!                         derive code at now ◀─┘
//!                                │
//!                 match ─────────┴───────── mismatch
//!                   │                          │
//!          fetch credentials             TotpMismatch
//!                   │
//!   envelope ◀──seal── { username, password }
//! ```
//!
//! Only the code for the current 30 second step is accepted.

use std::sync::Arc;
use std::time::SystemTime;

use veil_crypto::{Envelope, TotpCode, totp};

use crate::error::{ExchangeError, Result};
use crate::registry::{CredentialSource, EnrollmentSource};
use crate::session_manager::SessionManager;
use crate::wire::CredentialRequest;

/// Credential exchange over established sessions
pub struct CredentialExchange<E, C> {
    sessions: Arc<SessionManager>,
    enrollments: Arc<E>,
    credentials: Arc<C>,
}

impl<E, C> CredentialExchange<E, C>
where
    E: EnrollmentSource,
    C: CredentialSource,
{
    /// Create an exchange over a session manager and two data sources
    pub fn new(sessions: Arc<SessionManager>, enrollments: Arc<E>, credentials: Arc<C>) -> Self {
        Self {
            sessions,
            enrollments,
            credentials,
        }
    }

    /// Session manager whose keys protect the exchange
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Check `submitted` against the device's code at `now`
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::DeviceNotFound` if the device has no usable
    /// enrollment record.
    pub async fn verify_totp(
        &self,
        device_id: &str,
        submitted: TotpCode,
        now: SystemTime,
    ) -> Result<bool> {
        let record = self
            .enrollments
            .fetch_enrollment_record(device_id)
            .await
            .ok_or_else(|| ExchangeError::DeviceNotFound(device_id.to_string()))?;

        totp::verify(&record.secret, record.enrolled_at, submitted, now)
            .map_err(|_| ExchangeError::DeviceNotFound(device_id.to_string()))
    }

    /// Release a device's credentials in exchange for its current code
    ///
    /// The response is sealed for the same client that sent `envelope`.
    ///
    /// # Errors
    ///
    /// - `ExchangeError::SessionNotEstablished` / `DecryptionFailed` from opening
    /// - `ExchangeError::InvalidPayload` if the body is not a credential request
    /// - `ExchangeError::DeviceNotFound` if enrollment or credentials are missing
    /// - `ExchangeError::TotpMismatch` if the code does not match
    pub async fn exchange_credentials(&self, envelope: &Envelope) -> Result<Envelope> {
        let request: CredentialRequest = self.sessions.open_json(envelope)?;
        let device_id = request.device_id.as_str();
        let now = self.sessions.clock().now();

        if !self.verify_totp(device_id, request.code, now).await? {
            tracing::warn!(
                client_id = %envelope.client_id,
                device_id,
                "credential request with invalid one-time code"
            );
            return Err(ExchangeError::TotpMismatch);
        }

        let credentials = self
            .credentials
            .fetch_credentials(device_id)
            .await
            .ok_or_else(|| ExchangeError::DeviceNotFound(device_id.to_string()))?;

        tracing::info!(client_id = %envelope.client_id, device_id, "credentials released");
        self.sessions.seal_json(&envelope.client_id, &credentials)
    }
}
