//! Runtime configuration

use std::time::Duration;

use veil_crypto::{AeadAlgorithm, KemParameterSet};

use crate::error::{ExchangeError, Result};

/// Lower bound on the pending-handshake lifetime
pub const MIN_PENDING_TTL: Duration = Duration::from_secs(1);

/// Upper bound on the pending-handshake lifetime
pub const MAX_PENDING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Exchange configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Session establishment configuration
    pub session: SessionConfig,
}

impl ExchangeConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::InvalidConfig` if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()
    }
}

/// Session establishment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// ML-KEM parameter set for handshakes
    pub kem: KemParameterSet,

    /// AEAD algorithm for envelopes
    pub aead: AeadAlgorithm,

    /// Age after which an uncompleted handshake is evicted
    pub pending_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kem: KemParameterSet::MlKem512,
            aead: AeadAlgorithm::Aes256Gcm,
            pending_ttl: Duration::from_secs(120),
        }
    }
}

impl SessionConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ExchangeError::InvalidConfig` if `pending_ttl` is outside
    /// [`MIN_PENDING_TTL`]..=[`MAX_PENDING_TTL`].
    pub fn validate(&self) -> Result<()> {
        if self.pending_ttl < MIN_PENDING_TTL || self.pending_ttl > MAX_PENDING_TTL {
            return Err(ExchangeError::invalid_config(
                "pending_ttl must be between 1 second and 24 hours",
            ));
        }
        Ok(())
    }
}
