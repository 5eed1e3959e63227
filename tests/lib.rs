//! Shared fixtures for VEIL integration tests
//!
//! [`Harness`] wires a session manager on a manual clock to an in-memory
//! registry, so scenarios can enroll devices, run handshakes and step time.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use veil_core::{
    Clock, CredentialExchange, DeviceCredentials, ExchangeConfig, HandshakeClient, ManualClock,
    MemoryRegistry, SessionManager,
};
use veil_crypto::EnrollmentSecret;

/// Fixed start time for every harness
pub const T0_UNIX_SECS: u64 = 1_700_000_000;

/// Start instant of every harness clock
pub fn t0() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(T0_UNIX_SECS)
}

/// Server-side stack on a manual clock
pub struct Harness {
    /// Test clock, starts at [`t0`]
    pub clock: Arc<ManualClock>,
    /// Session manager under test
    pub sessions: Arc<SessionManager>,
    /// Device data
    pub registry: Arc<MemoryRegistry>,
    /// Credential exchange over `sessions` and `registry`
    pub exchange: CredentialExchange<MemoryRegistry, MemoryRegistry>,
    config: ExchangeConfig,
}

impl Harness {
    /// Harness with the default configuration
    pub fn new() -> Self {
        Self::with_config(ExchangeConfig::default())
    }

    /// Harness with a custom configuration
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn with_config(config: ExchangeConfig) -> Self {
        let clock = Arc::new(ManualClock::new(t0()));
        let sessions = Arc::new(
            SessionManager::with_clock(&config, clock.clone()).expect("valid test config"),
        );
        let registry = Arc::new(MemoryRegistry::new());
        let exchange =
            CredentialExchange::new(sessions.clone(), registry.clone(), registry.clone());

        Self {
            clock,
            sessions,
            registry,
            exchange,
            config,
        }
    }

    /// Client speaking this harness's algorithms
    pub fn client(&self, client_id: &str) -> HandshakeClient {
        HandshakeClient::from_config(client_id, &self.config.session)
    }

    /// Run both handshake messages for a new client
    ///
    /// # Panics
    ///
    /// Panics if the handshake fails.
    pub fn establish(&self, client_id: &str) -> HandshakeClient {
        let mut client = self.client(client_id);
        let offer = self.sessions.handle_initiate(&client.initiate_request());
        let complete = client.complete_request(&offer).expect("valid public key");
        self.sessions
            .handle_complete(&complete)
            .expect("handshake completes");
        client
    }

    /// Enroll a device at `enrolled_at` with `username`/`password`
    ///
    /// # Panics
    ///
    /// Panics if the OS CSPRNG fails.
    pub fn enroll(
        &self,
        device_id: &str,
        enrolled_at: SystemTime,
        username: &str,
        password: &str,
    ) -> EnrollmentSecret {
        self.registry
            .register(
                device_id,
                enrolled_at,
                DeviceCredentials::new(username, password),
            )
            .expect("secret generation")
    }

    /// Current harness time
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Move the clock to `t0 + secs`
    pub fn set_elapsed(&self, secs: u64) {
        self.clock.set(t0() + Duration::from_secs(secs));
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
