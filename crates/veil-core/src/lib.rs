//! # VEIL Core
//!
//! Session establishment and credential exchange for embedded devices.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │               CredentialExchange                   │
//! │   open request ─ verify TOTP ─ seal credentials    │
//! ├───────────────────────────┬────────────────────────┤
//! │      SessionManager       │  EnrollmentSource      │
//! │ initiate / complete       │  CredentialSource      │
//! │ seal / open               │  (MemoryRegistry)      │
//! ├───────────────────────────┴────────────────────────┤
//! │                  SessionStore                      │
//! │  client id → Pending(key pair) | Established(key)  │
//! ├────────────────────────────────────────────────────┤
//! │                  veil-crypto                       │
//! │        ML-KEM · AEAD envelope · TOTP               │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use veil_core::{ExchangeConfig, HandshakeClient, SessionManager};
//!
//! let config = ExchangeConfig::default();
//! let server = SessionManager::new(&config).unwrap();
//! let mut device = HandshakeClient::from_config("device-1", &config.session);
//!
//! let offer = server.handle_initiate(&device.initiate_request());
//! server.handle_complete(&device.complete_request(&offer).unwrap()).unwrap();
//!
//! let envelope = device.seal(b"hello").unwrap();
//! assert_eq!(&server.open(&envelope).unwrap()[..], b"hello");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod session_manager;
pub mod store;
pub mod wire;

pub use client::HandshakeClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExchangeConfig, SessionConfig};
pub use credentials::CredentialExchange;
pub use error::{ExchangeError, Result};
pub use registry::{
    CredentialSource, DeviceCredentials, EnrollmentRecord, EnrollmentSource, MemoryRegistry,
};
pub use session_manager::{Initiated, SessionManager};
pub use store::{Replaced, SessionState, SessionStore};
pub use wire::{
    CredentialRequest, Envelope, ErrorBody, KemCompleteRequest, KemInitiateRequest,
    KemInitiateResponse,
};
