//! End-to-end scenarios across veil-crypto and veil-core
//!
//! Each test drives the server through the same DTOs a web layer would use
//! and plays the device side with `HandshakeClient`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use veil_core::{
    DeviceCredentials, ErrorBody, ExchangeConfig, ExchangeError, KemCompleteRequest, Replaced,
    SessionState,
};
use veil_crypto::{AeadAlgorithm, KemParameterSet, totp};
use veil_integration_tests::{Harness, t0};

#[test]
fn test_end_to_end_session() {
    let harness = Harness::new();
    let mut client = harness.client("camera-7");

    let offer = harness.sessions.handle_initiate(&client.initiate_request());
    assert_eq!(offer.public_key().unwrap().len(), 800);

    let complete = client.complete_request(&offer).unwrap();
    assert_eq!(complete.ciphertext().unwrap().len(), 768);
    harness.sessions.handle_complete(&complete).unwrap();

    let request = client.seal_request(&json!({"action": "status"})).unwrap();
    let body: serde_json::Value = harness.sessions.open_json(&request).unwrap();
    assert_eq!(body["action"], "status");

    let reply = harness
        .sessions
        .seal_json("camera-7", &json!({"status": "recording"}))
        .unwrap();
    let body: serde_json::Value = client.open_response(&reply).unwrap();
    assert_eq!(body["status"], "recording");

    // An unrelated id was never established
    assert_eq!(
        harness.sessions.seal("camera-8", b"x"),
        Err(ExchangeError::SessionNotEstablished("camera-8".into()))
    );
}

#[test]
fn test_larger_parameter_set_with_chacha() {
    let mut config = ExchangeConfig::default();
    config.session.kem = KemParameterSet::MlKem1024;
    config.session.aead = AeadAlgorithm::ChaCha20Poly1305;
    let harness = Harness::with_config(config);

    let client = harness.establish("gateway");
    let envelope = client.seal(b"hello").unwrap();
    assert_eq!(&harness.sessions.open(&envelope).unwrap()[..], b"hello");
}

#[tokio::test]
async fn test_credential_exchange_window() {
    let harness = Harness::new();
    let secret = harness.enroll("doorbell", t0(), "admin", "correct horse");
    let client = harness.establish("doorbell-client");

    harness.set_elapsed(45);
    let code = totp::derive_code(&secret, t0(), harness.now()).unwrap();
    let request = client
        .seal_request(&json!({"device_id": "doorbell", "code": code}))
        .unwrap();

    let response = harness.exchange.exchange_credentials(&request).await.unwrap();
    let creds: DeviceCredentials = client.open_response(&response).unwrap();
    assert_eq!(creds, DeviceCredentials::new("admin", "correct horse"));

    harness.set_elapsed(75);
    let again = client
        .seal_request(&json!({"device_id": "doorbell", "code": code}))
        .unwrap();
    let err = harness
        .exchange
        .exchange_credentials(&again)
        .await
        .unwrap_err();
    assert_eq!(err, ExchangeError::TotpMismatch);

    let body = ErrorBody::from(&err);
    assert_eq!(body.status_code, 401);
    assert!(!body.detail.contains(&code.to_string()));
}

#[tokio::test]
async fn test_credential_exchange_unknown_device() {
    let harness = Harness::new();
    let client = harness.establish("c");

    let request = client
        .seal_request(&json!({"device_id": "ghost", "code": 123456}))
        .unwrap();
    assert_eq!(
        harness.exchange.exchange_credentials(&request).await,
        Err(ExchangeError::DeviceNotFound("ghost".into()))
    );
}

#[tokio::test]
async fn test_credential_exchange_after_rotation() {
    let harness = Harness::new();
    let old = harness.enroll("sensor", t0(), "u", "p");
    let client = harness.establish("c");

    harness.set_elapsed(100);
    let new = harness
        .registry
        .rotate_secret("sensor", harness.now())
        .unwrap()
        .unwrap();

    let stale = totp::derive_code(&old, t0(), harness.now()).unwrap();
    let fresh = totp::derive_code(&new, harness.now(), harness.now()).unwrap();

    if stale != fresh {
        let request = client
            .seal_request(&json!({"device_id": "sensor", "code": stale}))
            .unwrap();
        assert_eq!(
            harness.exchange.exchange_credentials(&request).await,
            Err(ExchangeError::TotpMismatch)
        );
    }

    let request = client
        .seal_request(&json!({"device_id": "sensor", "code": fresh}))
        .unwrap();
    assert!(harness.exchange.exchange_credentials(&request).await.is_ok());
}

#[test]
fn test_complete_without_initiate() {
    let harness = Harness::new();
    let request = KemCompleteRequest::new("nobody", &[0u8; 768]);
    let err = harness.sessions.handle_complete(&request).unwrap_err();
    assert_eq!(err, ExchangeError::UnknownSession("nobody".into()));
    assert_eq!(err.status_code(), 409);
}

#[test]
fn test_wrong_length_ciphertext_drops_pending() {
    let harness = Harness::new();
    harness.sessions.initiate_handshake("c");

    let err = harness
        .sessions
        .handle_complete(&KemCompleteRequest::new("c", &[1u8; 767]))
        .unwrap_err();
    assert!(matches!(err, ExchangeError::HandshakeFailed(_)));
    assert!(harness.sessions.session_state("c").is_none());
}

#[test]
fn test_concurrent_completes_single_winner() {
    let harness = Harness::new();
    let mut client = harness.client("racer");
    let offer = harness.sessions.handle_initiate(&client.initiate_request());
    let complete = Arc::new(client.complete_request(&offer).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let sessions = Arc::clone(&harness.sessions);
            let complete = Arc::clone(&complete);
            std::thread::spawn(move || sessions.handle_complete(&complete))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(ExchangeError::UnknownSession(_))));
    }

    // Winner's key is the client's key
    let envelope = client.seal(b"after race").unwrap();
    assert_eq!(
        &harness.sessions.open(&envelope).unwrap()[..],
        b"after race"
    );
}

#[tokio::test]
async fn test_concurrent_clients_on_runtime() {
    let harness = Arc::new(Harness::new());

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let harness = Arc::clone(&harness);
        tasks.spawn(async move {
            let client = harness.establish(&format!("client-{i}"));
            let envelope = client.seal(format!("msg-{i}").as_bytes()).unwrap();
            let plaintext = harness.sessions.open(&envelope).unwrap();
            assert_eq!(&plaintext[..], format!("msg-{i}").as_bytes());
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    assert_eq!(harness.sessions.store().established_count(), 16);
}

#[test]
fn test_reinitiate_invalidates_established() {
    let harness = Harness::new();
    let old_client = harness.establish("c");
    let old_envelope = old_client.seal(b"old").unwrap();

    let mut new_client = harness.client("c");
    let initiated = harness.sessions.initiate_handshake("c");
    assert_eq!(initiated.replaced, Replaced::Established);
    assert_eq!(
        harness.sessions.open(&old_envelope),
        Err(ExchangeError::SessionNotEstablished("c".into()))
    );

    let offer = veil_core::KemInitiateResponse::from_public_key(&initiated.public_key);
    harness
        .sessions
        .handle_complete(&new_client.complete_request(&offer).unwrap())
        .unwrap();

    assert_eq!(
        harness.sessions.open(&old_envelope),
        Err(ExchangeError::DecryptionFailed)
    );
    let envelope = new_client.seal(b"new").unwrap();
    assert_eq!(&harness.sessions.open(&envelope).unwrap()[..], b"new");
}

#[test]
fn test_pending_expiry() {
    let harness = Harness::new();
    let mut client = harness.client("slow");
    let offer = harness.sessions.handle_initiate(&client.initiate_request());
    let complete = client.complete_request(&offer).unwrap();

    harness.clock.advance(Duration::from_secs(121));
    assert!(harness.sessions.session_state("slow").is_none());
    assert_eq!(
        harness.sessions.handle_complete(&complete),
        Err(ExchangeError::UnknownSession("slow".into()))
    );
}

#[test]
fn test_purge_keeps_established() {
    let harness = Harness::new();
    harness.establish("kept");
    for i in 0..5 {
        harness.sessions.initiate_handshake(&format!("abandoned-{i}"));
    }

    harness.clock.advance(Duration::from_secs(3600));
    assert_eq!(harness.sessions.purge_expired(), 5);
    assert!(matches!(
        harness.sessions.session_state("kept"),
        Some(SessionState::Established { .. })
    ));
}

#[test]
fn test_initiate_flood_is_swept_without_purge() {
    let harness = Harness::new();
    for i in 0..200 {
        harness.sessions.initiate_handshake(&format!("one-off-{i}"));
    }
    let kept = harness.establish("kept");
    assert_eq!(harness.sessions.store().pending_count(), 200);

    harness.clock.advance(Duration::from_secs(3600));
    let late = harness.establish("late");

    let store = harness.sessions.store();
    assert_eq!(store.pending_count(), 0);
    assert_eq!(store.len(), 2);

    harness.sessions.initiate_handshake("one-more");
    assert_eq!(store.pending_count(), 1);

    for client in [&kept, &late] {
        let envelope = client.seal(b"still here").unwrap();
        assert_eq!(&harness.sessions.open(&envelope).unwrap()[..], b"still here");
    }
}

#[test]
fn test_invalidate_then_rehandshake() {
    let harness = Harness::new();
    harness.establish("c");
    assert!(harness.sessions.invalidate("c"));

    let err = harness.sessions.seal("c", b"x").unwrap_err();
    assert!(err.requires_rehandshake());

    let client = harness.establish("c");
    let envelope = client.seal(b"back").unwrap();
    assert_eq!(&harness.sessions.open(&envelope).unwrap()[..], b"back");
}
