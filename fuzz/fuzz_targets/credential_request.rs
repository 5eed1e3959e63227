//! Fuzz target for credential request parsing
//!
//! Tests that arbitrary JSON bodies and envelope documents never panic when
//! deserialized.

#![no_main]

use libfuzzer_sys::fuzz_target;
use veil_core::{CredentialRequest, Envelope, KemCompleteRequest};
use veil_crypto::TotpCode;

fuzz_target!(|data: &[u8]| {
    let _: Result<CredentialRequest, _> = serde_json::from_slice(data);
    let _: Result<Envelope, _> = serde_json::from_slice(data);

    if let Ok(request) = serde_json::from_slice::<KemCompleteRequest>(data) {
        let _ = request.ciphertext();
    }

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(code) = s.parse::<TotpCode>() {
            assert_eq!(code.to_string(), s);
        }
    }
});
