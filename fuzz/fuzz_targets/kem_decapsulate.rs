//! Fuzz target for ML-KEM decapsulation
//!
//! Arbitrary ciphertexts must either be rejected for their length or
//! decapsulate to some secret, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use veil_crypto::{KemKeyPair, KemParameterSet};

static KEYPAIR: OnceLock<KemKeyPair> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let keypair = KEYPAIR.get_or_init(|| KemKeyPair::generate(KemParameterSet::MlKem512));

    let result = keypair.decapsulate(data);
    assert_eq!(
        result.is_ok(),
        data.len() == KemParameterSet::MlKem512.ciphertext_size()
    );
});
