//! Fuzz target for envelope decryption
//!
//! Arbitrary nonce and ciphertext fields, raw or base64-encoded, must be
//! rejected without panicking.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use veil_crypto::{AeadAlgorithm, AeadKey, Envelope, EnvelopeCodec};

#[derive(Debug, Arbitrary)]
struct EnvelopeInput {
    key: [u8; 32],
    chacha: bool,
    nonce: String,
    ciphertext: String,
    plaintext: Vec<u8>,
}

fuzz_target!(|input: EnvelopeInput| {
    let algorithm = if input.chacha {
        AeadAlgorithm::ChaCha20Poly1305
    } else {
        AeadAlgorithm::Aes256Gcm
    };
    let codec = EnvelopeCodec::new(algorithm);
    let key = AeadKey::new(input.key);

    // Arbitrary fields should never decrypt and never panic
    let envelope = Envelope {
        client_id: "fuzz".into(),
        nonce: input.nonce,
        ciphertext: input.ciphertext,
    };
    let _ = codec.decrypt(&envelope, &key);

    // A genuine envelope must round trip
    if let Ok(sealed) = codec.encrypt("fuzz", &input.plaintext, &key) {
        let opened = codec.decrypt(&sealed, &key).expect("own envelope opens");
        assert_eq!(&opened[..], &input.plaintext[..]);
    }
});
