//! RFC 8448 test vectors for the TLS 1.3 key schedule.
//!
//! Values come from RFC 8448 Section 3 ("Simple 1-RTT Handshake"),
//! pinning the HKDF chain, the handshake traffic secrets and the
//! record keys derived from them.

use ambertls_core::cipher::CipherSuite;
use ambertls_core::key_schedule::KeySchedule;
use ambertls_core::transcript::hkdf_expand_label;
use ambertls_crypto::{CryptoProvider, HashAlgorithm};
use ambertls_crypto_rustcrypto::RustCryptoProvider;

fn hex_decode(hex: &str) -> Vec<u8> {
    let clean: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    (0..clean.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).unwrap())
        .collect()
}

/// The x25519 shared secret of the RFC 8448 Section 3 handshake.
const SHARED_SECRET: &str = "8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d";

/// Transcript hash over ClientHello..ServerHello.
const HELLO_TRANSCRIPT_HASH: &str =
    "860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8";

const CLIENT_HS_TRAFFIC: &str = "b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21";
const SERVER_HS_TRAFFIC: &str = "b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38";

#[test]
fn early_secret_with_no_psk() {
    // Early Secret = HKDF-Extract(0^32, 0^32)
    let provider = RustCryptoProvider::new();
    let kdf = provider.kdf(HashAlgorithm::Sha256.to_kdf_algorithm()).unwrap();
    let early_secret = kdf.extract(&[0u8; 32], &[0u8; 32]);
    assert_eq!(
        early_secret,
        hex_decode("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
    );
}

#[test]
fn handshake_secret_from_shared_secret() {
    let provider = RustCryptoProvider::new();
    let kdf = provider.kdf(HashAlgorithm::Sha256.to_kdf_algorithm()).unwrap();

    let early_secret = kdf.extract(&[0u8; 32], &[0u8; 32]);

    // derived = HKDF-Expand-Label(early_secret, "derived", Hash(""), 32)
    let empty_hash = {
        let hasher = provider.hash(HashAlgorithm::Sha256).unwrap();
        hasher.finalize()
    };
    let derived = hkdf_expand_label(
        &provider,
        HashAlgorithm::Sha256,
        &early_secret,
        b"derived",
        &empty_hash,
        32,
    )
    .unwrap();
    assert_eq!(
        derived,
        hex_decode("6f2615a108c702c5678f54fc9dbab69716c076189c48250cebeac3576c3611ba")
    );

    let handshake_secret = kdf.extract(&derived, &hex_decode(SHARED_SECRET));
    assert_eq!(
        handshake_secret,
        hex_decode("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac")
    );
}

#[test]
fn handshake_traffic_secrets_through_key_schedule() {
    let provider = RustCryptoProvider::new();

    let mut schedule = KeySchedule::new(CipherSuite::Aes128GcmSha256);
    schedule.init_early_secret(&provider, None).unwrap();
    schedule
        .derive_handshake_secret(&provider, Some(&hex_decode(SHARED_SECRET)))
        .unwrap();

    let (client, server) = schedule
        .derive_handshake_traffic_secrets(&provider, &hex_decode(HELLO_TRANSCRIPT_HASH))
        .unwrap();

    assert_eq!(client, hex_decode(CLIENT_HS_TRAFFIC));
    assert_eq!(server, hex_decode(SERVER_HS_TRAFFIC));
    assert_eq!(
        schedule.client_handshake_traffic_secret().unwrap(),
        hex_decode(CLIENT_HS_TRAFFIC).as_slice()
    );
}

#[test]
fn handshake_traffic_secrets_by_direct_expansion() {
    let provider = RustCryptoProvider::new();
    let handshake_secret =
        hex_decode("1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac");
    let transcript_hash = hex_decode(HELLO_TRANSCRIPT_HASH);

    let client = hkdf_expand_label(
        &provider,
        HashAlgorithm::Sha256,
        &handshake_secret,
        b"c hs traffic",
        &transcript_hash,
        32,
    )
    .unwrap();
    assert_eq!(client, hex_decode(CLIENT_HS_TRAFFIC));

    let server = hkdf_expand_label(
        &provider,
        HashAlgorithm::Sha256,
        &handshake_secret,
        b"s hs traffic",
        &transcript_hash,
        32,
    )
    .unwrap();
    assert_eq!(server, hex_decode(SERVER_HS_TRAFFIC));
}

#[test]
fn server_handshake_record_keys() {
    // key = HKDF-Expand-Label(secret, "key", "", 16)
    // iv  = HKDF-Expand-Label(secret, "iv", "", 12)
    let provider = RustCryptoProvider::new();
    let secret = hex_decode(SERVER_HS_TRAFFIC);

    let key =
        hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"key", &[], 16).unwrap();
    assert_eq!(key, hex_decode("3fce516009c21727d0f2e4e86ee403bc"));

    let iv = hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"iv", &[], 12).unwrap();
    assert_eq!(iv, hex_decode("5d313eb2671276ee13000b30"));
}

#[test]
fn record_keys_via_key_schedule_helper() {
    let provider = RustCryptoProvider::new();
    let (key, iv) = ambertls_core::key_schedule::derive_traffic_keys(
        &provider,
        CipherSuite::Aes128GcmSha256,
        &hex_decode(SERVER_HS_TRAFFIC),
    )
    .unwrap();
    assert_eq!(key.as_slice(), hex_decode("3fce516009c21727d0f2e4e86ee403bc").as_slice());
    assert_eq!(iv.as_slice(), hex_decode("5d313eb2671276ee13000b30").as_slice());
}
