//! KeyUpdate: traffic secret rotation and its effect on the record
//! layer (RFC 8446 Section 4.6.3).

use ambertls_core::cipher::CipherSuite;
use ambertls_core::key_schedule::KeySchedule;
use ambertls_core::messages::{KeyUpdate, KeyUpdateRequest};
use ambertls_core::protocol::ContentType;
use ambertls_core::record_protection::RecordProtection;
use ambertls_core::Error;
use ambertls_crypto_rustcrypto::RustCryptoProvider;

fn secret(byte: u8, suite: CipherSuite) -> Vec<u8> {
    vec![byte; suite.hash_len()]
}

#[test]
fn rotation_is_deterministic_and_directional() {
    let provider = RustCryptoProvider::new();
    let schedule = KeySchedule::new(CipherSuite::Aes128GcmSha256);

    let client_app = secret(0x11, CipherSuite::Aes128GcmSha256);
    let server_app = secret(0x22, CipherSuite::Aes128GcmSha256);

    let client_next = schedule.next_traffic_secret(&provider, &client_app).unwrap();
    let server_next = schedule.next_traffic_secret(&provider, &server_app).unwrap();

    // Each direction rotates independently.
    assert_ne!(client_next, client_app);
    assert_ne!(server_next, server_app);
    assert_ne!(client_next, server_next);

    // Both peers compute the same next generation.
    assert_eq!(
        client_next,
        schedule.next_traffic_secret(&provider, &client_app).unwrap()
    );
}

#[test]
fn records_flow_across_a_key_update() {
    let provider = RustCryptoProvider::new();
    let suite = CipherSuite::Aes128GcmSha256;
    let schedule = KeySchedule::new(suite);
    let app_secret = secret(0x33, suite);

    let mut sender = RecordProtection::new(&provider, suite, &app_secret).unwrap();
    let mut receiver = RecordProtection::new(&provider, suite, &app_secret).unwrap();

    // N application records before the update.
    for i in 0..5u8 {
        let ciphertext = sender
            .encrypt(&provider, ContentType::ApplicationData, &[i; 16])
            .unwrap();
        let plaintext = receiver.decrypt(&provider, &ciphertext).unwrap();
        assert_eq!(plaintext.fragment, vec![i; 16]);
    }
    assert_eq!(sender.sequence_number(), 5);

    // Rotate both ends the way the KeyUpdate flow does.
    let next = schedule.next_traffic_secret(&provider, sender.traffic_secret()).unwrap();
    sender.update_traffic_secret(&provider, &next).unwrap();
    receiver.update_traffic_secret(&provider, &next).unwrap();

    // Sequence numbers reset and traffic continues.
    assert_eq!(sender.sequence_number(), 0);
    let ciphertext = sender
        .encrypt(&provider, ContentType::ApplicationData, b"post-rotation")
        .unwrap();
    let plaintext = receiver.decrypt(&provider, &ciphertext).unwrap();
    assert_eq!(plaintext.fragment, b"post-rotation");
}

#[test]
fn pre_rotation_records_fail_under_new_keys() {
    let provider = RustCryptoProvider::new();
    let suite = CipherSuite::Aes128GcmSha256;
    let schedule = KeySchedule::new(suite);
    let app_secret = secret(0x44, suite);

    let mut sender = RecordProtection::new(&provider, suite, &app_secret).unwrap();
    let mut receiver = RecordProtection::new(&provider, suite, &app_secret).unwrap();

    let stale = sender
        .encrypt(&provider, ContentType::ApplicationData, b"stale")
        .unwrap();

    let next = schedule.next_traffic_secret(&provider, receiver.traffic_secret()).unwrap();
    receiver.update_traffic_secret(&provider, &next).unwrap();

    assert_eq!(receiver.decrypt(&provider, &stale), Err(Error::BadRecordMac));
}

#[test]
fn key_update_message_forms() {
    let requested = KeyUpdate::new(KeyUpdateRequest::UpdateRequested);
    assert_eq!(requested.encode().unwrap(), vec![1]);
    let not_requested = KeyUpdate::new(KeyUpdateRequest::UpdateNotRequested);
    assert_eq!(not_requested.encode().unwrap(), vec![0]);

    assert_eq!(
        KeyUpdate::decode(&[1]).unwrap().request_update,
        KeyUpdateRequest::UpdateRequested
    );
    assert!(KeyUpdate::decode(&[7]).is_err());
}

#[test]
fn chained_rotations_never_repeat_secrets() {
    let provider = RustCryptoProvider::new();
    let schedule = KeySchedule::new(CipherSuite::Aes256GcmSha384);

    let mut current = secret(0x55, CipherSuite::Aes256GcmSha384);
    let mut seen = vec![current.clone()];
    for _ in 0..16 {
        current = schedule.next_traffic_secret(&provider, &current).unwrap();
        assert!(!seen.contains(&current));
        seen.push(current.clone());
    }
}
