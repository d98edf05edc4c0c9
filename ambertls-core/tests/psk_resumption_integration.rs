//! Session resumption: ticket minting, PSK offers, binder
//! verification and fallback to the full handshake.

use ambertls_core::cipher::CipherSuite;
use ambertls_core::handshake::{
    ClientHandshake, ClientHandshakeParams, ClientHelloOutcome, ServerHandshake,
    ServerHandshakeParams, ServerHelloOutcome,
};
use ambertls_core::psk::{PskKeyExchangeMode, StoredTicket};
use ambertls_core::ticket_encryption::TicketEncryptor;
use ambertls_core::verifier::CertificateVerifier;
use ambertls_core::{Error, Result};
use ambertls_crypto::{CryptoProvider, SignatureScheme};
use ambertls_crypto_rustcrypto::RustCryptoProvider;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::{Arc, Mutex};

const NOW: u64 = 1_750_000_000;

const TEST_SCALAR: [u8; 32] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
    0x1F, 0x20,
];

struct TestVerifier {
    provider: Arc<RustCryptoProvider>,
    public_key: Vec<u8>,
}

impl CertificateVerifier for TestVerifier {
    fn verify_chain(&self, chain: &[Vec<u8>], _server_name: Option<&str>, _now: u64) -> Result<()> {
        if chain.is_empty() {
            Err(Error::BadCertificate("empty chain".to_string()))
        } else {
            Ok(())
        }
    }

    fn verify_signature(
        &self,
        _end_entity: &[u8],
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let verifier = self.provider.signature(scheme)?;
        verifier
            .verify(&self.public_key, message, signature)
            .map_err(|_| Error::BadCertificate("bad CertificateVerify".to_string()))
    }
}

fn verifier(provider: &Arc<RustCryptoProvider>) -> Arc<TestVerifier> {
    let secret = p256::SecretKey::from_slice(&TEST_SCALAR).unwrap();
    Arc::new(TestVerifier {
        provider: Arc::clone(provider),
        public_key: secret.public_key().to_encoded_point(false).as_bytes().to_vec(),
    })
}

fn server_params(encryptor: &Arc<Mutex<TicketEncryptor>>) -> ServerHandshakeParams {
    let mut params = ServerHandshakeParams::new(
        vec![b"resumption test certificate".to_vec()],
        SignatureScheme::EcdsaSecp256r1Sha256,
        TEST_SCALAR.to_vec(),
    );
    params.accept_resumption = true;
    params.ticket_encryptor = Some(Arc::clone(encryptor));
    params
}

/// Run a handshake to completion; panics on any step failing.
fn run_handshake(
    provider: &RustCryptoProvider,
    client: &mut ClientHandshake,
    server: &mut ServerHandshake,
) {
    let hello = client.client_hello(provider, NOW).unwrap();
    match server.process_client_hello(provider, &hello, NOW).unwrap() {
        ClientHelloOutcome::Proceed => {}
        ClientHelloOutcome::HelloRetry(_) => panic!("unexpected retry"),
    }
    let server_hello = server.server_hello(provider).unwrap();
    match client.process_server_hello(provider, &server_hello, NOW).unwrap() {
        ServerHelloOutcome::Proceed => {}
        ServerHelloOutcome::SendSecondHello(_) => panic!("unexpected retry"),
    }
    let ee = server.encrypted_extensions().unwrap();
    client.process_encrypted_extensions(&ee).unwrap();
    if let Some(certificate) = server.certificate().unwrap() {
        client.process_certificate(&certificate, NOW).unwrap();
    }
    if let Some(verify) = server.certificate_verify(provider).unwrap() {
        client.process_certificate_verify(provider, &verify).unwrap();
    }
    let finished = server.finished(provider).unwrap();
    let flight = client.process_server_finished(provider, &finished).unwrap();
    if let Some(eoed) = &flight.end_of_early_data {
        server.process_end_of_early_data(eoed).unwrap();
    }
    server.process_client_finished(provider, &flight.finished).unwrap();
}

/// Complete an initial handshake and carry a minted ticket home.
fn obtain_ticket(
    provider: &Arc<RustCryptoProvider>,
    encryptor: &Arc<Mutex<TicketEncryptor>>,
) -> StoredTicket {
    let mut client = ClientHandshake::new(ClientHandshakeParams::new(verifier(provider)));
    let mut server = ServerHandshake::new(server_params(encryptor));
    run_handshake(provider, &mut client, &mut server);

    let nst = server.new_session_ticket(provider.as_ref(), NOW).unwrap();
    client.process_new_session_ticket(provider.as_ref(), &nst, NOW).unwrap()
}

#[test]
fn resumption_skips_certificates() {
    let provider = Arc::new(RustCryptoProvider::new());
    let encryptor = Arc::new(Mutex::new(TicketEncryptor::new()));
    let ticket = obtain_ticket(&provider, &encryptor);

    let mut params = ClientHandshakeParams::new(verifier(&provider));
    params.ticket = Some(ticket);
    let mut client = ClientHandshake::new(params);
    let mut server = ServerHandshake::new(server_params(&encryptor));

    let hello = client.client_hello(provider.as_ref(), NOW + 60).unwrap();
    server.process_client_hello(provider.as_ref(), &hello, NOW + 60).unwrap();
    assert!(server.resumed());

    let server_hello = server.server_hello(provider.as_ref()).unwrap();
    client.process_server_hello(provider.as_ref(), &server_hello, NOW + 60).unwrap();
    let ee = server.encrypted_extensions().unwrap();
    client.process_encrypted_extensions(&ee).unwrap();

    // Resumption: no Certificate, no CertificateVerify.
    assert!(server.certificate().unwrap().is_none());
    assert!(server.certificate_verify(provider.as_ref()).unwrap().is_none());

    let finished = server.finished(provider.as_ref()).unwrap();
    let flight = client.process_server_finished(provider.as_ref(), &finished).unwrap();
    server.process_client_finished(provider.as_ref(), &flight.finished).unwrap();

    assert!(client.is_connected());
    assert!(server.is_connected());
    assert_eq!(
        client
            .key_schedule()
            .unwrap()
            .client_application_traffic_secret()
            .unwrap(),
        server
            .key_schedule()
            .unwrap()
            .client_application_traffic_secret()
            .unwrap()
    );
}

#[test]
fn psk_only_mode_runs_without_key_exchange() {
    let provider = Arc::new(RustCryptoProvider::new());
    let encryptor = Arc::new(Mutex::new(TicketEncryptor::new()));
    let ticket = obtain_ticket(&provider, &encryptor);

    let mut params = ClientHandshakeParams::new(verifier(&provider));
    params.ticket = Some(ticket);
    params.psk_modes = vec![PskKeyExchangeMode::PskKe];
    let mut client = ClientHandshake::new(params);
    let mut server = ServerHandshake::new(server_params(&encryptor));

    run_handshake(&provider, &mut client, &mut server);
    assert!(server.resumed());
    assert!(client.is_connected());
}

#[test]
fn unopenable_ticket_falls_back_to_full_handshake() {
    let provider = Arc::new(RustCryptoProvider::new());
    let encryptor = Arc::new(Mutex::new(TicketEncryptor::new()));
    let mut ticket = obtain_ticket(&provider, &encryptor);

    // A ticket sealed under an unknown key cannot be opened; the server
    // ignores the offer rather than failing.
    let last = ticket.ticket.len() - 1;
    ticket.ticket[last] ^= 0xFF;

    let mut params = ClientHandshakeParams::new(verifier(&provider));
    params.ticket = Some(ticket);
    let mut client = ClientHandshake::new(params);
    let mut server = ServerHandshake::new(server_params(&encryptor));

    run_handshake(&provider, &mut client, &mut server);
    assert!(!server.resumed());
    assert!(client.is_connected());
    assert!(server.is_connected());
}

#[test]
fn tampered_binder_is_fatal() {
    let provider = Arc::new(RustCryptoProvider::new());
    let encryptor = Arc::new(Mutex::new(TicketEncryptor::new()));
    let ticket = obtain_ticket(&provider, &encryptor);

    let hash_len = ticket.cipher_suite.hash_len();
    let mut params = ClientHandshakeParams::new(verifier(&provider));
    params.ticket = Some(ticket);
    let mut client = ClientHandshake::new(params);
    let mut server = ServerHandshake::new(server_params(&encryptor));

    let mut hello = client.client_hello(provider.as_ref(), NOW).unwrap();
    // The binder is the trailing Hash.length bytes of the hello.
    let start = hello.len() - hash_len;
    hello[start] ^= 0x01;

    let result = server.process_client_hello(provider.as_ref(), &hello, NOW);
    assert!(matches!(result, Err(Error::HandshakeFailure(_))));
}

#[test]
fn expired_ticket_is_not_offered() {
    let provider = Arc::new(RustCryptoProvider::new());
    let encryptor = Arc::new(Mutex::new(TicketEncryptor::new()));
    let ticket = obtain_ticket(&provider, &encryptor);
    let lifetime = ticket.lifetime as u64;

    let mut params = ClientHandshakeParams::new(verifier(&provider));
    params.ticket = Some(ticket);
    let mut client = ClientHandshake::new(params);
    let mut server = ServerHandshake::new(server_params(&encryptor));

    // Long past the lifetime, the client quietly drops the ticket and
    // runs a full handshake.
    let later = NOW + lifetime + 10;
    let hello = client.client_hello(provider.as_ref(), later).unwrap();
    server.process_client_hello(provider.as_ref(), &hello, later).unwrap();
    assert!(!server.resumed());
}

#[test]
fn ticket_psk_derivation_is_consistent() {
    let provider = Arc::new(RustCryptoProvider::new());
    let encryptor = Arc::new(Mutex::new(TicketEncryptor::new()));

    let mut client = ClientHandshake::new(ClientHandshakeParams::new(verifier(&provider)));
    let mut server = ServerHandshake::new(server_params(&encryptor));
    run_handshake(&provider, &mut client, &mut server);

    // Two tickets from one connection carry distinct nonces, so their
    // PSKs differ even though the resumption secret is shared.
    let first = server.new_session_ticket(provider.as_ref(), NOW).unwrap();
    let second = server.new_session_ticket(provider.as_ref(), NOW).unwrap();
    let first = client.process_new_session_ticket(provider.as_ref(), &first, NOW).unwrap();
    let second = client.process_new_session_ticket(provider.as_ref(), &second, NOW).unwrap();

    assert_ne!(first.psk.as_slice(), second.psk.as_slice());
    assert_ne!(first.ticket, second.ticket);
    assert_eq!(first.cipher_suite, CipherSuite::Aes128GcmSha256);
}
