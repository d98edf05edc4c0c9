//! HelloRetryRequest: group renegotiation, transcript rewrite and
//! cookie echo.

use ambertls_core::cipher::CipherSuite;
use ambertls_core::handshake::{
    ClientHandshake, ClientHandshakeParams, ClientHelloOutcome, ServerHandshake,
    ServerHandshakeParams, ServerHelloOutcome,
};
use ambertls_core::verifier::CertificateVerifier;
use ambertls_core::{Error, Result};
use ambertls_crypto::{CryptoProvider, KeyExchangeAlgorithm, SignatureScheme};
use ambertls_crypto_rustcrypto::RustCryptoProvider;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::Arc;

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

fn endpoints(
    provider: &Arc<RustCryptoProvider>,
    send_cookie: bool,
) -> (ClientHandshake, ServerHandshake) {
    let secret = p256::SecretKey::from_slice(&TEST_SCALAR).unwrap();
    let public_key = secret.public_key().to_encoded_point(false).as_bytes().to_vec();

    let verifier = Arc::new(TestVerifier {
        provider: Arc::clone(provider),
        public_key,
    });
    let mut client_params = ClientHandshakeParams::new(verifier);
    // The client advertises both groups but only shares x25519; a
    // server that insists on P-256 has to retry.
    client_params.groups = vec![KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1];
    client_params.key_share_groups = Some(vec![KeyExchangeAlgorithm::X25519]);

    let mut server_params = ServerHandshakeParams::new(
        vec![b"retry test certificate".to_vec()],
        SignatureScheme::EcdsaSecp256r1Sha256,
        TEST_SCALAR.to_vec(),
    );
    server_params.groups = vec![KeyExchangeAlgorithm::Secp256r1];
    server_params.send_cookie_on_retry = send_cookie;

    (
        ClientHandshake::new(client_params),
        ServerHandshake::new(server_params),
    )
}

fn complete_after_retry(
    provider: &RustCryptoProvider,
    client: &mut ClientHandshake,
    server: &mut ServerHandshake,
) {
    let hello = client.client_hello(provider, NOW).unwrap();

    let retry = match server.process_client_hello(provider, &hello, NOW).unwrap() {
        ClientHelloOutcome::HelloRetry(retry) => retry,
        ClientHelloOutcome::Proceed => panic!("server should have requested a retry"),
    };

    let second = match client.process_server_hello(provider, &retry, NOW).unwrap() {
        ServerHelloOutcome::SendSecondHello(second) => second,
        ServerHelloOutcome::Proceed => panic!("client should resend after a retry"),
    };

    match server.process_client_hello(provider, &second, NOW).unwrap() {
        ClientHelloOutcome::Proceed => {}
        ClientHelloOutcome::HelloRetry(_) => panic!("second retry is not allowed"),
    }

    let server_hello = server.server_hello(provider).unwrap();
    client.process_server_hello(provider, &server_hello, NOW).unwrap();
    let ee = server.encrypted_extensions().unwrap();
    client.process_encrypted_extensions(&ee).unwrap();
    let certificate = server.certificate().unwrap().unwrap();
    client.process_certificate(&certificate, NOW).unwrap();
    let verify = server.certificate_verify(provider).unwrap().unwrap();
    client.process_certificate_verify(provider, &verify).unwrap();
    let finished = server.finished(provider).unwrap();
    let flight = client.process_server_finished(provider, &finished).unwrap();
    server.process_client_finished(provider, &flight.finished).unwrap();
}

#[test]
fn handshake_completes_after_group_retry() {
    let provider = Arc::new(RustCryptoProvider::new());
    let (mut client, mut server) = endpoints(&provider, false);

    complete_after_retry(&provider, &mut client, &mut server);

    assert!(client.is_connected());
    assert!(server.is_connected());

    // Both transcripts were rewritten identically: the Finished
    // exchange verified, and the derived secrets agree.
    assert_eq!(
        client
            .key_schedule()
            .unwrap()
            .server_application_traffic_secret()
            .unwrap(),
        server
            .key_schedule()
            .unwrap()
            .server_application_traffic_secret()
            .unwrap()
    );
}

#[test]
fn cookie_is_echoed_across_retry() {
    let provider = Arc::new(RustCryptoProvider::new());
    let (mut client, mut server) = endpoints(&provider, true);
    complete_after_retry(&provider, &mut client, &mut server);
    assert!(client.is_connected());
    assert!(server.is_connected());
}

#[test]
fn second_hello_retry_is_fatal() {
    let provider = Arc::new(RustCryptoProvider::new());
    let (mut client, mut server) = endpoints(&provider, false);

    let hello = client.client_hello(provider.as_ref(), NOW).unwrap();
    let retry = match server.process_client_hello(provider.as_ref(), &hello, NOW).unwrap() {
        ClientHelloOutcome::HelloRetry(retry) => retry,
        ClientHelloOutcome::Proceed => panic!("expected retry"),
    };

    client.process_server_hello(provider.as_ref(), &retry, NOW).unwrap();
    let result = client.process_server_hello(provider.as_ref(), &retry, NOW);
    assert!(matches!(result, Err(Error::UnexpectedMessage(_))));
}

#[test]
fn forged_retry_without_session_echo_is_fatal() {
    use ambertls_core::extension_types;
    use ambertls_core::extensions::Extensions;
    use ambertls_core::messages::{HandshakeMessage, ServerHello};
    use ambertls_core::protocol::HandshakeType;

    let provider = Arc::new(RustCryptoProvider::new());
    let (mut client, _) = endpoints(&provider, false);
    client.client_hello(provider.as_ref(), NOW).unwrap();

    // A handcrafted retry that fails to echo the client's session id is
    // rejected before its extensions matter.
    let mut extensions = Extensions::new();
    extensions.add(extension_types::supported_versions_server());
    extensions.add(extension_types::key_share_hello_retry(KeyExchangeAlgorithm::X25519));
    let retry = ServerHello::hello_retry_request(CipherSuite::Aes128GcmSha256)
        .with_extensions(extensions);
    let framed = HandshakeMessage::new(HandshakeType::ServerHello, retry.encode().unwrap())
        .encode()
        .unwrap();

    assert!(client.process_server_hello(provider.as_ref(), &framed, NOW).is_err());
}
