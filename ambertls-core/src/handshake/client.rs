//! TLS 1.3 client handshake state machine.
//!
//! ```text
//! START
//!   | send ClientHello (+ 0-RTT data under the early key)
//!   v
//! WAIT_SH ---- HelloRetryRequest ----> (rewrite transcript, resend) --+
//!   |  recv ServerHello                                               |
//!   |<-----------------------------------------------------------v---+
//!   v
//! WAIT_EE          recv EncryptedExtensions
//! WAIT_CERT_CR     recv Certificate / CertificateRequest   (skipped on PSK)
//! WAIT_CV          recv CertificateVerify                  (skipped on PSK)
//! WAIT_FINISHED    recv Finished
//!   | send [EndOfEarlyData] [Certificate] Finished
//!   v
//! CONNECTED        (NewSessionTicket / KeyUpdate loop)
//! ```
//!
//! The machine is transport-free: `process_*` methods take complete
//! framed handshake messages and hand back the framed messages to send;
//! record protection and I/O belong to the caller.

use crate::cipher::CipherSuite;
use crate::error::{Error, Result};
use crate::extension_types::{
    self, decode_alpn, decode_early_data, decode_key_share, decode_record_size_limit,
    decode_supported_versions, ExtensionContext, KeyShare, KeyShareEntry,
};
use crate::extensions::Extensions;
use crate::key_schedule::{BinderKind, KeySchedule};
use crate::keylog::{KeyLog, KeyLogLabel};
use crate::messages::{
    Certificate, CertificateRequest, CertificateVerify, ClientHello, EncryptedExtensions,
    EndOfEarlyData, Finished, HandshakeMessage, NewSessionTicket, ServerHello,
};
use crate::protocol::{ExtensionType, HandshakeType, ProtocolVersion};
use crate::psk::{compute_binder, PreSharedKeyOffer, PskIdentity, PskKeyExchangeMode, StoredTicket};
use crate::transcript::{compute_verify_data, verify_data_matches, TranscriptHash};
use crate::verifier::CertificateVerifier;
use ambertls_crypto::{
    CryptoProvider, KeyExchangeAlgorithm, PrivateKey, SignatureScheme,
};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Client handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Ready to send ClientHello
    Start,
    /// Waiting for ServerHello
    WaitServerHello,
    /// Waiting for EncryptedExtensions
    WaitEncryptedExtensions,
    /// Waiting for Certificate or CertificateRequest
    WaitCertCr,
    /// Waiting for CertificateVerify
    WaitCertVerify,
    /// Waiting for server Finished
    WaitFinished,
    /// Handshake complete
    Connected,
    /// Terminally failed
    Failed,
}

/// Outcome of processing a ServerHello.
#[derive(Debug)]
pub enum ServerHelloOutcome {
    /// A real ServerHello; continue with EncryptedExtensions.
    Proceed,
    /// A HelloRetryRequest; send the returned second ClientHello.
    SendSecondHello(Vec<u8>),
}

/// The client's second flight, produced by processing server Finished.
///
/// `end_of_early_data` is sent under the early traffic key; everything
/// else under the client handshake traffic key, in field order.
#[derive(Debug)]
pub struct ClientFlight {
    /// EndOfEarlyData, present when the server accepted 0-RTT
    pub end_of_early_data: Option<Vec<u8>>,

    /// Empty Certificate answering a CertificateRequest
    pub certificate: Option<Vec<u8>>,

    /// Client Finished
    pub finished: Vec<u8>,
}

/// Inputs for a client handshake.
pub struct ClientHandshakeParams {
    /// Cipher suites in preference order
    pub cipher_suites: Vec<CipherSuite>,

    /// Key exchange groups in preference order
    pub groups: Vec<KeyExchangeAlgorithm>,

    /// Groups to actually generate key shares for; `None` shares every
    /// offered group. Sharing fewer trades a possible
    /// HelloRetryRequest round for a smaller first flight.
    pub key_share_groups: Option<Vec<KeyExchangeAlgorithm>>,

    /// Acceptable signature schemes for the server certificate
    pub signature_schemes: Vec<SignatureScheme>,

    /// Server name for SNI and certificate validation
    pub server_name: Option<String>,

    /// ALPN protocols to offer, in preference order
    pub alpn_protocols: Vec<String>,

    /// record_size_limit to advertise
    pub record_size_limit: Option<u16>,

    /// PSK modes to offer alongside a ticket
    pub psk_modes: Vec<PskKeyExchangeMode>,

    /// Ticket to resume with
    pub ticket: Option<StoredTicket>,

    /// Offer 0-RTT under the ticket
    pub offer_early_data: bool,

    /// Certificate verifier
    pub verifier: Arc<dyn CertificateVerifier>,

    /// Key-log hook
    pub key_log: Option<Arc<dyn KeyLog>>,
}

impl std::fmt::Debug for ClientHandshakeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandshakeParams")
            .field("cipher_suites", &self.cipher_suites)
            .field("groups", &self.groups)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl ClientHandshakeParams {
    /// Defaults: all three suites, both groups, all three signature
    /// schemes, both PSK modes, no ticket.
    pub fn new(verifier: Arc<dyn CertificateVerifier>) -> Self {
        Self {
            cipher_suites: crate::cipher::DEFAULT_CIPHER_SUITES.to_vec(),
            groups: vec![KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1],
            key_share_groups: None,
            signature_schemes: vec![
                SignatureScheme::EcdsaSecp256r1Sha256,
                SignatureScheme::EcdsaSecp384r1Sha384,
                SignatureScheme::RsaPssRsaeSha256,
            ],
            server_name: None,
            alpn_protocols: Vec::new(),
            record_size_limit: None,
            psk_modes: vec![PskKeyExchangeMode::PskDheKe, PskKeyExchangeMode::PskKe],
            ticket: None,
            offer_early_data: false,
            verifier,
            key_log: None,
        }
    }
}

/// Client-side handshake driver.
pub struct ClientHandshake {
    params: ClientHandshakeParams,
    state: ClientState,

    client_random: [u8; 32],
    session_id: Vec<u8>,

    /// One ephemeral share per offered group
    shares: Vec<(KeyExchangeAlgorithm, PrivateKey, Vec<u8>)>,

    /// First ClientHello, retained until the HRR disposition is known
    first_hello: Option<Vec<u8>>,

    transcript: Option<TranscriptHash>,
    key_schedule: Option<KeySchedule>,
    cipher_suite: Option<CipherSuite>,

    hello_retry_suite: Option<CipherSuite>,
    retry_cookie: Option<Vec<u8>>,
    retry_group: Option<KeyExchangeAlgorithm>,

    psk_offered: bool,
    psk_accepted: bool,
    early_data_offered: bool,
    early_data_accepted: bool,
    early_traffic_secret: Option<Zeroizing<Vec<u8>>>,

    cert_requested: Option<Vec<u8>>,
    server_chain: Vec<Vec<u8>>,

    negotiated_alpn: Option<String>,
    peer_record_size_limit: Option<u16>,
}

impl std::fmt::Debug for ClientHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandshake")
            .field("state", &self.state)
            .field("cipher_suite", &self.cipher_suite)
            .finish_non_exhaustive()
    }
}

impl ClientHandshake {
    /// Create a client handshake.
    pub fn new(params: ClientHandshakeParams) -> Self {
        Self {
            params,
            state: ClientState::Start,
            client_random: [0u8; 32],
            session_id: Vec::new(),
            shares: Vec::new(),
            first_hello: None,
            transcript: None,
            key_schedule: None,
            cipher_suite: None,
            hello_retry_suite: None,
            retry_cookie: None,
            retry_group: None,
            psk_offered: false,
            psk_accepted: false,
            early_data_offered: false,
            early_data_accepted: false,
            early_traffic_secret: None,
            cert_requested: None,
            server_chain: Vec::new(),
            negotiated_alpn: None,
            peer_record_size_limit: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Check if the handshake is complete.
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// The negotiated cipher suite, after ServerHello.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    /// The client hello random.
    pub fn client_random(&self) -> &[u8; 32] {
        &self.client_random
    }

    /// The ALPN protocol the server selected.
    pub fn negotiated_alpn(&self) -> Option<&str> {
        self.negotiated_alpn.as_deref()
    }

    /// The record_size_limit the server advertised.
    pub fn peer_record_size_limit(&self) -> Option<u16> {
        self.peer_record_size_limit
    }

    /// Whether 0-RTT was offered in the first flight.
    pub fn early_data_offered(&self) -> bool {
        self.early_data_offered
    }

    /// Whether the server accepted 0-RTT.
    pub fn early_data_accepted(&self) -> bool {
        self.early_data_accepted
    }

    /// The client early traffic secret, once the first hello is built
    /// with a 0-RTT offer.
    pub fn early_traffic_secret(&self) -> Option<&[u8]> {
        self.early_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// The key schedule, once ServerHello has been processed.
    pub fn key_schedule(&self) -> Option<&KeySchedule> {
        self.key_schedule.as_ref()
    }

    /// The cipher suite 0-RTT keys are derived under (the ticket's
    /// suite), before the server has picked anything.
    pub fn early_cipher_suite(&self) -> Option<CipherSuite> {
        self.params.ticket.as_ref().map(|t| t.cipher_suite)
    }

    /// Drop the handshake and early traffic secrets once the caller has
    /// installed application keys in both directions.
    pub fn discard_handshake_secrets(&mut self) {
        if let Some(key_schedule) = &mut self.key_schedule {
            key_schedule.discard_handshake_traffic_secrets();
        }
        self.early_traffic_secret = None;
    }

    /// Server name offered for SNI.
    pub fn server_name(&self) -> Option<&str> {
        self.params.server_name.as_deref()
    }

    fn fail<T>(&mut self, error: Error) -> Result<T> {
        self.state = ClientState::Failed;
        Err(error)
    }

    fn expect_state(&mut self, expected: ClientState, what: &str) -> Result<()> {
        if self.state != expected {
            return self.fail(Error::UnexpectedMessage(format!(
                "{} in state {:?}",
                what, self.state
            )));
        }
        Ok(())
    }

    fn log_secret(&self, label: KeyLogLabel, secret: &[u8]) {
        if let Some(key_log) = &self.params.key_log {
            key_log.log(label, &self.client_random, secret);
        }
    }

    /// Build the first ClientHello. Returns the framed message.
    ///
    /// `now` is UNIX seconds, used for the obfuscated ticket age.
    pub fn client_hello(&mut self, provider: &dyn CryptoProvider, now: u64) -> Result<Vec<u8>> {
        self.expect_state(ClientState::Start, "client_hello")?;
        if self.params.cipher_suites.is_empty() || self.params.groups.is_empty() {
            return self.fail(Error::InvalidConfig(
                "at least one cipher suite and group required".to_string(),
            ));
        }

        provider.random().fill(&mut self.client_random).map_err(Error::from)?;
        let mut session_id = vec![0u8; 32];
        provider.random().fill(&mut session_id).map_err(Error::from)?;
        self.session_id = session_id;

        let share_groups = self
            .params
            .key_share_groups
            .clone()
            .unwrap_or_else(|| self.params.groups.clone());
        for &group in &share_groups {
            if !self.params.groups.contains(&group) {
                return self.fail(Error::InvalidConfig(format!(
                    "share group {} is not offered",
                    group.name()
                )));
            }
            let kex = provider.key_exchange(group)?;
            let (private_key, public_key) = kex.generate_keypair()?;
            self.shares.push((group, private_key, public_key.into_bytes()));
        }

        // A ticket is only usable while fresh; expired ones are dropped
        // here rather than offered.
        if let Some(ticket) = &self.params.ticket {
            if !ticket.is_valid(now) {
                self.params.ticket = None;
            }
        }
        self.early_data_offered = self.params.offer_early_data
            && self
                .params
                .ticket
                .as_ref()
                .map(|t| t.max_early_data_size > 0)
                .unwrap_or(false);

        let hello = self.build_hello(provider, now, true)?;

        // 0-RTT keys come straight off the PSK and the first hello.
        if self.early_data_offered {
            let ticket = self
                .params
                .ticket
                .as_ref()
                .ok_or_else(|| Error::InternalError("0-RTT offered without a ticket".to_string()))?;
            let mut early_schedule = KeySchedule::new(ticket.cipher_suite);
            early_schedule.init_early_secret(provider, Some(&ticket.psk))?;
            let mut hello_transcript = TranscriptHash::new(ticket.cipher_suite.hash_algorithm());
            hello_transcript.update(&hello);
            let hash = hello_transcript.current_hash(provider)?;
            let secret = early_schedule.derive_client_early_traffic_secret(provider, &hash)?;
            self.log_secret(KeyLogLabel::ClientEarlyTrafficSecret, &secret);
            self.early_traffic_secret = Some(Zeroizing::new(secret));
        }

        self.first_hello = Some(hello.clone());
        self.state = ClientState::WaitServerHello;
        Ok(hello)
    }

    /// Assemble and frame a ClientHello; used for both flights.
    ///
    /// For the retry hello the transcript is already live and the new
    /// hello is appended to it here; the first hello is buffered until
    /// the HelloRetryRequest disposition is known.
    fn build_hello(
        &mut self,
        provider: &dyn CryptoProvider,
        now: u64,
        first: bool,
    ) -> Result<Vec<u8>> {
        let mut extensions = Extensions::new();

        if let Some(name) = &self.params.server_name {
            extensions.add(extension_types::server_name(name));
        }
        extensions.add(extension_types::supported_groups(&self.params.groups));
        extensions.add(extension_types::signature_algorithms(&self.params.signature_schemes));
        extensions.add(extension_types::supported_versions_client());
        if !self.params.alpn_protocols.is_empty() {
            extensions.add(extension_types::alpn(&self.params.alpn_protocols));
        }
        if let Some(limit) = self.params.record_size_limit {
            extensions.add(extension_types::record_size_limit(limit));
        }
        if let Some(cookie_value) = &self.retry_cookie {
            extensions.add(extension_types::cookie(cookie_value));
        }

        let share_entries: Vec<KeyShareEntry> = match self.retry_group {
            Some(group) => {
                let (_, _, public) = self
                    .shares
                    .iter()
                    .find(|(g, _, _)| *g == group)
                    .ok_or_else(|| Error::InternalError("retry share missing".to_string()))?;
                vec![KeyShareEntry::new(group, public.clone())?]
            }
            None => self
                .shares
                .iter()
                .map(|(group, _, public)| KeyShareEntry::new(*group, public.clone()))
                .collect::<Result<_>>()?,
        };
        extensions.add(extension_types::key_share_client(&share_entries));

        // Resumption: the PSK rides last, with a placeholder binder that
        // is patched once the rest of the hello is fixed.
        let negotiated_hash = self.hello_retry_suite.map(|s| s.hash_algorithm());
        let psk_ticket = self.params.ticket.as_ref().filter(|ticket| {
            negotiated_hash
                .map(|h| h == ticket.cipher_suite.hash_algorithm())
                .unwrap_or(true)
        });

        let mut cipher_suites = self.params.cipher_suites.clone();
        if let Some(ticket) = psk_ticket {
            if !cipher_suites.contains(&ticket.cipher_suite) {
                cipher_suites.push(ticket.cipher_suite);
            }
        }

        let binder_info = if let Some(ticket) = psk_ticket {
            extensions.add(extension_types::psk_key_exchange_modes(&self.params.psk_modes));
            if first && self.early_data_offered {
                extensions.add(extension_types::early_data());
            }

            let hash_len = ticket.cipher_suite.hash_len();
            let offer = PreSharedKeyOffer {
                identities: vec![PskIdentity {
                    identity: ticket.ticket.clone(),
                    obfuscated_ticket_age: ticket.obfuscated_age(now),
                }],
                binders: vec![vec![0u8; hash_len]],
            };
            let binders_len = offer.binders_encoded_len();
            extensions.add(crate::extensions::Extension::new(
                ExtensionType::PreSharedKey,
                offer.encode(),
            ));
            self.psk_offered = true;
            Some((ticket.cipher_suite, ticket.psk.clone(), hash_len, binders_len))
        } else {
            None
        };

        let hello = ClientHello::new(self.client_random, cipher_suites)
            .with_session_id(self.session_id.clone())
            .with_extensions(extensions);
        let mut framed =
            HandshakeMessage::new(HandshakeType::ClientHello, hello.encode()?).encode()?;

        if let Some((suite, psk, hash_len, binders_len)) = binder_info {
            let truncated = &framed[..framed.len() - binders_len];
            let preceding = match &self.transcript {
                Some(transcript) => transcript.clone(),
                None => TranscriptHash::new(suite.hash_algorithm()),
            };
            let binder = compute_binder(
                provider,
                &psk,
                suite,
                BinderKind::Resumption,
                &preceding,
                truncated,
            )?;
            let start = framed.len() - hash_len;
            framed[start..].copy_from_slice(&binder);
        }

        if !first {
            if let Some(transcript) = &mut self.transcript {
                transcript.update(&framed);
            }
        }
        Ok(framed)
    }

    /// Process a ServerHello or HelloRetryRequest.
    pub fn process_server_hello(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
        now: u64,
    ) -> Result<ServerHelloOutcome> {
        self.expect_state(ClientState::WaitServerHello, "ServerHello")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::ServerHello {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for ServerHello",
                message.msg_type
            )));
        }
        let hello = match ServerHello::decode(&message.payload) {
            Ok(hello) => hello,
            Err(e) => return self.fail(e),
        };

        if hello.legacy_session_id_echo != self.session_id {
            return self.fail(Error::IllegalParameter(
                "legacy_session_id_echo mismatch".to_string(),
            ));
        }
        if !self.params.cipher_suites.contains(&hello.cipher_suite)
            && self.params.ticket.as_ref().map(|t| t.cipher_suite) != Some(hello.cipher_suite)
        {
            return self.fail(Error::IllegalParameter(
                "server selected a suite we did not offer".to_string(),
            ));
        }

        let is_retry = hello.is_hello_retry_request();
        let context = if is_retry {
            ExtensionContext::HelloRetryRequest
        } else {
            ExtensionContext::ServerHello
        };

        let versions_ext = match hello.extensions.get(ExtensionType::SupportedVersions) {
            Some(ext) => ext,
            None => return self.fail(Error::ProtocolVersion),
        };
        let versions = match decode_supported_versions(versions_ext, context) {
            Ok(versions) => versions,
            Err(e) => return self.fail(e),
        };
        if versions != [ProtocolVersion::Tls13.to_u16()] {
            return self.fail(Error::ProtocolVersion);
        }

        if is_retry {
            return self.handle_hello_retry(provider, raw, &hello, now);
        }

        if let Some(expected) = self.hello_retry_suite {
            if hello.cipher_suite != expected {
                return self.fail(Error::IllegalParameter(
                    "cipher suite changed after HelloRetryRequest".to_string(),
                ));
            }
        }

        // PSK acceptance: we offer a single identity, so only index 0
        // is coherent.
        if let Some(ext) = hello.extensions.get(ExtensionType::PreSharedKey) {
            if !self.psk_offered {
                return self.fail(Error::IllegalParameter(
                    "pre_shared_key accepted but never offered".to_string(),
                ));
            }
            let selected = match extension_types::decode_pre_shared_key_server(ext) {
                Ok(selected) => selected,
                Err(e) => return self.fail(e),
            };
            if selected != 0 {
                return self.fail(Error::IllegalParameter(format!(
                    "server selected PSK identity {}",
                    selected
                )));
            }
            let ticket_hash = self
                .params
                .ticket
                .as_ref()
                .map(|t| t.cipher_suite.hash_algorithm());
            if ticket_hash != Some(hello.cipher_suite.hash_algorithm()) {
                return self.fail(Error::IllegalParameter(
                    "PSK hash does not match the selected suite".to_string(),
                ));
            }
            self.psk_accepted = true;
        }

        // Key share: absent only in PSK-only mode.
        let shared_secret = match hello.extensions.get(ExtensionType::KeyShare) {
            Some(ext) => {
                let share = match decode_key_share(ext, ExtensionContext::ServerHello) {
                    Ok(share) => share,
                    Err(e) => return self.fail(e),
                };
                let entry = match share {
                    KeyShare::ServerShare(entry) => entry,
                    _ => {
                        return self.fail(Error::IllegalParameter(
                            "malformed server key_share".to_string(),
                        ))
                    }
                };
                if let Some(retry_group) = self.retry_group {
                    if entry.group != retry_group {
                        return self.fail(Error::IllegalParameter(
                            "server ignored its own retry group".to_string(),
                        ));
                    }
                }
                let private = self.shares.iter().find(|(g, _, _)| *g == entry.group);
                let (_, private_key, _) = match private {
                    Some(share) => share,
                    None => {
                        return self.fail(Error::IllegalParameter(
                            "server selected a group we offered no share for".to_string(),
                        ))
                    }
                };
                let kex = provider.key_exchange(entry.group)?;
                let shared = match kex.exchange(private_key, &entry.key_exchange) {
                    Ok(shared) => shared,
                    Err(_) => {
                        return self.fail(Error::IllegalParameter(
                            "invalid server key share".to_string(),
                        ))
                    }
                };
                Some(Zeroizing::new(shared.as_bytes().to_vec()))
            }
            None => {
                let psk_only_offered =
                    self.psk_accepted && self.params.psk_modes.contains(&PskKeyExchangeMode::PskKe);
                if !psk_only_offered {
                    return self.fail(Error::MissingExtension(
                        "ServerHello without key_share".to_string(),
                    ));
                }
                None
            }
        };

        self.cipher_suite = Some(hello.cipher_suite);

        // The transcript becomes concrete once the suite (and so the
        // hash) is known.
        let mut transcript = match self.transcript.take() {
            Some(transcript) => transcript,
            None => {
                let mut transcript = TranscriptHash::new(hello.cipher_suite.hash_algorithm());
                let first_hello = self
                    .first_hello
                    .take()
                    .ok_or_else(|| Error::InternalError("first hello missing".to_string()))?;
                transcript.update(&first_hello);
                transcript
            }
        };
        transcript.update(raw);

        let mut key_schedule = KeySchedule::new(hello.cipher_suite);
        let psk = self
            .psk_accepted
            .then(|| self.params.ticket.as_ref().map(|t| t.psk.clone()))
            .flatten();
        key_schedule.init_early_secret(provider, psk.as_deref().map(Vec::as_slice))?;
        key_schedule
            .derive_handshake_secret(provider, shared_secret.as_deref().map(Vec::as_slice))?;

        let transcript_hash = transcript.current_hash(provider)?;
        let (client_secret, server_secret) =
            key_schedule.derive_handshake_traffic_secrets(provider, &transcript_hash)?;
        self.log_secret(KeyLogLabel::ClientHandshakeTrafficSecret, &client_secret);
        self.log_secret(KeyLogLabel::ServerHandshakeTrafficSecret, &server_secret);

        self.transcript = Some(transcript);
        self.key_schedule = Some(key_schedule);
        self.state = ClientState::WaitEncryptedExtensions;
        Ok(ServerHelloOutcome::Proceed)
    }

    fn handle_hello_retry(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
        hello: &ServerHello,
        now: u64,
    ) -> Result<ServerHelloOutcome> {
        if self.hello_retry_suite.is_some() {
            return self.fail(Error::UnexpectedMessage(
                "second HelloRetryRequest".to_string(),
            ));
        }

        let retry_group = match hello.extensions.get(ExtensionType::KeyShare) {
            Some(ext) => {
                let share = match decode_key_share(ext, ExtensionContext::HelloRetryRequest) {
                    Ok(share) => share,
                    Err(e) => return self.fail(e),
                };
                match share {
                    KeyShare::RetryGroup(group) => Some(group),
                    _ => {
                        return self.fail(Error::IllegalParameter(
                            "malformed HelloRetryRequest key_share".to_string(),
                        ))
                    }
                }
            }
            None => None,
        };
        let cookie = match hello.extensions.get(ExtensionType::Cookie) {
            Some(ext) => match extension_types::decode_cookie(ext) {
                Ok(cookie) => Some(cookie),
                Err(e) => return self.fail(e),
            },
            None => None,
        };
        if retry_group.is_none() && cookie.is_none() {
            return self.fail(Error::IllegalParameter(
                "HelloRetryRequest changes nothing".to_string(),
            ));
        }

        if let Some(group) = retry_group {
            if !self.params.groups.contains(&group) {
                return self.fail(Error::IllegalParameter(format!(
                    "retry asks for unsupported group {}",
                    group.name()
                )));
            }
            // Fresh share for the requested group.
            let kex = provider.key_exchange(group)?;
            let (private_key, public_key) = kex.generate_keypair()?;
            self.shares.retain(|(g, _, _)| *g != group);
            self.shares.push((group, private_key, public_key.into_bytes()));
            self.retry_group = Some(group);
        }
        self.retry_cookie = cookie;
        self.hello_retry_suite = Some(hello.cipher_suite);

        // Transcript rewrite: CH1 collapses into a message_hash entry,
        // then the HelloRetryRequest itself is appended.
        let mut transcript = TranscriptHash::new(hello.cipher_suite.hash_algorithm());
        let first_hello = self
            .first_hello
            .take()
            .ok_or_else(|| Error::InternalError("first hello missing".to_string()))?;
        transcript.update(&first_hello);
        transcript.rewrite_for_hello_retry(provider)?;
        transcript.update(raw);
        self.transcript = Some(transcript);

        // 0-RTT does not survive a retry.
        self.early_data_offered = false;
        self.early_traffic_secret = None;
        self.psk_offered = false;

        let second_hello = self.build_hello(provider, now, false)?;
        Ok(ServerHelloOutcome::SendSecondHello(second_hello))
    }

    /// Process EncryptedExtensions.
    pub fn process_encrypted_extensions(&mut self, raw: &[u8]) -> Result<()> {
        self.expect_state(ClientState::WaitEncryptedExtensions, "EncryptedExtensions")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::EncryptedExtensions {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for EncryptedExtensions",
                message.msg_type
            )));
        }
        let ee = match EncryptedExtensions::decode(&message.payload) {
            Ok(ee) => ee,
            Err(e) => return self.fail(e),
        };

        if let Some(ext) = ee
            .extensions
            .get(ExtensionType::ApplicationLayerProtocolNegotiation)
        {
            let protocols = match decode_alpn(ext) {
                Ok(protocols) => protocols,
                Err(e) => return self.fail(e),
            };
            if protocols.len() != 1 || !self.params.alpn_protocols.contains(&protocols[0]) {
                return self.fail(Error::IllegalParameter(
                    "server selected an ALPN protocol we did not offer".to_string(),
                ));
            }
            self.negotiated_alpn = Some(protocols[0].clone());
        }

        if let Some(ext) = ee.extensions.get(ExtensionType::RecordSizeLimit) {
            match decode_record_size_limit(ext) {
                Ok(limit) => self.peer_record_size_limit = Some(limit),
                Err(e) => return self.fail(e),
            }
        }

        if let Some(ext) = ee.extensions.get(ExtensionType::EarlyData) {
            if let Err(e) = decode_early_data(ext, ExtensionContext::EncryptedExtensions) {
                return self.fail(e);
            }
            if !self.early_data_offered {
                return self.fail(Error::IllegalParameter(
                    "early_data accepted but never offered".to_string(),
                ));
            }
            self.early_data_accepted = true;
        }

        if let Some(transcript) = &mut self.transcript {
            transcript.update(raw);
        }
        self.state = if self.psk_accepted {
            ClientState::WaitFinished
        } else {
            ClientState::WaitCertCr
        };
        Ok(())
    }

    /// Process an optional CertificateRequest.
    pub fn process_certificate_request(&mut self, raw: &[u8]) -> Result<()> {
        self.expect_state(ClientState::WaitCertCr, "CertificateRequest")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::CertificateRequest {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for Certificate",
                message.msg_type
            )));
        }
        let request = match CertificateRequest::decode(&message.payload) {
            Ok(request) => request,
            Err(e) => return self.fail(e),
        };

        self.cert_requested = Some(request.context);
        if let Some(transcript) = &mut self.transcript {
            transcript.update(raw);
        }
        Ok(())
    }

    /// Process the server Certificate.
    pub fn process_certificate(&mut self, raw: &[u8], now: u64) -> Result<()> {
        self.expect_state(ClientState::WaitCertCr, "Certificate")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::Certificate {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for Certificate",
                message.msg_type
            )));
        }
        let certificate = match Certificate::decode(&message.payload) {
            Ok(certificate) => certificate,
            Err(e) => return self.fail(e),
        };
        if certificate.certificate_list.is_empty() {
            return self.fail(Error::BadCertificate("server sent no certificate".to_string()));
        }

        let chain = certificate.der_chain();
        let verifier = Arc::clone(&self.params.verifier);
        if let Err(e) = verifier.verify_chain(&chain, self.params.server_name.as_deref(), now) {
            return self.fail(e);
        }
        self.server_chain = chain;

        if let Some(transcript) = &mut self.transcript {
            transcript.update(raw);
        }
        self.state = ClientState::WaitCertVerify;
        Ok(())
    }

    /// Process the server CertificateVerify.
    pub fn process_certificate_verify(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
    ) -> Result<()> {
        self.expect_state(ClientState::WaitCertVerify, "CertificateVerify")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::CertificateVerify {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for CertificateVerify",
                message.msg_type
            )));
        }
        let verify = match CertificateVerify::decode(&message.payload) {
            Ok(verify) => verify,
            Err(e) => return self.fail(e),
        };

        if !self.params.signature_schemes.contains(&verify.algorithm) {
            return self.fail(Error::IllegalParameter(format!(
                "server signed with unoffered scheme {}",
                verify.algorithm.name()
            )));
        }

        let transcript_hash = match &self.transcript {
            Some(transcript) => transcript.current_hash(provider)?,
            None => return self.fail(Error::InternalError("transcript missing".to_string())),
        };
        let content = crate::messages::certificate_verify::signed_content(true, &transcript_hash);

        let end_entity = match self.server_chain.first() {
            Some(cert) => cert.clone(),
            None => return self.fail(Error::InternalError("certificate chain missing".to_string())),
        };
        let verifier = Arc::clone(&self.params.verifier);
        if let Err(e) =
            verifier.verify_signature(&end_entity, verify.algorithm, &content, &verify.signature)
        {
            return self.fail(e);
        }

        if let Some(transcript) = &mut self.transcript {
            transcript.update(raw);
        }
        self.state = ClientState::WaitFinished;
        Ok(())
    }

    /// Process server Finished; returns the client's second flight.
    pub fn process_server_finished(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
    ) -> Result<ClientFlight> {
        self.expect_state(ClientState::WaitFinished, "Finished")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::Finished {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for Finished",
                message.msg_type
            )));
        }

        let suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
        let finished = match Finished::decode(&message.payload, suite.hash_len()) {
            Ok(finished) => finished,
            Err(e) => return self.fail(e),
        };

        let transcript_hash = match &self.transcript {
            Some(transcript) => transcript.current_hash(provider)?,
            None => return self.fail(Error::InternalError("transcript missing".to_string())),
        };
        let server_secret = match self
            .key_schedule
            .as_ref()
            .and_then(|ks| ks.server_handshake_traffic_secret())
        {
            Some(secret) => secret.to_vec(),
            None => return self.fail(Error::InternalError("handshake secrets missing".to_string())),
        };
        let expected = compute_verify_data(
            provider,
            suite.hash_algorithm(),
            &server_secret,
            &transcript_hash,
        )?;
        if !verify_data_matches(&expected, &finished.verify_data) {
            return self.fail(Error::HandshakeFailure(
                "server Finished does not verify".to_string(),
            ));
        }

        let transcript = self
            .transcript
            .as_mut()
            .ok_or_else(|| Error::InternalError("transcript missing".to_string()))?;
        transcript.update(raw);

        // Application secrets cover CH..server Finished.
        let application_hash = transcript.current_hash(provider)?;
        let key_schedule = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
        key_schedule.derive_master_secret(provider)?;
        let (client_app, server_app) =
            key_schedule.derive_application_traffic_secrets(provider, &application_hash)?;

        // The second flight, in sending order.
        let end_of_early_data = if self.early_data_accepted {
            let eoed = HandshakeMessage::new(
                HandshakeType::EndOfEarlyData,
                EndOfEarlyData::new().encode()?,
            )
            .encode()?;
            transcript.update(&eoed);
            Some(eoed)
        } else {
            None
        };

        let certificate = if let Some(context) = self.cert_requested.clone() {
            let empty = HandshakeMessage::new(
                HandshakeType::Certificate,
                Certificate::empty(context).encode()?,
            )
            .encode()?;
            transcript.update(&empty);
            Some(empty)
        } else {
            None
        };

        let client_secret = key_schedule
            .client_handshake_traffic_secret()
            .ok_or_else(|| Error::InternalError("handshake secrets missing".to_string()))?
            .to_vec();
        let finished_hash = transcript.current_hash(provider)?;
        let verify_data =
            compute_verify_data(provider, suite.hash_algorithm(), &client_secret, &finished_hash)?;
        let client_finished =
            HandshakeMessage::new(HandshakeType::Finished, Finished::new(verify_data).encode()?)
                .encode()?;
        transcript.update(&client_finished);

        // Resumption master secret covers CH..client Finished; after
        // that the raw transcript has no further use. The handshake
        // traffic secrets stay alive until the caller has installed the
        // application keys and the second flight is on the wire.
        let resumption_hash = transcript.current_hash(provider)?;
        key_schedule.derive_resumption_master_secret(provider, &resumption_hash)?;
        transcript.discard();

        self.log_secret(KeyLogLabel::ClientTrafficSecret0, &client_app);
        self.log_secret(KeyLogLabel::ServerTrafficSecret0, &server_app);

        self.state = ClientState::Connected;
        Ok(ClientFlight {
            end_of_early_data,
            certificate,
            finished: client_finished,
        })
    }

    /// Process a post-handshake NewSessionTicket; returns the ticket to
    /// store.
    pub fn process_new_session_ticket(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
        now: u64,
    ) -> Result<StoredTicket> {
        self.expect_state(ClientState::Connected, "NewSessionTicket")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::NewSessionTicket {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} after the handshake",
                message.msg_type
            )));
        }
        let ticket = match NewSessionTicket::decode(&message.payload) {
            Ok(ticket) => ticket,
            Err(e) => return self.fail(e),
        };

        let suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
        let key_schedule = self
            .key_schedule
            .as_ref()
            .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
        let psk = key_schedule.derive_ticket_psk(provider, &ticket.ticket_nonce)?;
        let max_early_data_size = ticket.max_early_data_size()?.unwrap_or(0);

        Ok(StoredTicket {
            ticket: ticket.ticket,
            psk,
            cipher_suite: suite,
            ticket_age_add: ticket.ticket_age_add,
            received_at: now,
            lifetime: ticket.ticket_lifetime,
            max_early_data_size,
        })
    }
}
