//! TLS 1.3 server handshake state machine.
//!
//! ```text
//! START
//!   | recv ClientHello ---- no usable key_share ----> send HelloRetryRequest
//!   v                                                   (back to START)
//! RECVD_CH
//!   | send ServerHello
//! NEGOTIATED
//!   | send EncryptedExtensions [Certificate CertificateVerify] Finished
//!   v
//! WAIT_EOED?        recv 0-RTT data, then EndOfEarlyData
//! WAIT_FINISHED     recv client Finished
//!   v
//! CONNECTED         (mint NewSessionTicket, KeyUpdate loop)
//! ```

use crate::cipher::CipherSuite;
use crate::error::{Error, Result};
use crate::extension_types::{
    self, decode_alpn, decode_cookie, decode_early_data, decode_key_share,
    decode_psk_key_exchange_modes, decode_record_size_limit, decode_server_name,
    decode_signature_algorithms, decode_supported_groups, decode_supported_versions,
    ExtensionContext, KeyShare, KeyShareEntry,
};
use crate::extensions::Extensions;
use crate::key_schedule::{BinderKind, KeySchedule};
use crate::keylog::{KeyLog, KeyLogLabel};
use crate::messages::{
    Certificate, CertificateVerify, ClientHello, EncryptedExtensions, EndOfEarlyData, Finished,
    HandshakeMessage, NewSessionTicket, ServerHello,
};
use crate::protocol::{ExtensionType, HandshakeType, ProtocolVersion};
use crate::early_data::ReplayWindow;
use crate::psk::{
    compute_binder, PreSharedKeyOffer, PskKeyExchangeMode, TICKET_AGE_TOLERANCE_SECS,
};
use crate::ticket_encryption::{TicketEncryptor, TicketState};
use crate::transcript::{compute_verify_data, verify_data_matches, TranscriptHash};
use ambertls_crypto::{CryptoProvider, KeyExchangeAlgorithm, SignatureScheme};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// Server handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for ClientHello (also after a HelloRetryRequest)
    Start,
    /// ClientHello accepted, negotiation fixed
    RecvdClientHello,
    /// ServerHello sent, handshake keys live
    Negotiated,
    /// Waiting for EndOfEarlyData under the early key
    WaitEndOfEarlyData,
    /// Waiting for client Finished
    WaitFinished,
    /// Handshake complete
    Connected,
    /// Terminally failed
    Failed,
}

/// Outcome of processing a ClientHello.
#[derive(Debug)]
pub enum ClientHelloOutcome {
    /// Negotiation succeeded; generate the server flight.
    Proceed,
    /// No usable key share; send the returned HelloRetryRequest and
    /// wait for the client's second hello.
    HelloRetry(Vec<u8>),
}

/// Inputs for a server handshake.
pub struct ServerHandshakeParams {
    /// Cipher suites in preference order
    pub cipher_suites: Vec<CipherSuite>,

    /// Key exchange groups in preference order
    pub groups: Vec<KeyExchangeAlgorithm>,

    /// Certificate chain (DER, end-entity first)
    pub certificate_chain: Vec<Vec<u8>>,

    /// Scheme the private key signs with
    pub signing_scheme: SignatureScheme,

    /// Private key in the provider's format for the scheme
    pub private_key: Zeroizing<Vec<u8>>,

    /// ALPN protocols this server speaks, in preference order
    pub alpn_protocols: Vec<String>,

    /// record_size_limit to advertise
    pub record_size_limit: Option<u16>,

    /// Accept resumption PSKs (requires a ticket encryptor)
    pub accept_resumption: bool,

    /// Accept 0-RTT early data on resumption
    pub accept_early_data: bool,

    /// Early data budget written into minted tickets
    pub max_early_data_size: u32,

    /// Process-wide ticket sealing state
    pub ticket_encryptor: Option<Arc<Mutex<TicketEncryptor>>>,

    /// Process-wide 0-RTT single-use window
    pub replay_window: Option<Arc<Mutex<ReplayWindow>>>,

    /// Lifetime of minted tickets in seconds
    pub ticket_lifetime: u32,

    /// NewSessionTicket messages to mint after the handshake
    pub ticket_count: u8,

    /// Attach a cookie to HelloRetryRequest and require its echo
    pub send_cookie_on_retry: bool,

    /// Key-log hook
    pub key_log: Option<Arc<dyn KeyLog>>,
}

impl std::fmt::Debug for ServerHandshakeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandshakeParams")
            .field("cipher_suites", &self.cipher_suites)
            .field("groups", &self.groups)
            .field("signing_scheme", &self.signing_scheme)
            .finish_non_exhaustive()
    }
}

impl ServerHandshakeParams {
    /// Defaults around a certificate chain and signing key.
    pub fn new(
        certificate_chain: Vec<Vec<u8>>,
        signing_scheme: SignatureScheme,
        private_key: Vec<u8>,
    ) -> Self {
        Self {
            cipher_suites: crate::cipher::DEFAULT_CIPHER_SUITES.to_vec(),
            groups: vec![KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1],
            certificate_chain,
            signing_scheme,
            private_key: Zeroizing::new(private_key),
            alpn_protocols: Vec::new(),
            record_size_limit: None,
            accept_resumption: false,
            accept_early_data: false,
            max_early_data_size: 16384,
            ticket_encryptor: None,
            replay_window: None,
            ticket_lifetime: 7200,
            ticket_count: 1,
            send_cookie_on_retry: false,
            key_log: None,
        }
    }
}

struct AcceptedPsk {
    psk: Zeroizing<Vec<u8>>,
    index: u16,
    ticket_suite: CipherSuite,
    fresh_for_early_data: bool,
}

/// Server-side handshake driver.
pub struct ServerHandshake {
    params: ServerHandshakeParams,
    state: ServerState,

    client_random: [u8; 32],
    session_id_echo: Vec<u8>,

    cipher_suite: Option<CipherSuite>,
    selected_group: Option<KeyExchangeAlgorithm>,
    client_share: Option<KeyShareEntry>,
    psk_only: bool,

    transcript: Option<TranscriptHash>,
    key_schedule: Option<KeySchedule>,

    hello_retry_sent: bool,
    retry_cookie: Option<Vec<u8>>,

    accepted_psk: Option<AcceptedPsk>,
    client_offered_early_data: bool,
    early_data_accepted: bool,
    early_traffic_secret: Option<Zeroizing<Vec<u8>>>,

    client_server_name: Option<String>,
    negotiated_alpn: Option<String>,
    peer_record_size_limit: Option<u16>,

    ticket_counter: u64,
}

impl std::fmt::Debug for ServerHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandshake")
            .field("state", &self.state)
            .field("cipher_suite", &self.cipher_suite)
            .finish_non_exhaustive()
    }
}

impl ServerHandshake {
    /// Create a server handshake.
    pub fn new(params: ServerHandshakeParams) -> Self {
        Self {
            params,
            state: ServerState::Start,
            client_random: [0u8; 32],
            session_id_echo: Vec::new(),
            cipher_suite: None,
            selected_group: None,
            client_share: None,
            psk_only: false,
            transcript: None,
            key_schedule: None,
            hello_retry_sent: false,
            retry_cookie: None,
            accepted_psk: None,
            client_offered_early_data: false,
            early_data_accepted: false,
            early_traffic_secret: None,
            client_server_name: None,
            negotiated_alpn: None,
            peer_record_size_limit: None,
            ticket_counter: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Check if the handshake is complete.
    pub fn is_connected(&self) -> bool {
        self.state == ServerState::Connected
    }

    /// The selected cipher suite.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    /// Whether the handshake resumed from a PSK.
    pub fn resumed(&self) -> bool {
        self.accepted_psk.is_some()
    }

    /// Whether the client offered 0-RTT on any hello.
    pub fn client_offered_early_data(&self) -> bool {
        self.client_offered_early_data
    }

    /// Whether 0-RTT was accepted.
    pub fn early_data_accepted(&self) -> bool {
        self.early_data_accepted
    }

    /// Early data budget for this connection.
    pub fn max_early_data_size(&self) -> u32 {
        self.params.max_early_data_size
    }

    /// The client early traffic secret, when 0-RTT was accepted.
    pub fn early_traffic_secret(&self) -> Option<&[u8]> {
        self.early_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// The ALPN protocol selected for this connection.
    pub fn negotiated_alpn(&self) -> Option<&str> {
        self.negotiated_alpn.as_deref()
    }

    /// The record_size_limit the client advertised.
    pub fn peer_record_size_limit(&self) -> Option<u16> {
        self.peer_record_size_limit
    }

    /// The SNI host name the client sent.
    pub fn client_server_name(&self) -> Option<&str> {
        self.client_server_name.as_deref()
    }

    /// The key schedule, once ServerHello has been generated.
    pub fn key_schedule(&self) -> Option<&KeySchedule> {
        self.key_schedule.as_ref()
    }

    fn fail<T>(&mut self, error: Error) -> Result<T> {
        self.state = ServerState::Failed;
        Err(error)
    }

    fn expect_state(&mut self, expected: ServerState, what: &str) -> Result<()> {
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

    /// Process a ClientHello (first or post-retry).
    ///
    /// `now` is UNIX seconds, used to judge ticket ages.
    pub fn process_client_hello(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
        now: u64,
    ) -> Result<ClientHelloOutcome> {
        self.expect_state(ServerState::Start, "ClientHello")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::ClientHello {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for ClientHello",
                message.msg_type
            )));
        }
        let hello = match ClientHello::decode(&message.payload) {
            Ok(hello) => hello,
            Err(e) => return self.fail(e),
        };
        if hello.legacy_version != ProtocolVersion::Tls12 {
            return self.fail(Error::IllegalParameter(
                "ClientHello legacy_version must be 0x0303".to_string(),
            ));
        }

        // supported_versions must offer TLS 1.3.
        let versions = match hello.extensions.get(ExtensionType::SupportedVersions) {
            Some(ext) => match decode_supported_versions(ext, ExtensionContext::ClientHello) {
                Ok(versions) => versions,
                Err(e) => return self.fail(e),
            },
            None => return self.fail(Error::ProtocolVersion),
        };
        if !versions.contains(&ProtocolVersion::Tls13.to_u16()) {
            return self.fail(Error::ProtocolVersion);
        }

        // Cipher suite: first of our preferences the client offered.
        let cipher_suite = match self
            .params
            .cipher_suites
            .iter()
            .find(|suite| hello.cipher_suites.contains(suite))
        {
            Some(&suite) => suite,
            None => {
                return self.fail(Error::HandshakeFailure("no common cipher suite".to_string()))
            }
        };
        if self.hello_retry_sent && self.cipher_suite != Some(cipher_suite) {
            return self.fail(Error::IllegalParameter(
                "cipher suite changed across retry".to_string(),
            ));
        }

        // Group: first of our preferences in the client's
        // supported_groups; a missing share for it triggers the retry.
        let client_groups = match hello.extensions.get(ExtensionType::SupportedGroups) {
            Some(ext) => match decode_supported_groups(ext) {
                Ok(groups) => groups,
                Err(e) => return self.fail(e),
            },
            None => {
                return self.fail(Error::MissingExtension("supported_groups".to_string()))
            }
        };
        let client_shares = match hello.extensions.get(ExtensionType::KeyShare) {
            Some(ext) => match decode_key_share(ext, ExtensionContext::ClientHello) {
                Ok(KeyShare::ClientShares(shares)) => shares,
                Ok(_) => {
                    return self.fail(Error::IllegalParameter(
                        "malformed client key_share".to_string(),
                    ))
                }
                Err(e) => return self.fail(e),
            },
            None => Vec::new(),
        };

        let selected_group = match self
            .params
            .groups
            .iter()
            .find(|group| client_groups.contains(group))
        {
            Some(&group) => group,
            None => {
                return self.fail(Error::HandshakeFailure("no common group".to_string()))
            }
        };
        let client_share = client_shares
            .iter()
            .find(|entry| entry.group == selected_group)
            .cloned();

        if client_share.is_none() && !self.hello_retry_sent {
            self.session_id_echo = hello.legacy_session_id.clone();
            if hello.extensions.has(ExtensionType::EarlyData) {
                // Early data sent alongside this hello will arrive under
                // keys we rejected; the caller skips those records.
                self.client_offered_early_data = true;
            }
            return self.send_hello_retry(provider, raw, cipher_suite, selected_group);
        }
        let client_share = match client_share {
            Some(share) => share,
            None => {
                // Post-retry hello still lacks the share we named.
                return self.fail(Error::IllegalParameter(
                    "retry hello has no share for the requested group".to_string(),
                ));
            }
        };
        self.session_id_echo = hello.legacy_session_id.clone();

        // Cookie echo after a retry.
        if self.hello_retry_sent {
            let echoed = match hello.extensions.get(ExtensionType::Cookie) {
                Some(ext) => match decode_cookie(ext) {
                    Ok(value) => Some(value),
                    Err(e) => return self.fail(e),
                },
                None => None,
            };
            if self.retry_cookie.is_some() && echoed != self.retry_cookie {
                return self.fail(Error::IllegalParameter(
                    "cookie not echoed after retry".to_string(),
                ));
            }
        }

        if let Some(ext) = hello.extensions.get(ExtensionType::ServerName) {
            match decode_server_name(ext) {
                Ok(name) => self.client_server_name = Some(name),
                Err(e) => return self.fail(e),
            }
        }
        if let Some(ext) = hello.extensions.get(ExtensionType::RecordSizeLimit) {
            match decode_record_size_limit(ext) {
                Ok(limit) => self.peer_record_size_limit = Some(limit),
                Err(e) => return self.fail(e),
            }
        }
        if let Some(ext) = hello
            .extensions
            .get(ExtensionType::ApplicationLayerProtocolNegotiation)
        {
            let offered = match decode_alpn(ext) {
                Ok(offered) => offered,
                Err(e) => return self.fail(e),
            };
            self.negotiated_alpn = self
                .params
                .alpn_protocols
                .iter()
                .find(|ours| offered.contains(ours))
                .cloned();
            if !self.params.alpn_protocols.is_empty() && self.negotiated_alpn.is_none() {
                return self.fail(Error::HandshakeFailure(
                    "no common ALPN protocol".to_string(),
                ));
            }
        }

        // Full handshakes need a signature scheme the client accepts.
        let psk_offer = hello.extensions.get(ExtensionType::PreSharedKey).cloned();
        if psk_offer.is_none() {
            let client_schemes = match hello.extensions.get(ExtensionType::SignatureAlgorithms) {
                Some(ext) => match decode_signature_algorithms(ext) {
                    Ok(schemes) => schemes,
                    Err(e) => return self.fail(e),
                },
                None => {
                    return self.fail(Error::MissingExtension("signature_algorithms".to_string()))
                }
            };
            if !client_schemes.contains(&self.params.signing_scheme) {
                return self.fail(Error::HandshakeFailure(
                    "client does not accept our signature scheme".to_string(),
                ));
            }
        }

        // PSK selection happens against the hello as transmitted, so the
        // binder is checked before the transcript absorbs the message.
        let mut psk_modes = Vec::new();
        if let Some(ext) = hello.extensions.get(ExtensionType::PskKeyExchangeModes) {
            match decode_psk_key_exchange_modes(ext) {
                Ok(modes) => psk_modes = modes,
                Err(e) => return self.fail(e),
            }
        }
        if let Some(ext) = &psk_offer {
            if psk_modes.is_empty() {
                return self.fail(Error::MissingExtension(
                    "pre_shared_key without psk_key_exchange_modes".to_string(),
                ));
            }
            let offer = match PreSharedKeyOffer::decode(&ext.data) {
                Ok(offer) => offer,
                Err(e) => return self.fail(e),
            };
            match self.select_psk(provider, raw, &offer, cipher_suite, now) {
                Ok(selection) => self.accepted_psk = selection,
                Err(e) => return self.fail(e),
            }
        }

        // ECDHE is skipped only when the client allows psk_ke and a PSK
        // was actually accepted.
        self.psk_only = self.accepted_psk.is_some()
            && !psk_modes.contains(&PskKeyExchangeMode::PskDheKe)
            && psk_modes.contains(&PskKeyExchangeMode::PskKe);

        self.client_random = hello.random;
        self.session_id_echo = hello.legacy_session_id.clone();
        self.cipher_suite = Some(cipher_suite);
        self.selected_group = Some(selected_group);
        self.client_share = Some(client_share);

        let mut transcript = match self.transcript.take() {
            Some(transcript) => transcript,
            None => TranscriptHash::new(cipher_suite.hash_algorithm()),
        };
        transcript.update(raw);

        // 0-RTT: PSK at index zero, same suite, fresh ticket, no retry.
        if let Some(ext) = hello.extensions.get(ExtensionType::EarlyData) {
            if let Err(e) = decode_early_data(ext, ExtensionContext::ClientHello) {
                return self.fail(e);
            }
            self.client_offered_early_data = true;
        }
        if self.params.accept_early_data
            && !self.hello_retry_sent
            && self.client_offered_early_data
        {
            if let Some(psk) = &self.accepted_psk {
                if psk.ticket_suite == cipher_suite && psk.fresh_for_early_data {
                    let mut early_schedule = KeySchedule::new(cipher_suite);
                    early_schedule.init_early_secret(provider, Some(&psk.psk))?;
                    let hash = transcript.current_hash(provider)?;
                    let secret =
                        early_schedule.derive_client_early_traffic_secret(provider, &hash)?;
                    self.log_secret(KeyLogLabel::ClientEarlyTrafficSecret, &secret);
                    self.early_traffic_secret = Some(Zeroizing::new(secret));
                    self.early_data_accepted = true;
                }
            }
        }

        self.transcript = Some(transcript);
        self.state = ServerState::RecvdClientHello;
        Ok(ClientHelloOutcome::Proceed)
    }

    fn send_hello_retry(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
        cipher_suite: CipherSuite,
        group: KeyExchangeAlgorithm,
    ) -> Result<ClientHelloOutcome> {
        let mut extensions = Extensions::new();
        extensions.add(extension_types::supported_versions_server());
        extensions.add(extension_types::key_share_hello_retry(group));
        if self.params.send_cookie_on_retry {
            let mut cookie_value = vec![0u8; 32];
            provider.random().fill(&mut cookie_value).map_err(Error::from)?;
            extensions.add(extension_types::cookie(&cookie_value));
            self.retry_cookie = Some(cookie_value);
        }

        let retry = ServerHello::hello_retry_request(cipher_suite)
            .with_session_id_echo(self.session_id_echo.clone())
            .with_extensions(extensions);
        let framed =
            HandshakeMessage::new(HandshakeType::ServerHello, retry.encode()?).encode()?;

        let mut transcript = TranscriptHash::new(cipher_suite.hash_algorithm());
        transcript.update(raw);
        transcript.rewrite_for_hello_retry(provider)?;
        transcript.update(&framed);
        self.transcript = Some(transcript);

        self.cipher_suite = Some(cipher_suite);
        self.hello_retry_sent = true;
        self.state = ServerState::Start;
        Ok(ClientHelloOutcome::HelloRetry(framed))
    }

    /// Try each offered PSK identity; the first that opens, matches the
    /// suite hash, is inside its lifetime and carries a valid binder
    /// wins. An invalid binder on an otherwise-acceptable ticket is
    /// fatal; tickets we cannot open fall back to the full handshake.
    fn select_psk(
        &mut self,
        provider: &dyn CryptoProvider,
        raw_hello: &[u8],
        offer: &PreSharedKeyOffer,
        cipher_suite: CipherSuite,
        now: u64,
    ) -> Result<Option<AcceptedPsk>> {
        if !self.params.accept_resumption {
            return Ok(None);
        }
        let encryptor = match &self.params.ticket_encryptor {
            Some(encryptor) => Arc::clone(encryptor),
            None => return Ok(None),
        };

        // Only the first identity can carry early data, but later
        // identities are still usable for plain resumption.
        for (index, identity) in offer.identities.iter().enumerate() {
            let state = {
                let encryptor = encryptor
                    .lock()
                    .map_err(|_| Error::InternalError("ticket key lock poisoned".to_string()))?;
                match encryptor.open(provider, &identity.identity) {
                    Ok(state) => state,
                    Err(_) => continue,
                }
            };

            if state.cipher_suite.hash_algorithm() != cipher_suite.hash_algorithm() {
                continue;
            }

            // Strict RFC 8446 Section 4.2.11 age handling: recover the
            // client's view of the age and bound it by the lifetime.
            let age_ms = identity
                .obfuscated_ticket_age
                .wrapping_sub(state.ticket_age_add);
            let age_secs = (age_ms / 1000) as u64;
            let server_age_secs = now.saturating_sub(state.issued_at);
            if server_age_secs >= state.lifetime as u64 {
                continue;
            }

            // PSK = HKDF-Expand-Label(rms, "resumption", ticket_nonce, len)
            let psk = Zeroizing::new(crate::transcript::hkdf_expand_label(
                provider,
                state.cipher_suite.hash_algorithm(),
                &state.resumption_master_secret,
                b"resumption",
                &state.ticket_nonce,
                state.cipher_suite.hash_len(),
            )?);

            let truncated_len = raw_hello.len() - offer.binders_encoded_len();
            let truncated = &raw_hello[..truncated_len];
            let preceding = match &self.transcript {
                Some(transcript) => transcript.clone(),
                None => TranscriptHash::new(cipher_suite.hash_algorithm()),
            };
            let expected = compute_binder(
                provider,
                &psk,
                state.cipher_suite,
                BinderKind::Resumption,
                &preceding,
                truncated,
            )?;
            if !verify_data_matches(&expected, &offer.binders[index]) {
                return Err(Error::HandshakeFailure(
                    "PSK binder does not verify".to_string(),
                ));
            }

            // 0-RTT freshness: the client's claimed age must agree with
            // the server clock, and the ticket must not be replayed.
            let fresh_for_early_data = index == 0
                && state.max_early_data_size > 0
                && age_secs.abs_diff(server_age_secs) <= TICKET_AGE_TOLERANCE_SECS
                && self.check_replay(&identity.identity);

            return Ok(Some(AcceptedPsk {
                psk,
                index: index as u16,
                ticket_suite: state.cipher_suite,
                fresh_for_early_data,
            }));
        }

        Ok(None)
    }

    fn check_replay(&self, identity: &[u8]) -> bool {
        match &self.params.replay_window {
            Some(window) => match window.lock() {
                Ok(mut window) => window.check_and_insert(identity),
                Err(_) => false,
            },
            None => false,
        }
    }

    /// Generate the ServerHello and install the handshake secrets.
    pub fn server_hello(&mut self, provider: &dyn CryptoProvider) -> Result<Vec<u8>> {
        self.expect_state(ServerState::RecvdClientHello, "server_hello")?;

        let cipher_suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("negotiation incomplete".to_string()))?;

        let mut random = [0u8; 32];
        provider.random().fill(&mut random).map_err(Error::from)?;

        let mut extensions = Extensions::new();
        extensions.add(extension_types::supported_versions_server());

        // ECDHE share, unless the connection is PSK-only.
        let shared_secret = if self.psk_only {
            None
        } else {
            let group = self
                .selected_group
                .ok_or_else(|| Error::InternalError("group not negotiated".to_string()))?;
            let client_share = self
                .client_share
                .as_ref()
                .ok_or_else(|| Error::InternalError("client share missing".to_string()))?;
            let kex = provider.key_exchange(group)?;
            let (private_key, public_key) = kex.generate_keypair()?;
            let shared = match kex.exchange(&private_key, &client_share.key_exchange) {
                Ok(shared) => shared,
                Err(_) => {
                    return self.fail(Error::IllegalParameter(
                        "invalid client key share".to_string(),
                    ))
                }
            };
            extensions.add(extension_types::key_share_server(&KeyShareEntry::new(
                client_share.group,
                public_key.into_bytes(),
            )?));
            Some(Zeroizing::new(shared.as_bytes().to_vec()))
        };

        if let Some(psk) = &self.accepted_psk {
            extensions.add(extension_types::pre_shared_key_server(psk.index));
        }

        let hello = ServerHello::new(random, cipher_suite)
            .with_session_id_echo(self.session_id_echo.clone())
            .with_extensions(extensions);
        let framed =
            HandshakeMessage::new(HandshakeType::ServerHello, hello.encode()?).encode()?;

        let transcript = self
            .transcript
            .as_mut()
            .ok_or_else(|| Error::InternalError("transcript missing".to_string()))?;
        transcript.update(&framed);
        let transcript_hash = transcript.current_hash(provider)?;

        let mut key_schedule = KeySchedule::new(cipher_suite);
        let psk = self.accepted_psk.as_ref().map(|p| p.psk.clone());
        key_schedule.init_early_secret(provider, psk.as_deref().map(Vec::as_slice))?;
        key_schedule
            .derive_handshake_secret(provider, shared_secret.as_deref().map(Vec::as_slice))?;
        let (client_secret, server_secret) =
            key_schedule.derive_handshake_traffic_secrets(provider, &transcript_hash)?;
        self.log_secret(KeyLogLabel::ClientHandshakeTrafficSecret, &client_secret);
        self.log_secret(KeyLogLabel::ServerHandshakeTrafficSecret, &server_secret);

        self.key_schedule = Some(key_schedule);
        self.state = ServerState::Negotiated;
        Ok(framed)
    }

    /// Generate EncryptedExtensions.
    pub fn encrypted_extensions(&mut self) -> Result<Vec<u8>> {
        if self.state != ServerState::Negotiated {
            return self.fail(Error::UnexpectedMessage(
                "encrypted_extensions before ServerHello".to_string(),
            ));
        }

        let mut extensions = Extensions::new();
        if self.client_server_name.is_some() {
            extensions.add(extension_types::server_name_ack());
        }
        extensions.add(extension_types::supported_groups(&self.params.groups));
        if let Some(protocol) = self.negotiated_alpn.clone() {
            extensions.add(extension_types::alpn(&[protocol]));
        }
        if let Some(limit) = self.params.record_size_limit {
            extensions.add(extension_types::record_size_limit(limit));
        }
        if self.early_data_accepted {
            extensions.add(extension_types::early_data());
        }

        let ee = EncryptedExtensions::new(extensions);
        let framed =
            HandshakeMessage::new(HandshakeType::EncryptedExtensions, ee.encode()?).encode()?;
        if let Some(transcript) = &mut self.transcript {
            transcript.update(&framed);
        }
        Ok(framed)
    }

    /// Generate the Certificate message; `None` on resumption.
    pub fn certificate(&mut self) -> Result<Option<Vec<u8>>> {
        if self.state != ServerState::Negotiated {
            return self.fail(Error::UnexpectedMessage(
                "certificate before ServerHello".to_string(),
            ));
        }
        if self.accepted_psk.is_some() {
            return Ok(None);
        }
        if self.params.certificate_chain.is_empty() {
            return self.fail(Error::InvalidConfig("no certificate configured".to_string()));
        }

        let message = Certificate::from_chain(&self.params.certificate_chain);
        let framed =
            HandshakeMessage::new(HandshakeType::Certificate, message.encode()?).encode()?;
        if let Some(transcript) = &mut self.transcript {
            transcript.update(&framed);
        }
        Ok(Some(framed))
    }

    /// Generate CertificateVerify; `None` on resumption.
    pub fn certificate_verify(&mut self, provider: &dyn CryptoProvider) -> Result<Option<Vec<u8>>> {
        if self.state != ServerState::Negotiated {
            return self.fail(Error::UnexpectedMessage(
                "certificate_verify before ServerHello".to_string(),
            ));
        }
        if self.accepted_psk.is_some() {
            return Ok(None);
        }

        let transcript_hash = match &self.transcript {
            Some(transcript) => transcript.current_hash(provider)?,
            None => return self.fail(Error::InternalError("transcript missing".to_string())),
        };
        let content = crate::messages::certificate_verify::signed_content(true, &transcript_hash);

        let signer = provider.signature(self.params.signing_scheme)?;
        let signature = signer
            .sign(&self.params.private_key, &content)
            .map_err(|e| Error::InternalError(format!("signing failed: {}", e)))?;

        let message = CertificateVerify::new(self.params.signing_scheme, signature);
        let framed =
            HandshakeMessage::new(HandshakeType::CertificateVerify, message.encode()?).encode()?;
        if let Some(transcript) = &mut self.transcript {
            transcript.update(&framed);
        }
        Ok(Some(framed))
    }

    /// Generate the server Finished and install application secrets.
    pub fn finished(&mut self, provider: &dyn CryptoProvider) -> Result<Vec<u8>> {
        if self.state != ServerState::Negotiated {
            return self.fail(Error::UnexpectedMessage(
                "finished before ServerHello".to_string(),
            ));
        }

        let cipher_suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
        let server_secret = match self
            .key_schedule
            .as_ref()
            .and_then(|ks| ks.server_handshake_traffic_secret())
        {
            Some(secret) => secret.to_vec(),
            None => return self.fail(Error::InternalError("handshake secrets missing".to_string())),
        };

        let transcript = self
            .transcript
            .as_mut()
            .ok_or_else(|| Error::InternalError("transcript missing".to_string()))?;
        let transcript_hash = transcript.current_hash(provider)?;
        let verify_data = compute_verify_data(
            provider,
            cipher_suite.hash_algorithm(),
            &server_secret,
            &transcript_hash,
        )?;
        let framed =
            HandshakeMessage::new(HandshakeType::Finished, Finished::new(verify_data).encode()?)
                .encode()?;
        transcript.update(&framed);

        let application_hash = transcript.current_hash(provider)?;
        let key_schedule = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
        key_schedule.derive_master_secret(provider)?;
        let (client_app, server_app) =
            key_schedule.derive_application_traffic_secrets(provider, &application_hash)?;
        self.log_secret(KeyLogLabel::ClientTrafficSecret0, &client_app);
        self.log_secret(KeyLogLabel::ServerTrafficSecret0, &server_app);

        self.state = if self.early_data_accepted {
            ServerState::WaitEndOfEarlyData
        } else {
            ServerState::WaitFinished
        };
        Ok(framed)
    }

    /// Process EndOfEarlyData; the caller then switches the receive
    /// direction to the handshake key.
    pub fn process_end_of_early_data(&mut self, raw: &[u8]) -> Result<()> {
        self.expect_state(ServerState::WaitEndOfEarlyData, "EndOfEarlyData")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::EndOfEarlyData {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while reading early data",
                message.msg_type
            )));
        }
        if let Err(e) = EndOfEarlyData::decode(&message.payload) {
            return self.fail(e);
        }

        if let Some(transcript) = &mut self.transcript {
            transcript.update(raw);
        }
        self.state = ServerState::WaitFinished;
        Ok(())
    }

    /// Process the client Finished; completes the handshake.
    pub fn process_client_finished(
        &mut self,
        provider: &dyn CryptoProvider,
        raw: &[u8],
    ) -> Result<()> {
        self.expect_state(ServerState::WaitFinished, "Finished")?;

        let message = HandshakeMessage::decode(raw)?;
        if message.msg_type != HandshakeType::Finished {
            return self.fail(Error::UnexpectedMessage(format!(
                "{:?} while waiting for client Finished",
                message.msg_type
            )));
        }

        let cipher_suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
        let finished = match Finished::decode(&message.payload, cipher_suite.hash_len()) {
            Ok(finished) => finished,
            Err(e) => return self.fail(e),
        };

        let client_secret = match self
            .key_schedule
            .as_ref()
            .and_then(|ks| ks.client_handshake_traffic_secret())
        {
            Some(secret) => secret.to_vec(),
            None => return self.fail(Error::InternalError("handshake secrets missing".to_string())),
        };
        let transcript_hash = match &self.transcript {
            Some(transcript) => transcript.current_hash(provider)?,
            None => return self.fail(Error::InternalError("transcript missing".to_string())),
        };
        let expected = compute_verify_data(
            provider,
            cipher_suite.hash_algorithm(),
            &client_secret,
            &transcript_hash,
        )?;
        if !verify_data_matches(&expected, &finished.verify_data) {
            return self.fail(Error::HandshakeFailure(
                "client Finished does not verify".to_string(),
            ));
        }

        let transcript = self
            .transcript
            .as_mut()
            .ok_or_else(|| Error::InternalError("transcript missing".to_string()))?;
        transcript.update(raw);
        let resumption_hash = transcript.current_hash(provider)?;
        let key_schedule = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
        key_schedule.derive_resumption_master_secret(provider, &resumption_hash)?;
        key_schedule.discard_handshake_traffic_secrets();
        transcript.discard();

        self.state = ServerState::Connected;
        Ok(())
    }

    /// Number of NewSessionTicket messages to mint after the handshake.
    pub fn ticket_count(&self) -> u8 {
        if self.params.accept_resumption && self.params.ticket_encryptor.is_some() {
            self.params.ticket_count
        } else {
            0
        }
    }

    /// Mint one NewSessionTicket.
    pub fn new_session_ticket(
        &mut self,
        provider: &dyn CryptoProvider,
        now: u64,
    ) -> Result<Vec<u8>> {
        self.expect_state(ServerState::Connected, "new_session_ticket")?;

        let cipher_suite = self
            .cipher_suite
            .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
        let encryptor = match &self.params.ticket_encryptor {
            Some(encryptor) => Arc::clone(encryptor),
            None => {
                return self.fail(Error::InvalidConfig(
                    "ticket minting without a ticket key".to_string(),
                ))
            }
        };
        let resumption_secret = match self
            .key_schedule
            .as_ref()
            .and_then(|ks| ks.resumption_master_secret())
        {
            Some(secret) => Zeroizing::new(secret.to_vec()),
            None => {
                return self.fail(Error::InternalError(
                    "resumption master secret missing".to_string(),
                ))
            }
        };

        self.ticket_counter += 1;
        let ticket_nonce = self.ticket_counter.to_be_bytes().to_vec();

        let mut age_add_bytes = [0u8; 4];
        provider.random().fill(&mut age_add_bytes).map_err(Error::from)?;
        let ticket_age_add = u32::from_be_bytes(age_add_bytes);

        let max_early_data_size = if self.params.accept_early_data {
            self.params.max_early_data_size
        } else {
            0
        };

        let state = TicketState {
            cipher_suite,
            issued_at: now,
            lifetime: self.params.ticket_lifetime,
            ticket_age_add,
            max_early_data_size,
            ticket_nonce: ticket_nonce.clone(),
            resumption_master_secret: resumption_secret,
        };
        let ticket = {
            let encryptor = encryptor
                .lock()
                .map_err(|_| Error::InternalError("ticket key lock poisoned".to_string()))?;
            encryptor.seal(provider, &state)?
        };

        let mut extensions = Extensions::new();
        if max_early_data_size > 0 {
            extensions.add(extension_types::early_data_ticket(max_early_data_size));
        }
        let message = NewSessionTicket {
            ticket_lifetime: self.params.ticket_lifetime,
            ticket_age_add,
            ticket_nonce,
            ticket,
            extensions,
        };
        HandshakeMessage::new(HandshakeType::NewSessionTicket, message.encode()?).encode()
    }
}
