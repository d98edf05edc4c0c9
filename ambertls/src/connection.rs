//! The connection: handshake driving, record I/O and application data.
//!
//! A connection is single-threaded cooperative: every state transition
//! happens inside a `handshake` / `read` / `write` call on the one task
//! driving it. The only suspension points are the transport's
//! `read_exact` and `write_all`; a transport error terminally fails the
//! connection with no partial-handshake recovery.

use crate::client::ClientConfig;
use crate::server::ServerConfig;
use crate::transport::Transport;
use ambertls_core::alert::{Alert, AlertLevel};
use ambertls_core::cipher::CipherSuite;
use ambertls_core::early_data::EarlyDataContext;
use ambertls_core::handshake::{
    ClientFlight, ClientHandshake, ClientHandshakeParams, ClientHelloOutcome, ServerHandshake,
    ServerHandshakeParams, ServerHelloOutcome,
};
use ambertls_core::key_schedule::KeySchedule;
use ambertls_core::messages::{KeyUpdate, KeyUpdateRequest};
use ambertls_core::protocol::HandshakeType;
use ambertls_core::record::{HandshakeReassembler, MAX_CIPHERTEXT_SIZE, MAX_FRAGMENT_SIZE};
use ambertls_core::record_protection::{RecordProtection, TlsCiphertext};
use ambertls_core::{AlertDescription, ContentType, Error, ProtocolVersion, Result};
use ambertls_crypto::CryptoProvider;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// change_cipher_spec records tolerated per connection.
const CCS_TOLERANCE: u8 = 8;

/// Connection role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Handshaking,
    Connected,
    Failed,
}

/// A TLS 1.3 connection over a blocking transport.
///
/// Create one with [`Connection::connect`] (initiator) or
/// [`Connection::accept`] (responder), then drive it to completion with
/// [`Connection::handshake`]. Once connected it is a full-duplex
/// encrypted stream; the two directions carry independent keys and
/// sequence numbers.
pub struct Connection<T: Transport> {
    transport: T,
    provider: Arc<dyn CryptoProvider>,
    role: Role,
    status: Status,

    client: Option<ClientHandshake>,
    server: Option<ServerHandshake>,
    client_config: Option<ClientConfig>,
    server_name: Option<String>,

    send_protection: Option<RecordProtection>,
    recv_protection: Option<RecordProtection>,

    reassembler: HandshakeReassembler,
    app_recv_buffer: Vec<u8>,
    early_data_received: Vec<u8>,
    early_context: EarlyDataContext,

    send_closed: bool,
    recv_closed: bool,

    ccs_budget: u8,
    first_client_record: bool,
    first_server_recv: bool,

    /// Ciphertext bytes of rejected early data still allowed to fail
    /// decryption before the connection gives up.
    skip_early_budget: usize,
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl<T: Transport> Connection<T> {
    /// Create an initiator connection to `server_name`.
    pub fn connect(transport: T, server_name: &str, config: ClientConfig) -> Result<Self> {
        let provider = Arc::clone(&config.provider);

        let mut params = ClientHandshakeParams::new(Arc::clone(&config.verifier));
        params.cipher_suites = config.cipher_suites.clone();
        params.groups = config.groups.clone();
        params.key_share_groups = config.key_share_groups.clone();
        params.signature_schemes = config.signature_schemes.clone();
        params.server_name = Some(server_name.to_string());
        params.alpn_protocols = config.alpn_protocols.clone();
        params.record_size_limit = config.record_size_limit;
        params.psk_modes = config.psk_modes.clone();
        params.key_log = config.key_log.clone();

        if config.offer_psk {
            let mut store = config
                .ticket_store
                .lock()
                .map_err(|_| Error::InternalError("ticket store lock poisoned".to_string()))?;
            params.ticket = store.take(server_name, &config.cipher_suites, unix_now());
        }
        params.offer_early_data = config.early_data.is_some() && params.ticket.is_some();

        Ok(Self {
            transport,
            provider,
            role: Role::Client,
            status: Status::Handshaking,
            client: Some(ClientHandshake::new(params)),
            server: None,
            client_config: Some(config),
            server_name: Some(server_name.to_string()),
            send_protection: None,
            recv_protection: None,
            reassembler: HandshakeReassembler::new(),
            app_recv_buffer: Vec::new(),
            early_data_received: Vec::new(),
            early_context: EarlyDataContext::new(),
            send_closed: false,
            recv_closed: false,
            ccs_budget: CCS_TOLERANCE,
            first_client_record: true,
            first_server_recv: false,
            skip_early_budget: 0,
        })
    }

    /// Create a responder connection.
    pub fn accept(transport: T, config: ServerConfig) -> Result<Self> {
        let provider = Arc::clone(&config.provider);

        let mut params = ServerHandshakeParams::new(
            config.certificate_chain.clone(),
            config.signing_scheme,
            config.private_key.to_vec(),
        );
        params.cipher_suites = config.cipher_suites.clone();
        params.groups = config.groups.clone();
        params.alpn_protocols = config.alpn_protocols.clone();
        params.record_size_limit = config.record_size_limit;
        params.accept_resumption = config.accept_resumption;
        params.accept_early_data = config.accept_early_data;
        params.max_early_data_size = config.max_early_data_size;
        params.ticket_lifetime = config.ticket_lifetime;
        params.ticket_count = config.ticket_count;
        params.send_cookie_on_retry = config.send_cookie_on_retry;
        params.key_log = config.key_log.clone();
        if config.accept_resumption {
            params.ticket_encryptor = Some(Arc::clone(&config.ticket_encryptor));
            params.replay_window = Some(Arc::clone(&config.replay_window));
        }

        Ok(Self {
            transport,
            provider,
            role: Role::Server,
            status: Status::Handshaking,
            client: None,
            server: Some(ServerHandshake::new(params)),
            client_config: None,
            server_name: None,
            send_protection: None,
            recv_protection: None,
            reassembler: HandshakeReassembler::new(),
            app_recv_buffer: Vec::new(),
            early_data_received: Vec::new(),
            early_context: EarlyDataContext::new(),
            send_closed: false,
            recv_closed: false,
            ccs_budget: CCS_TOLERANCE,
            first_client_record: false,
            first_server_recv: true,
            skip_early_budget: 0,
        })
    }

    /// Drive the handshake to completion.
    pub fn handshake(&mut self) -> Result<()> {
        if self.status == Status::Connected {
            return Ok(());
        }
        if self.status == Status::Failed {
            return Err(Error::InternalError("connection already failed".to_string()));
        }

        let result = match self.role {
            Role::Client => self.run_client_handshake(),
            Role::Server => self.run_server_handshake(),
        };
        match result {
            Ok(()) => {
                self.status = Status::Connected;
                Ok(())
            }
            Err(e) => Err(self.fatal(e)),
        }
    }

    /// Check if the handshake is complete.
    pub fn is_connected(&self) -> bool {
        self.status == Status::Connected
    }

    /// The negotiated cipher suite.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        match self.role {
            Role::Client => self.client.as_ref().and_then(|c| c.cipher_suite()),
            Role::Server => self.server.as_ref().and_then(|s| s.cipher_suite()),
        }
    }

    /// The negotiated ALPN protocol.
    pub fn alpn_protocol(&self) -> Option<&str> {
        match self.role {
            Role::Client => self.client.as_ref().and_then(|c| c.negotiated_alpn()),
            Role::Server => self.server.as_ref().and_then(|s| s.negotiated_alpn()),
        }
    }

    /// Whether 0-RTT data was accepted on this connection.
    pub fn early_data_accepted(&self) -> bool {
        match self.role {
            Role::Client => self.client.as_ref().map(|c| c.early_data_accepted()),
            Role::Server => self.server.as_ref().map(|s| s.early_data_accepted()),
        }
        .unwrap_or(false)
    }

    /// Take the 0-RTT data received during the handshake (server).
    pub fn take_early_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.early_data_received)
    }

    /// Read application data. Returns 0 at end of stream
    /// (close_notify).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.status != Status::Connected {
            return Err(Error::UnexpectedMessage("read before handshake".to_string()));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.app_recv_buffer.is_empty() {
            if self.recv_closed {
                return Ok(0);
            }
            let (content_type, payload) = match self.recv_record() {
                Ok(record) => record,
                Err(Error::CloseNotify) => {
                    self.recv_closed = true;
                    return Ok(0);
                }
                Err(e) => return Err(self.fatal(e)),
            };
            match content_type {
                ContentType::ApplicationData => {
                    self.app_recv_buffer.extend_from_slice(&payload);
                }
                ContentType::Handshake => {
                    self.reassembler.push(&payload);
                    loop {
                        let message = match self.reassembler.next_message() {
                            Ok(Some(message)) => message,
                            Ok(None) => break,
                            Err(e) => return Err(self.fatal(e)),
                        };
                        if let Err(e) = self.handle_post_handshake(&message) {
                            return Err(self.fatal(e));
                        }
                    }
                }
                other => {
                    return Err(self.fatal(Error::UnexpectedMessage(format!(
                        "{:?} record after the handshake",
                        other
                    ))));
                }
            }
        }

        let n = buf.len().min(self.app_recv_buffer.len());
        buf[..n].copy_from_slice(&self.app_recv_buffer[..n]);
        self.app_recv_buffer.drain(..n);
        Ok(n)
    }

    /// Write application data. Returns the number of bytes written
    /// (always all of `buf`).
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.status != Status::Connected {
            return Err(Error::UnexpectedMessage("write before handshake".to_string()));
        }
        if self.send_closed {
            return Err(Error::CloseNotify);
        }

        // A direction about to exhaust its nonce space must rotate
        // before the next record.
        if self
            .send_protection
            .as_ref()
            .map(|p| p.needs_key_update())
            .unwrap_or(false)
        {
            self.key_update(false)?;
        }

        let max = self
            .send_protection
            .as_ref()
            .map(|p| p.max_content_len())
            .unwrap_or(MAX_FRAGMENT_SIZE);
        let chunks: Vec<Vec<u8>> = buf.chunks(max).map(|c| c.to_vec()).collect();
        for chunk in chunks {
            if let Err(e) = self.send_record(ContentType::ApplicationData, &chunk) {
                return Err(self.fatal(e));
            }
        }
        Ok(buf.len())
    }

    /// Send close_notify and stop writing. The receive direction stays
    /// usable until the peer's own close_notify arrives.
    pub fn close(&mut self) -> Result<()> {
        if self.send_closed || self.status == Status::Failed {
            return Ok(());
        }
        let alert = Alert::close_notify();
        self.send_record(ContentType::Alert, &alert.encode())?;
        self.send_closed = true;
        Ok(())
    }

    /// Rotate this direction's traffic keys, optionally asking the peer
    /// to rotate too (RFC 8446 Section 4.6.3).
    pub fn key_update(&mut self, request_peer_update: bool) -> Result<()> {
        if self.status != Status::Connected {
            return Err(Error::UnexpectedMessage(
                "key_update before handshake".to_string(),
            ));
        }

        let request = if request_peer_update {
            KeyUpdateRequest::UpdateRequested
        } else {
            KeyUpdateRequest::UpdateNotRequested
        };
        let message = ambertls_core::messages::HandshakeMessage::new(
            HandshakeType::KeyUpdate,
            KeyUpdate::new(request).encode()?,
        )
        .encode()?;
        if let Err(e) = self.send_record(ContentType::Handshake, &message) {
            return Err(self.fatal(e));
        }
        self.rotate_send_keys().map_err(|e| self.fatal(e))
    }

    /// Export keying material (RFC 8446 Section 7.5).
    pub fn export_keying_material(
        &self,
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>> {
        let key_schedule = self
            .key_schedule()
            .ok_or_else(|| Error::InternalError("exporter not yet available".to_string()))?;
        key_schedule.export_keying_material(self.provider.as_ref(), label, context, length)
    }

    fn key_schedule(&self) -> Option<&KeySchedule> {
        match self.role {
            Role::Client => self.client.as_ref().and_then(|c| c.key_schedule()),
            Role::Server => self.server.as_ref().and_then(|s| s.key_schedule()),
        }
    }

    // --- record plumbing -------------------------------------------------

    fn send_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<()> {
        match &mut self.send_protection {
            Some(protection) => {
                let ciphertext = protection.encrypt(self.provider.as_ref(), content_type, payload)?;
                self.transport.write_all(&ciphertext.encode()?)
            }
            None => {
                let version = if self.first_client_record {
                    self.first_client_record = false;
                    ProtocolVersion::Tls10
                } else {
                    ProtocolVersion::Tls12
                };
                let record =
                    ambertls_core::record::TlsPlaintext::new(content_type, version, payload.to_vec());
                self.transport.write_all(&record.encode()?)
            }
        }
    }

    /// Send one or more records carrying a handshake message, honoring
    /// fragment limits.
    fn send_handshake(&mut self, message: &[u8]) -> Result<()> {
        let max = self
            .send_protection
            .as_ref()
            .map(|p| p.max_content_len())
            .unwrap_or(MAX_FRAGMENT_SIZE);
        let chunks: Vec<Vec<u8>> = message.chunks(max).map(|c| c.to_vec()).collect();
        for chunk in chunks {
            self.send_record(ContentType::Handshake, &chunk)?;
        }
        Ok(())
    }

    /// Read one record, transparently skipping change_cipher_spec and
    /// surfacing alerts as errors.
    fn recv_record(&mut self) -> Result<(ContentType, Vec<u8>)> {
        loop {
            let mut header = [0u8; 5];
            self.transport.read_exact(&mut header)?;

            let content_type = ContentType::from_u8(header[0])
                .ok_or_else(|| Error::UnexpectedMessage(format!("record type {}", header[0])))?;
            let version = u16::from_be_bytes([header[1], header[2]]);
            let first_hello_record = self.first_server_recv && self.role == Role::Server;
            if version != ProtocolVersion::Tls12.to_u16()
                && !(first_hello_record && version == ProtocolVersion::Tls10.to_u16())
            {
                return Err(Error::DecodeError(format!(
                    "record version 0x{:04x}",
                    version
                )));
            }
            let length = u16::from_be_bytes([header[3], header[4]]) as usize;
            if length > MAX_CIPHERTEXT_SIZE {
                return Err(Error::RecordOverflow);
            }

            let mut fragment = vec![0u8; length];
            self.transport.read_exact(&mut fragment)?;
            self.first_server_recv = false;

            match content_type {
                ContentType::ChangeCipherSpec => {
                    // Middlebox compatibility: a bounded number of bare
                    // change_cipher_spec records is silently dropped.
                    if fragment != [0x01] {
                        return Err(Error::DecodeError("malformed change_cipher_spec".into()));
                    }
                    if self.ccs_budget == 0 {
                        return Err(Error::UnexpectedMessage(
                            "too many change_cipher_spec records".to_string(),
                        ));
                    }
                    self.ccs_budget -= 1;
                    continue;
                }
                ContentType::ApplicationData if self.recv_protection.is_some() => {
                    let protection = self
                        .recv_protection
                        .as_mut()
                        .ok_or_else(|| Error::InternalError("no receive keys".to_string()))?;
                    let ciphertext = TlsCiphertext {
                        encrypted_record: fragment,
                    };
                    match protection.decrypt(self.provider.as_ref(), &ciphertext) {
                        Ok(plaintext) => {
                            if plaintext.content_type == ContentType::Alert {
                                self.process_alert(&plaintext.fragment)?;
                                continue;
                            }
                            return Ok((plaintext.content_type, plaintext.fragment));
                        }
                        Err(Error::BadRecordMac) if self.skip_early_budget > 0 => {
                            // Rejected 0-RTT records arrive under keys we
                            // never installed; skip them within budget.
                            self.skip_early_budget =
                                self.skip_early_budget.saturating_sub(length.max(1));
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }
                ContentType::ApplicationData if self.skip_early_budget > 0 => {
                    // Rejected 0-RTT before any receive keys exist (the
                    // HelloRetryRequest case): drop within budget.
                    self.skip_early_budget = self.skip_early_budget.saturating_sub(length.max(1));
                    continue;
                }
                ContentType::Alert => {
                    self.process_alert(&fragment)?;
                    continue;
                }
                ContentType::Handshake if self.recv_protection.is_none() => {
                    if fragment.is_empty() {
                        return Err(Error::DecodeError("empty handshake record".into()));
                    }
                    return Ok((ContentType::Handshake, fragment));
                }
                other => {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} record in this phase",
                        other
                    )));
                }
            }
        }
    }

    fn process_alert(&mut self, payload: &[u8]) -> Result<()> {
        let alert = Alert::decode(payload)?;
        if alert.description == AlertDescription::CloseNotify {
            return Err(Error::CloseNotify);
        }
        if alert.level == AlertLevel::Fatal || alert.description.is_fatal() {
            self.status = Status::Failed;
            return Err(Error::AlertReceived(alert.description));
        }
        // user_canceled and other warnings are ignored.
        Ok(())
    }

    fn next_handshake_message(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(message) = self.reassembler.next_message()? {
                return Ok(message);
            }
            let (content_type, payload) = self.recv_record()?;
            match content_type {
                ContentType::Handshake => self.reassembler.push(&payload),
                other => {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} record while expecting handshake data",
                        other
                    )));
                }
            }
        }
    }

    /// Mark the connection failed and emit the matching alert,
    /// best-effort.
    fn fatal(&mut self, error: Error) -> Error {
        if self.status != Status::Failed {
            if let Some(description) = error.alert_description() {
                if description != AlertDescription::CloseNotify && !self.send_closed {
                    let alert = Alert::fatal(description);
                    let _ = self.send_record(ContentType::Alert, &alert.encode());
                }
            }
            self.status = Status::Failed;
        }
        error
    }

    fn install_send(&mut self, suite: CipherSuite, secret: &[u8], peer_limit: Option<u16>) -> Result<()> {
        let mut protection = RecordProtection::new(self.provider.as_ref(), suite, secret)?;
        if let Some(limit) = peer_limit {
            protection.set_record_size_limit(limit);
        }
        self.send_protection = Some(protection);
        Ok(())
    }

    fn install_recv(&mut self, suite: CipherSuite, secret: &[u8]) -> Result<()> {
        self.recv_protection = Some(RecordProtection::new(self.provider.as_ref(), suite, secret)?);
        Ok(())
    }

    fn rotate_send_keys(&mut self) -> Result<()> {
        let next = {
            let key_schedule = self
                .key_schedule()
                .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
            let protection = self
                .send_protection
                .as_ref()
                .ok_or_else(|| Error::InternalError("no send keys".to_string()))?;
            key_schedule.next_traffic_secret(self.provider.as_ref(), protection.traffic_secret())?
        };
        let protection = self
            .send_protection
            .as_mut()
            .ok_or_else(|| Error::InternalError("no send keys".to_string()))?;
        protection.update_traffic_secret(self.provider.as_ref(), &next)
    }

    fn rotate_recv_keys(&mut self) -> Result<()> {
        let next = {
            let key_schedule = self
                .key_schedule()
                .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
            let protection = self
                .recv_protection
                .as_ref()
                .ok_or_else(|| Error::InternalError("no receive keys".to_string()))?;
            key_schedule.next_traffic_secret(self.provider.as_ref(), protection.traffic_secret())?
        };
        let protection = self
            .recv_protection
            .as_mut()
            .ok_or_else(|| Error::InternalError("no receive keys".to_string()))?;
        protection.update_traffic_secret(self.provider.as_ref(), &next)
    }

    // --- post-handshake messages -----------------------------------------

    fn handle_post_handshake(&mut self, message: &[u8]) -> Result<()> {
        let msg_type = HandshakeType::from_u8(message[0])
            .ok_or_else(|| Error::DecodeError(format!("handshake type {}", message[0])))?;
        match msg_type {
            HandshakeType::NewSessionTicket => {
                if self.role != Role::Client {
                    return Err(Error::UnexpectedMessage(
                        "NewSessionTicket from a client".to_string(),
                    ));
                }
                let now = unix_now();
                let provider = Arc::clone(&self.provider);
                let client = self
                    .client
                    .as_mut()
                    .ok_or_else(|| Error::InternalError("client state missing".to_string()))?;
                let ticket = client.process_new_session_ticket(provider.as_ref(), message, now)?;
                if let (Some(config), Some(server_name)) =
                    (&self.client_config, &self.server_name)
                {
                    let mut store = config
                        .ticket_store
                        .lock()
                        .map_err(|_| Error::InternalError("ticket store lock poisoned".to_string()))?;
                    store.insert(server_name, ticket);
                }
                Ok(())
            }
            HandshakeType::KeyUpdate => {
                let message = ambertls_core::messages::HandshakeMessage::decode(message)?;
                let key_update = KeyUpdate::decode(&message.payload)?;

                // The peer rotated its sending keys; rotate our receive
                // direction to match.
                self.rotate_recv_keys()?;

                if key_update.request_update == KeyUpdateRequest::UpdateRequested {
                    // Answer before any further application data.
                    let response = ambertls_core::messages::HandshakeMessage::new(
                        HandshakeType::KeyUpdate,
                        KeyUpdate::new(KeyUpdateRequest::UpdateNotRequested).encode()?,
                    )
                    .encode()?;
                    self.send_record(ContentType::Handshake, &response)?;
                    self.rotate_send_keys()?;
                }
                Ok(())
            }
            other => Err(Error::UnexpectedMessage(format!(
                "{:?} after the handshake",
                other
            ))),
        }
    }

    // --- client handshake driving ----------------------------------------

    fn run_client_handshake(&mut self) -> Result<()> {
        let provider = Arc::clone(&self.provider);
        let now = unix_now();

        let hello = {
            let client = self
                .client
                .as_mut()
                .ok_or_else(|| Error::InternalError("client state missing".to_string()))?;
            client.client_hello(provider.as_ref(), now)?
        };
        self.send_handshake(&hello)?;

        // 0-RTT: application data in the first flight, under a key
        // derived solely from the PSK.
        let early = {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| Error::InternalError("client state missing".to_string()))?;
            match (client.early_traffic_secret(), client.early_cipher_suite()) {
                (Some(secret), Some(suite)) => Some((suite, secret.to_vec())),
                _ => None,
            }
        };
        if let Some((suite, secret)) = early {
            self.install_send(suite, &secret, None)?;
            let payload = self
                .client_config
                .as_ref()
                .and_then(|c| c.early_data.clone())
                .unwrap_or_default();
            let max = self
                .send_protection
                .as_ref()
                .map(|p| p.max_content_len())
                .unwrap_or(MAX_FRAGMENT_SIZE);
            let chunks: Vec<Vec<u8>> = payload.chunks(max).map(|c| c.to_vec()).collect();
            for chunk in chunks {
                self.send_record(ContentType::ApplicationData, &chunk)?;
            }
        }

        // ServerHello, possibly via one HelloRetryRequest round.
        loop {
            let message = self.next_handshake_message()?;
            let outcome = {
                let client = self
                    .client
                    .as_mut()
                    .ok_or_else(|| Error::InternalError("client state missing".to_string()))?;
                client.process_server_hello(provider.as_ref(), &message, now)?
            };
            match outcome {
                ServerHelloOutcome::Proceed => break,
                ServerHelloOutcome::SendSecondHello(second) => {
                    // Anything sent under the early key is dead.
                    self.send_protection = None;
                    self.send_handshake(&second)?;
                }
            }
        }

        let suite = self
            .client
            .as_ref()
            .and_then(|c| c.cipher_suite())
            .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
        let server_hs_secret = self
            .client
            .as_ref()
            .and_then(|c| c.key_schedule())
            .and_then(|ks| ks.server_handshake_traffic_secret())
            .ok_or_else(|| Error::InternalError("handshake secrets missing".to_string()))?
            .to_vec();
        self.install_recv(suite, &server_hs_secret)?;

        // Server flight up to Finished.
        let flight = loop {
            let message = self.next_handshake_message()?;
            let msg_type = HandshakeType::from_u8(message[0]);
            let client = self
                .client
                .as_mut()
                .ok_or_else(|| Error::InternalError("client state missing".to_string()))?;
            match client.state() {
                ambertls_core::handshake::ClientState::WaitEncryptedExtensions => {
                    client.process_encrypted_extensions(&message)?;
                }
                ambertls_core::handshake::ClientState::WaitCertCr => {
                    if msg_type == Some(HandshakeType::CertificateRequest) {
                        client.process_certificate_request(&message)?;
                    } else {
                        client.process_certificate(&message, now)?;
                    }
                }
                ambertls_core::handshake::ClientState::WaitCertVerify => {
                    client.process_certificate_verify(provider.as_ref(), &message)?;
                }
                ambertls_core::handshake::ClientState::WaitFinished => {
                    break client.process_server_finished(provider.as_ref(), &message)?;
                }
                other => {
                    return Err(Error::UnexpectedMessage(format!(
                        "handshake message in state {:?}",
                        other
                    )));
                }
            }
        };

        self.send_client_flight(suite, flight)?;
        Ok(())
    }

    fn send_client_flight(&mut self, suite: CipherSuite, flight: ClientFlight) -> Result<()> {
        // The server is already on its application send keys.
        let (client_hs, client_app, server_app, peer_limit) = {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| Error::InternalError("client state missing".to_string()))?;
            let key_schedule = client
                .key_schedule()
                .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
            (
                key_schedule
                    .client_handshake_traffic_secret()
                    .ok_or_else(|| Error::InternalError("handshake secrets missing".to_string()))?
                    .to_vec(),
                key_schedule
                    .client_application_traffic_secret()
                    .ok_or_else(|| Error::InternalError("application secrets missing".to_string()))?
                    .to_vec(),
                key_schedule
                    .server_application_traffic_secret()
                    .ok_or_else(|| Error::InternalError("application secrets missing".to_string()))?
                    .to_vec(),
                client.peer_record_size_limit(),
            )
        };

        self.install_recv(suite, &server_app)?;

        // EndOfEarlyData still rides the early key.
        if let Some(eoed) = &flight.end_of_early_data {
            self.send_handshake(eoed)?;
        }

        self.install_send(suite, &client_hs, peer_limit)?;
        if let Some(certificate) = &flight.certificate {
            self.send_handshake(certificate)?;
        }
        self.send_handshake(&flight.finished)?;

        self.install_send(suite, &client_app, peer_limit)?;
        if let Some(client) = self.client.as_mut() {
            client.discard_handshake_secrets();
        }
        Ok(())
    }

    // --- server handshake driving ----------------------------------------

    fn run_server_handshake(&mut self) -> Result<()> {
        let provider = Arc::clone(&self.provider);
        let now = unix_now();

        // ClientHello, possibly twice around a HelloRetryRequest.
        loop {
            let message = self.next_handshake_message()?;
            let outcome = {
                let server = self
                    .server
                    .as_mut()
                    .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
                server.process_client_hello(provider.as_ref(), &message, now)?
            };
            match outcome {
                ClientHelloOutcome::Proceed => break,
                ClientHelloOutcome::HelloRetry(retry) => {
                    // 0-RTT sent alongside the first hello arrives under
                    // keys that died with the retry; skip those records.
                    let offered = self
                        .server
                        .as_ref()
                        .map(|s| s.client_offered_early_data())
                        .unwrap_or(false);
                    if offered {
                        let budget = self
                            .server
                            .as_ref()
                            .map(|s| s.max_early_data_size() as usize)
                            .unwrap_or(0);
                        self.skip_early_budget = budget + 4096;
                    }
                    self.send_handshake(&retry)?;
                }
            }
        }

        let server_hello = {
            let server = self
                .server
                .as_mut()
                .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
            server.server_hello(provider.as_ref())?
        };
        self.send_handshake(&server_hello)?;

        let (suite, server_hs, client_hs, peer_limit) = {
            let server = self
                .server
                .as_ref()
                .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
            let suite = server
                .cipher_suite()
                .ok_or_else(|| Error::InternalError("suite missing".to_string()))?;
            let key_schedule = server
                .key_schedule()
                .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
            (
                suite,
                key_schedule
                    .server_handshake_traffic_secret()
                    .ok_or_else(|| Error::InternalError("handshake secrets missing".to_string()))?
                    .to_vec(),
                key_schedule
                    .client_handshake_traffic_secret()
                    .ok_or_else(|| Error::InternalError("handshake secrets missing".to_string()))?
                    .to_vec(),
                server.peer_record_size_limit(),
            )
        };
        self.install_send(suite, &server_hs, peer_limit)?;

        // Encrypted server flight.
        let flight = {
            let server = self
                .server
                .as_mut()
                .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
            let mut messages = vec![server.encrypted_extensions()?];
            if let Some(certificate) = server.certificate()? {
                messages.push(certificate);
            }
            if let Some(verify) = server.certificate_verify(provider.as_ref())? {
                messages.push(verify);
            }
            messages.push(server.finished(provider.as_ref())?);
            messages
        };
        for message in &flight {
            self.send_handshake(message)?;
        }

        // Receive direction: early key first when 0-RTT was accepted.
        let early_info = {
            let server = self
                .server
                .as_ref()
                .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
            (
                server.early_data_accepted(),
                server.client_offered_early_data(),
                server.early_traffic_secret().map(|s| s.to_vec()),
                server.max_early_data_size(),
            )
        };
        match early_info {
            (true, _, Some(early_secret), max_size) => {
                self.install_recv(suite, &early_secret)?;
                self.early_context.offer(max_size);
                self.early_context.accept();
                self.read_early_data(&client_hs, suite)?;
            }
            (false, offered, _, max_size) => {
                if offered {
                    // The client may have sent 0-RTT records we cannot
                    // decrypt; skip them, bounded by the advertised
                    // budget plus per-record expansion.
                    self.skip_early_budget = max_size as usize + 4096;
                }
                self.install_recv(suite, &client_hs)?;
            }
            (true, _, None, _) => {
                return Err(Error::InternalError("early secret missing".to_string()));
            }
        }

        // Client Finished completes the handshake.
        let message = self.next_handshake_message()?;
        {
            let server = self
                .server
                .as_mut()
                .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
            // A client answering a CertificateRequest would send its
            // (empty) Certificate first; we never request one, so only
            // Finished is acceptable here.
            server.process_client_finished(provider.as_ref(), &message)?;
        }
        self.skip_early_budget = 0;

        let (client_app, server_app) = {
            let server = self
                .server
                .as_ref()
                .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
            let key_schedule = server
                .key_schedule()
                .ok_or_else(|| Error::InternalError("key schedule missing".to_string()))?;
            (
                key_schedule
                    .client_application_traffic_secret()
                    .ok_or_else(|| Error::InternalError("application secrets missing".to_string()))?
                    .to_vec(),
                key_schedule
                    .server_application_traffic_secret()
                    .ok_or_else(|| Error::InternalError("application secrets missing".to_string()))?
                    .to_vec(),
            )
        };
        self.install_recv(suite, &client_app)?;
        self.install_send(suite, &server_app, peer_limit)?;

        // Session tickets ride the application keys.
        let ticket_count = self
            .server
            .as_ref()
            .map(|s| s.ticket_count())
            .unwrap_or(0);
        for _ in 0..ticket_count {
            let ticket = {
                let server = self
                    .server
                    .as_mut()
                    .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
                server.new_session_ticket(provider.as_ref(), now)?
            };
            self.send_handshake(&ticket)?;
        }

        Ok(())
    }

    /// Read 0-RTT application data until EndOfEarlyData, then switch to
    /// the client handshake key.
    fn read_early_data(&mut self, client_hs_secret: &[u8], suite: CipherSuite) -> Result<()> {
        loop {
            if let Some(message) = self.reassembler.next_message()? {
                let server = self
                    .server
                    .as_mut()
                    .ok_or_else(|| Error::InternalError("server state missing".to_string()))?;
                server.process_end_of_early_data(&message)?;
                self.early_context.finish();
                self.install_recv(suite, client_hs_secret)?;
                return Ok(());
            }

            let (content_type, payload) = self.recv_record()?;
            match content_type {
                ContentType::ApplicationData => {
                    self.early_context.consume(payload.len())?;
                    self.early_data_received.extend_from_slice(&payload);
                }
                ContentType::Handshake => {
                    self.reassembler.push(&payload);
                }
                other => {
                    return Err(Error::UnexpectedMessage(format!(
                        "{:?} record during early data",
                        other
                    )));
                }
            }
        }
    }
}
