//! Server configuration.

use ambertls_core::cipher::CipherSuite;
use ambertls_core::early_data::ReplayWindow;
use ambertls_core::keylog::KeyLog;
use ambertls_core::ticket_encryption::TicketEncryptor;
use ambertls_core::{Error, Result};
use ambertls_crypto::{CryptoProvider, KeyExchangeAlgorithm, SignatureScheme};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// Server-side configuration.
///
/// Cheap to clone; the ticket key and replay window are process-wide
/// shared state.
#[derive(Clone)]
pub struct ServerConfig {
    /// Crypto provider backing all operations
    pub provider: Arc<dyn CryptoProvider>,

    /// Certificate chain (DER, end-entity first)
    pub certificate_chain: Vec<Vec<u8>>,

    /// Scheme the private key signs with
    pub signing_scheme: SignatureScheme,

    /// Private key (raw scalar for ECDSA, PKCS#8 DER for RSA)
    pub private_key: Zeroizing<Vec<u8>>,

    /// Cipher suites in preference order
    pub cipher_suites: Vec<CipherSuite>,

    /// Key exchange groups in preference order
    pub groups: Vec<KeyExchangeAlgorithm>,

    /// ALPN protocols this server speaks
    pub alpn_protocols: Vec<String>,

    /// record_size_limit to advertise
    pub record_size_limit: Option<u16>,

    /// Issue and accept resumption tickets
    pub accept_resumption: bool,

    /// Accept 0-RTT early data on resumption
    pub accept_early_data: bool,

    /// Early data budget written into minted tickets
    pub max_early_data_size: u32,

    /// Lifetime of minted tickets in seconds
    pub ticket_lifetime: u32,

    /// NewSessionTicket messages to send per connection
    pub ticket_count: u8,

    /// Attach a cookie to HelloRetryRequest and require its echo
    pub send_cookie_on_retry: bool,

    /// Process-wide ticket sealing key
    pub ticket_encryptor: Arc<Mutex<TicketEncryptor>>,

    /// Process-wide 0-RTT single-use window
    pub replay_window: Arc<Mutex<ReplayWindow>>,

    /// NSS key-log hook
    pub key_log: Option<Arc<dyn KeyLog>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("cipher_suites", &self.cipher_suites)
            .field("signing_scheme", &self.signing_scheme)
            .field("accept_resumption", &self.accept_resumption)
            .field("accept_early_data", &self.accept_early_data)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Create a configuration builder around a certificate chain and
    /// its signing key.
    pub fn builder(
        provider: Arc<dyn CryptoProvider>,
        certificate_chain: Vec<Vec<u8>>,
        signing_scheme: SignatureScheme,
        private_key: Vec<u8>,
    ) -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig {
                provider,
                certificate_chain,
                signing_scheme,
                private_key: Zeroizing::new(private_key),
                cipher_suites: ambertls_core::cipher::DEFAULT_CIPHER_SUITES.to_vec(),
                groups: vec![KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1],
                alpn_protocols: Vec::new(),
                record_size_limit: None,
                accept_resumption: false,
                accept_early_data: false,
                max_early_data_size: 16384,
                ticket_lifetime: 7200,
                ticket_count: 1,
                send_cookie_on_retry: false,
                ticket_encryptor: Arc::new(Mutex::new(TicketEncryptor::new())),
                replay_window: Arc::new(Mutex::new(ReplayWindow::new(4096))),
                key_log: None,
            },
        }
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the cipher suite preference order.
    pub fn with_cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config.cipher_suites = suites.to_vec();
        self
    }

    /// Set the key exchange groups.
    pub fn with_groups(mut self, groups: &[KeyExchangeAlgorithm]) -> Self {
        self.config.groups = groups.to_vec();
        self
    }

    /// Set the ALPN protocols this server speaks.
    pub fn with_alpn_protocols(mut self, protocols: &[&str]) -> Self {
        self.config.alpn_protocols = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Advertise a record_size_limit.
    pub fn with_record_size_limit(mut self, limit: u16) -> Self {
        self.config.record_size_limit = Some(limit);
        self
    }

    /// Enable session resumption (ticket minting and PSK acceptance).
    pub fn with_session_resumption(mut self, enable: bool) -> Self {
        self.config.accept_resumption = enable;
        self
    }

    /// Accept 0-RTT early data up to `max_size` bytes per connection.
    pub fn with_early_data(mut self, enable: bool, max_size: u32) -> Self {
        self.config.accept_early_data = enable;
        self.config.max_early_data_size = max_size;
        self
    }

    /// Set minted ticket lifetime in seconds (capped at seven days).
    pub fn with_ticket_lifetime(mut self, lifetime: u32) -> Self {
        self.config.ticket_lifetime = lifetime;
        self
    }

    /// Number of NewSessionTicket messages to send per connection.
    pub fn with_ticket_count(mut self, count: u8) -> Self {
        self.config.ticket_count = count;
        self
    }

    /// Require a cookie echo across HelloRetryRequest.
    pub fn with_retry_cookie(mut self, enable: bool) -> Self {
        self.config.send_cookie_on_retry = enable;
        self
    }

    /// Share an existing ticket encryptor (multi-process deployments).
    pub fn with_ticket_encryptor(mut self, encryptor: Arc<Mutex<TicketEncryptor>>) -> Self {
        self.config.ticket_encryptor = encryptor;
        self
    }

    /// Install an NSS key-log hook.
    pub fn with_key_log(mut self, key_log: Arc<dyn KeyLog>) -> Self {
        self.config.key_log = Some(key_log);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ServerConfig> {
        if self.config.certificate_chain.is_empty() {
            return Err(Error::InvalidConfig("no certificate chain".to_string()));
        }
        if self.config.private_key.is_empty() {
            return Err(Error::InvalidConfig("no private key".to_string()));
        }
        if self.config.cipher_suites.is_empty() || self.config.groups.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one cipher suite and group required".to_string(),
            ));
        }
        if self.config.accept_early_data && !self.config.accept_resumption {
            return Err(Error::InvalidConfig(
                "early data requires session resumption".to_string(),
            ));
        }
        if self.config.ticket_lifetime > 604_800 {
            return Err(Error::InvalidConfig(
                "ticket lifetime exceeds seven days".to_string(),
            ));
        }
        Ok(self.config)
    }
}
