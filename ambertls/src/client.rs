//! Client configuration.

use ambertls_core::cipher::CipherSuite;
use ambertls_core::keylog::KeyLog;
use ambertls_core::psk::{PskKeyExchangeMode, TicketStore};
use ambertls_core::verifier::CertificateVerifier;
use ambertls_core::{Error, Result};
use ambertls_crypto::{CryptoProvider, KeyExchangeAlgorithm, SignatureScheme};
use std::sync::{Arc, Mutex};

/// Client-side configuration.
///
/// Cheap to clone; the ticket store, verifier and key log are shared.
#[derive(Clone)]
pub struct ClientConfig {
    /// Crypto provider backing all operations
    pub provider: Arc<dyn CryptoProvider>,

    /// Certificate verifier
    pub verifier: Arc<dyn CertificateVerifier>,

    /// Cipher suites in preference order
    pub cipher_suites: Vec<CipherSuite>,

    /// Key exchange groups in preference order
    pub groups: Vec<KeyExchangeAlgorithm>,

    /// Groups to generate key shares for; `None` shares every group
    pub key_share_groups: Option<Vec<KeyExchangeAlgorithm>>,

    /// Signature schemes accepted from the server
    pub signature_schemes: Vec<SignatureScheme>,

    /// ALPN protocols to offer
    pub alpn_protocols: Vec<String>,

    /// record_size_limit to advertise
    pub record_size_limit: Option<u16>,

    /// Offer a stored ticket when one exists for the server
    pub offer_psk: bool,

    /// PSK modes offered with a ticket
    pub psk_modes: Vec<PskKeyExchangeMode>,

    /// 0-RTT payload for the first flight (requires a fresh ticket that
    /// permits early data)
    pub early_data: Option<Vec<u8>>,

    /// Session ticket store, shared across connections
    pub ticket_store: Arc<Mutex<TicketStore>>,

    /// NSS key-log hook
    pub key_log: Option<Arc<dyn KeyLog>>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("cipher_suites", &self.cipher_suites)
            .field("groups", &self.groups)
            .field("offer_psk", &self.offer_psk)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Create a configuration builder.
    pub fn builder(
        provider: Arc<dyn CryptoProvider>,
        verifier: Arc<dyn CertificateVerifier>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                provider,
                verifier,
                cipher_suites: ambertls_core::cipher::DEFAULT_CIPHER_SUITES.to_vec(),
                groups: vec![KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1],
                key_share_groups: None,
                signature_schemes: vec![
                    SignatureScheme::EcdsaSecp256r1Sha256,
                    SignatureScheme::EcdsaSecp384r1Sha384,
                    SignatureScheme::RsaPssRsaeSha256,
                ],
                alpn_protocols: Vec::new(),
                record_size_limit: None,
                offer_psk: true,
                psk_modes: vec![PskKeyExchangeMode::PskDheKe, PskKeyExchangeMode::PskKe],
                early_data: None,
                ticket_store: Arc::new(Mutex::new(TicketStore::new())),
                key_log: None,
            },
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
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

    /// Generate key shares only for `groups` (a subset of the offered
    /// groups), trading a possible HelloRetryRequest for a smaller
    /// first flight.
    pub fn with_key_share_groups(mut self, groups: &[KeyExchangeAlgorithm]) -> Self {
        self.config.key_share_groups = Some(groups.to_vec());
        self
    }

    /// Set the acceptable signature schemes.
    pub fn with_signature_schemes(mut self, schemes: &[SignatureScheme]) -> Self {
        self.config.signature_schemes = schemes.to_vec();
        self
    }

    /// Set the ALPN protocols to offer.
    pub fn with_alpn_protocols(mut self, protocols: &[&str]) -> Self {
        self.config.alpn_protocols = protocols.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Advertise a record_size_limit.
    pub fn with_record_size_limit(mut self, limit: u16) -> Self {
        self.config.record_size_limit = Some(limit);
        self
    }

    /// Enable or disable offering stored tickets.
    pub fn with_session_resumption(mut self, enable: bool) -> Self {
        self.config.offer_psk = enable;
        self
    }

    /// Send `payload` as 0-RTT data when resuming with a ticket that
    /// permits it.
    pub fn with_early_data(mut self, payload: Vec<u8>) -> Self {
        self.config.early_data = Some(payload);
        self
    }

    /// Share an existing ticket store.
    pub fn with_ticket_store(mut self, store: Arc<Mutex<TicketStore>>) -> Self {
        self.config.ticket_store = store;
        self
    }

    /// Install an NSS key-log hook.
    pub fn with_key_log(mut self, key_log: Arc<dyn KeyLog>) -> Self {
        self.config.key_log = Some(key_log);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClientConfig> {
        if self.config.cipher_suites.is_empty() {
            return Err(Error::InvalidConfig("no cipher suites".to_string()));
        }
        if self.config.groups.is_empty() {
            return Err(Error::InvalidConfig("no key exchange groups".to_string()));
        }
        if self.config.early_data.is_some() && !self.config.offer_psk {
            return Err(Error::InvalidConfig(
                "early data requires session resumption".to_string(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::NoVerification;
    use ambertls_crypto_rustcrypto::RustCryptoProvider;

    fn builder() -> ClientConfigBuilder {
        ClientConfig::builder(Arc::new(RustCryptoProvider::new()), Arc::new(NoVerification))
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.cipher_suites.len(), 3);
        assert_eq!(config.groups.len(), 2);
        assert!(config.offer_psk);
        assert!(config.early_data.is_none());
    }

    #[test]
    fn test_validation() {
        assert!(builder().with_cipher_suites(&[]).build().is_err());
        assert!(builder()
            .with_session_resumption(false)
            .with_early_data(b"ping".to_vec())
            .build()
            .is_err());
    }

    #[test]
    fn test_alpn_and_limits() {
        let config = builder()
            .with_alpn_protocols(&["h2", "http/1.1"])
            .with_record_size_limit(4096)
            .build()
            .unwrap();
        assert_eq!(config.alpn_protocols, vec!["h2", "http/1.1"]);
        assert_eq!(config.record_size_limit, Some(4096));
    }
}
