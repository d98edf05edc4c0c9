//! TLS 1.3 Key Schedule (RFC 8446 Section 7.1).
//!
//! ```text
//!              0
//!              |
//!              v
//!   PSK ->  HKDF-Extract = Early Secret
//!              |
//!              +--> Derive-Secret(., "ext binder" | "res binder", "")
//!              |                  = binder_key
//!              +--> Derive-Secret(., "c e traffic", ClientHello)
//!              |                  = client_early_traffic_secret
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!   (EC)DHE -> HKDF-Extract = Handshake Secret
//!              |
//!              +--> Derive-Secret(., "c hs traffic", CH..SH)
//!              +--> Derive-Secret(., "s hs traffic", CH..SH)
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!   0 -> HKDF-Extract = Master Secret
//!              |
//!              +--> Derive-Secret(., "c ap traffic", CH..server Finished)
//!              +--> Derive-Secret(., "s ap traffic", CH..server Finished)
//!              +--> Derive-Secret(., "exp master",   CH..server Finished)
//!              +--> Derive-Secret(., "res master",   CH..client Finished)
//! ```
//!
//! Secrets are held as a linear progression of owned stages; each stage
//! is consumed (and zeroized) when the next one is derived, so handshake
//! traffic secrets stay available for Finished computation while earlier
//! stages are already gone.

use crate::cipher::CipherSuite;
use crate::error::{Error, Result};
use crate::transcript::{derive_secret, empty_hash, hkdf_expand_label};
use ambertls_crypto::{CryptoProvider, HashAlgorithm};
use zeroize::Zeroizing;

/// Which binder key to derive from the early secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderKind {
    /// "ext binder" - externally provisioned PSKs
    External,
    /// "res binder" - PSKs from NewSessionTicket resumption
    Resumption,
}

impl BinderKind {
    const fn label(self) -> &'static [u8] {
        match self {
            BinderKind::External => b"ext binder",
            BinderKind::Resumption => b"res binder",
        }
    }
}

/// TLS 1.3 key schedule for one connection.
pub struct KeySchedule {
    cipher_suite: CipherSuite,
    hash_algorithm: HashAlgorithm,
    hash_len: usize,

    early_secret: Option<Zeroizing<Vec<u8>>>,
    handshake_secret: Option<Zeroizing<Vec<u8>>>,
    master_secret: Option<Zeroizing<Vec<u8>>>,

    client_early_traffic_secret: Option<Zeroizing<Vec<u8>>>,
    client_handshake_traffic_secret: Option<Zeroizing<Vec<u8>>>,
    server_handshake_traffic_secret: Option<Zeroizing<Vec<u8>>>,
    client_application_traffic_secret: Option<Zeroizing<Vec<u8>>>,
    server_application_traffic_secret: Option<Zeroizing<Vec<u8>>>,
    exporter_master_secret: Option<Zeroizing<Vec<u8>>>,
    resumption_master_secret: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySchedule")
            .field("cipher_suite", &self.cipher_suite)
            .field("secrets", &"<redacted>")
            .finish()
    }
}

impl KeySchedule {
    /// Create a new key schedule for the given cipher suite.
    pub fn new(cipher_suite: CipherSuite) -> Self {
        Self {
            cipher_suite,
            hash_algorithm: cipher_suite.hash_algorithm(),
            hash_len: cipher_suite.hash_len(),
            early_secret: None,
            handshake_secret: None,
            master_secret: None,
            client_early_traffic_secret: None,
            client_handshake_traffic_secret: None,
            server_handshake_traffic_secret: None,
            client_application_traffic_secret: None,
            server_application_traffic_secret: None,
            exporter_master_secret: None,
            resumption_master_secret: None,
        }
    }

    /// Get the cipher suite this schedule derives for.
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Initialize the early secret: `HKDF-Extract(0, PSK)`.
    ///
    /// With no PSK, a hash-length block of zeros is extracted instead.
    pub fn init_early_secret(
        &mut self,
        provider: &dyn CryptoProvider,
        psk: Option<&[u8]>,
    ) -> Result<()> {
        let kdf = provider.kdf(self.hash_algorithm.to_kdf_algorithm())?;
        let zeros = vec![0u8; self.hash_len];
        let ikm = psk.unwrap_or(zeros.as_slice());
        let early_secret = kdf.extract(&zeros, ikm);
        self.early_secret = Some(Zeroizing::new(early_secret));
        Ok(())
    }

    /// Derive the binder key: `Derive-Secret(early_secret, label, "")`.
    pub fn derive_binder_key(
        &self,
        provider: &dyn CryptoProvider,
        kind: BinderKind,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let early = self
            .early_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("early secret not initialized".to_string()))?;
        let context = empty_hash(provider, self.hash_algorithm)?;
        Ok(Zeroizing::new(derive_secret(
            provider,
            self.hash_algorithm,
            early,
            kind.label(),
            &context,
        )?))
    }

    /// Derive the client early traffic secret from the ClientHello
    /// transcript hash (0-RTT).
    pub fn derive_client_early_traffic_secret(
        &mut self,
        provider: &dyn CryptoProvider,
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>> {
        let early = self
            .early_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("early secret not initialized".to_string()))?;
        let secret = derive_secret(
            provider,
            self.hash_algorithm,
            early,
            b"c e traffic",
            transcript_hash,
        )?;
        self.client_early_traffic_secret = Some(Zeroizing::new(secret.clone()));
        Ok(secret)
    }

    /// Advance to the handshake secret: the early stage is consumed.
    ///
    /// `shared_secret` is the ECDHE output, or `None` in a PSK-only
    /// handshake (a zero block is extracted instead).
    pub fn derive_handshake_secret(
        &mut self,
        provider: &dyn CryptoProvider,
        shared_secret: Option<&[u8]>,
    ) -> Result<()> {
        let early = self
            .early_secret
            .take()
            .ok_or_else(|| Error::InternalError("early secret not initialized".to_string()))?;

        let kdf = provider.kdf(self.hash_algorithm.to_kdf_algorithm())?;
        let context = empty_hash(provider, self.hash_algorithm)?;
        let salt = derive_secret(provider, self.hash_algorithm, &early, b"derived", &context)?;

        let zeros = vec![0u8; self.hash_len];
        let ikm = shared_secret.unwrap_or(zeros.as_slice());
        let handshake_secret = kdf.extract(&salt, ikm);

        self.handshake_secret = Some(Zeroizing::new(handshake_secret));
        Ok(())
    }

    /// Derive both handshake traffic secrets from the CH..SH transcript.
    ///
    /// Returns `(client, server)` secrets.
    pub fn derive_handshake_traffic_secrets(
        &mut self,
        provider: &dyn CryptoProvider,
        transcript_hash: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let handshake = self
            .handshake_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("handshake secret not initialized".to_string()))?;

        let client = derive_secret(
            provider,
            self.hash_algorithm,
            handshake,
            b"c hs traffic",
            transcript_hash,
        )?;
        let server = derive_secret(
            provider,
            self.hash_algorithm,
            handshake,
            b"s hs traffic",
            transcript_hash,
        )?;

        self.client_handshake_traffic_secret = Some(Zeroizing::new(client.clone()));
        self.server_handshake_traffic_secret = Some(Zeroizing::new(server.clone()));
        Ok((client, server))
    }

    /// Advance to the master secret: the handshake stage is consumed,
    /// but the handshake traffic secrets stay available for Finished.
    pub fn derive_master_secret(&mut self, provider: &dyn CryptoProvider) -> Result<()> {
        let handshake = self
            .handshake_secret
            .take()
            .ok_or_else(|| Error::InternalError("handshake secret not initialized".to_string()))?;

        let kdf = provider.kdf(self.hash_algorithm.to_kdf_algorithm())?;
        let context = empty_hash(provider, self.hash_algorithm)?;
        let salt = derive_secret(provider, self.hash_algorithm, &handshake, b"derived", &context)?;

        let zeros = vec![0u8; self.hash_len];
        let master_secret = kdf.extract(&salt, &zeros);

        self.master_secret = Some(Zeroizing::new(master_secret));
        Ok(())
    }

    /// Derive both application traffic secrets and the exporter master
    /// secret from the CH..server Finished transcript.
    ///
    /// Returns `(client, server)` application traffic secrets.
    pub fn derive_application_traffic_secrets(
        &mut self,
        provider: &dyn CryptoProvider,
        transcript_hash: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let master = self
            .master_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("master secret not initialized".to_string()))?;

        let client = derive_secret(
            provider,
            self.hash_algorithm,
            master,
            b"c ap traffic",
            transcript_hash,
        )?;
        let server = derive_secret(
            provider,
            self.hash_algorithm,
            master,
            b"s ap traffic",
            transcript_hash,
        )?;
        let exporter = derive_secret(
            provider,
            self.hash_algorithm,
            master,
            b"exp master",
            transcript_hash,
        )?;

        self.client_application_traffic_secret = Some(Zeroizing::new(client.clone()));
        self.server_application_traffic_secret = Some(Zeroizing::new(server.clone()));
        self.exporter_master_secret = Some(Zeroizing::new(exporter));
        Ok((client, server))
    }

    /// Derive the resumption master secret from the CH..client Finished
    /// transcript. The master stage is consumed.
    pub fn derive_resumption_master_secret(
        &mut self,
        provider: &dyn CryptoProvider,
        transcript_hash: &[u8],
    ) -> Result<()> {
        let master = self
            .master_secret
            .take()
            .ok_or_else(|| Error::InternalError("master secret not initialized".to_string()))?;

        let secret = derive_secret(
            provider,
            self.hash_algorithm,
            &master,
            b"res master",
            transcript_hash,
        )?;
        self.resumption_master_secret = Some(Zeroizing::new(secret));
        Ok(())
    }

    /// Derive `(key, iv)` for a traffic secret.
    ///
    /// `key = HKDF-Expand-Label(secret, "key", "", key_length)` and
    /// `iv = HKDF-Expand-Label(secret, "iv", "", 12)`.
    pub fn derive_traffic_keys(
        &self,
        provider: &dyn CryptoProvider,
        traffic_secret: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)> {
        derive_traffic_keys(provider, self.cipher_suite, traffic_secret)
    }

    /// Rotate a traffic secret for KeyUpdate:
    /// `secret' = HKDF-Expand-Label(secret, "traffic upd", "", Hash.length)`.
    pub fn next_traffic_secret(
        &self,
        provider: &dyn CryptoProvider,
        traffic_secret: &[u8],
    ) -> Result<Vec<u8>> {
        hkdf_expand_label(
            provider,
            self.hash_algorithm,
            traffic_secret,
            b"traffic upd",
            &[],
            self.hash_len,
        )
    }

    /// Derive the PSK for a session ticket:
    /// `HKDF-Expand-Label(resumption_master_secret, "resumption",
    /// ticket_nonce, Hash.length)`.
    pub fn derive_ticket_psk(
        &self,
        provider: &dyn CryptoProvider,
        ticket_nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let resumption = self.resumption_master_secret.as_ref().ok_or_else(|| {
            Error::InternalError("resumption master secret not derived".to_string())
        })?;
        Ok(Zeroizing::new(hkdf_expand_label(
            provider,
            self.hash_algorithm,
            resumption,
            b"resumption",
            ticket_nonce,
            self.hash_len,
        )?))
    }

    /// Exported keying material (RFC 8446 Section 7.5).
    ///
    /// ```text
    /// TLS-Exporter(label, context, length) =
    ///     HKDF-Expand-Label(Derive-Secret(Secret, label, ""),
    ///                       "exporter", Hash(context), length)
    /// ```
    pub fn export_keying_material(
        &self,
        provider: &dyn CryptoProvider,
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>> {
        let exporter = self
            .exporter_master_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("exporter secret not derived".to_string()))?;

        let context_hash = {
            let mut hasher = provider.hash(self.hash_algorithm)?;
            hasher.update(context);
            hasher.finalize()
        };
        let empty = empty_hash(provider, self.hash_algorithm)?;
        let labeled = derive_secret(provider, self.hash_algorithm, exporter, label, &empty)?;
        hkdf_expand_label(
            provider,
            self.hash_algorithm,
            &labeled,
            b"exporter",
            &context_hash,
            length,
        )
    }

    /// Get the client early traffic secret (0-RTT).
    pub fn client_early_traffic_secret(&self) -> Option<&[u8]> {
        self.client_early_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// Get the client handshake traffic secret.
    pub fn client_handshake_traffic_secret(&self) -> Option<&[u8]> {
        self.client_handshake_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// Get the server handshake traffic secret.
    pub fn server_handshake_traffic_secret(&self) -> Option<&[u8]> {
        self.server_handshake_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// Get the client application traffic secret.
    pub fn client_application_traffic_secret(&self) -> Option<&[u8]> {
        self.client_application_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// Get the server application traffic secret.
    pub fn server_application_traffic_secret(&self) -> Option<&[u8]> {
        self.server_application_traffic_secret.as_deref().map(Vec::as_slice)
    }

    /// Get the resumption master secret.
    pub fn resumption_master_secret(&self) -> Option<&[u8]> {
        self.resumption_master_secret.as_deref().map(Vec::as_slice)
    }

    /// Drop the handshake traffic secrets once Finished on both sides
    /// has been processed.
    pub fn discard_handshake_traffic_secrets(&mut self) {
        self.client_handshake_traffic_secret = None;
        self.server_handshake_traffic_secret = None;
        self.client_early_traffic_secret = None;
    }
}

/// Derive `(key, iv)` for a traffic secret without a full schedule.
///
/// Shared with the record layer's KeyUpdate rotation path.
pub fn derive_traffic_keys(
    provider: &dyn CryptoProvider,
    cipher_suite: CipherSuite,
    traffic_secret: &[u8],
) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)> {
    let algorithm = cipher_suite.hash_algorithm();
    let key = hkdf_expand_label(
        provider,
        algorithm,
        traffic_secret,
        b"key",
        &[],
        cipher_suite.key_length(),
    )?;
    let iv = hkdf_expand_label(
        provider,
        algorithm,
        traffic_secret,
        b"iv",
        &[],
        cipher_suite.iv_length(),
    )?;
    Ok((Zeroizing::new(key), Zeroizing::new(iv)))
}
