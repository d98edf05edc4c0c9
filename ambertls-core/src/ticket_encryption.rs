//! Server-side opaque session tickets (RFC 8446 Section 4.6.1).
//!
//! Tickets are AES-256-GCM-sealed state under a process-wide ticket
//! key, so the server stays stateless per connection. The plaintext
//! payload binds everything needed to resume:
//!
//! ```text
//! struct TicketPayload {
//!     cipher_suite: u16,
//!     issued_at: u64,            // UNIX seconds
//!     lifetime: u32,             // seconds
//!     ticket_age_add: u32,
//!     max_early_data_size: u32,
//!     nonce_len: u8, ticket_nonce,
//!     secret_len: u8, resumption_master_secret,
//! }
//! ```
//!
//! The wire form is `key_id || gcm_nonce || sealed_payload`; the key id
//! byte lets the server rotate keys while still accepting tickets
//! sealed under the previous one.

use crate::cipher::CipherSuite;
use crate::codec::Reader;
use crate::error::{Error, Result};
use ambertls_crypto::{AeadAlgorithm, CryptoProvider};
use bytes::{BufMut, BytesMut};
use rand::RngCore;
use zeroize::Zeroizing;

/// Ticket sealing key size (AES-256).
pub const TICKET_KEY_SIZE: usize = 32;

const GCM_NONCE_SIZE: usize = 12;

/// The resumption state a ticket carries.
#[derive(Clone)]
pub struct TicketState {
    /// Cipher suite of the original connection
    pub cipher_suite: CipherSuite,

    /// When the ticket was minted (UNIX seconds)
    pub issued_at: u64,

    /// Lifetime in seconds
    pub lifetime: u32,

    /// Obfuscation value for the client's ticket age
    pub ticket_age_add: u32,

    /// Early data budget; zero disables 0-RTT for this ticket
    pub max_early_data_size: u32,

    /// Nonce fed into the PSK derivation
    pub ticket_nonce: Vec<u8>,

    /// Resumption master secret of the original connection
    pub resumption_master_secret: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketState")
            .field("cipher_suite", &self.cipher_suite)
            .field("issued_at", &self.issued_at)
            .field("lifetime", &self.lifetime)
            .field("resumption_master_secret", &"<redacted>")
            .finish()
    }
}

impl TicketState {
    fn encode(&self) -> Result<Zeroizing<Vec<u8>>> {
        if self.ticket_nonce.len() > 255 || self.resumption_master_secret.len() > 255 {
            return Err(Error::InternalError("ticket field too long".to_string()));
        }
        let mut buf = BytesMut::new();
        buf.put_u16(self.cipher_suite.to_u16());
        buf.put_u64(self.issued_at);
        buf.put_u32(self.lifetime);
        buf.put_u32(self.ticket_age_add);
        buf.put_u32(self.max_early_data_size);
        buf.put_u8(self.ticket_nonce.len() as u8);
        buf.put_slice(&self.ticket_nonce);
        buf.put_u8(self.resumption_master_secret.len() as u8);
        buf.put_slice(&self.resumption_master_secret);
        Ok(Zeroizing::new(buf.to_vec()))
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let suite_raw = reader.take_u16()?;
        let cipher_suite = CipherSuite::from_u16(suite_raw)
            .ok_or_else(|| Error::DecodeError("ticket names unknown cipher suite".into()))?;
        let issued_at = u64::from_be_bytes(reader.take(8)?.try_into().unwrap());
        let lifetime = reader.take_u32()?;
        let ticket_age_add = reader.take_u32()?;
        let max_early_data_size = reader.take_u32()?;
        let ticket_nonce = reader.take_vec8()?.to_vec();
        let resumption_master_secret = Zeroizing::new(reader.take_vec8()?.to_vec());
        reader.expect_end("ticket payload")?;

        Ok(Self {
            cipher_suite,
            issued_at,
            lifetime,
            ticket_age_add,
            max_early_data_size,
            ticket_nonce,
            resumption_master_secret,
        })
    }
}

/// One ticket sealing key.
#[derive(Clone)]
pub struct TicketKey {
    /// Key id carried in the ticket's first byte
    pub key_id: u8,

    key: Zeroizing<[u8; TICKET_KEY_SIZE]>,
}

impl std::fmt::Debug for TicketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketKey")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl TicketKey {
    /// Create a key with fresh random material.
    pub fn generate(key_id: u8) -> Self {
        let mut key = [0u8; TICKET_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self {
            key_id,
            key: Zeroizing::new(key),
        }
    }

    /// Create a key from existing material.
    pub fn from_bytes(key_id: u8, key: [u8; TICKET_KEY_SIZE]) -> Self {
        Self {
            key_id,
            key: Zeroizing::new(key),
        }
    }
}

/// Seals and opens opaque tickets under rotating keys.
///
/// The server keeps the current key for sealing and the previous key
/// for opening tickets minted just before a rotation. Access is
/// serialized by the caller (one encryptor per process behind a lock).
#[derive(Debug)]
pub struct TicketEncryptor {
    current: TicketKey,
    previous: Option<TicketKey>,
}

impl TicketEncryptor {
    /// Create an encryptor with a fresh random key.
    pub fn new() -> Self {
        Self {
            current: TicketKey::generate(0),
            previous: None,
        }
    }

    /// Create an encryptor from an existing key.
    pub fn with_key(key: TicketKey) -> Self {
        Self {
            current: key,
            previous: None,
        }
    }

    /// Rotate to a fresh key, keeping the old one for opening.
    pub fn rotate(&mut self) {
        let next_id = self.current.key_id.wrapping_add(1);
        self.previous = Some(self.current.clone());
        self.current = TicketKey::generate(next_id);
    }

    /// Seal `state` into an opaque ticket.
    pub fn seal(&self, provider: &dyn CryptoProvider, state: &TicketState) -> Result<Vec<u8>> {
        let payload = state.encode()?;

        let mut nonce = [0u8; GCM_NONCE_SIZE];
        provider.random().fill(&mut nonce)?;

        let aead = provider.aead(AeadAlgorithm::Aes256Gcm)?;
        let aad = [self.current.key_id];
        let sealed = aead.seal(self.current.key.as_slice(), &nonce, &aad, &payload)?;

        let mut ticket = Vec::with_capacity(1 + GCM_NONCE_SIZE + sealed.len());
        ticket.push(self.current.key_id);
        ticket.extend_from_slice(&nonce);
        ticket.extend_from_slice(&sealed);
        Ok(ticket)
    }

    /// Open an opaque ticket. Unknown key ids and failed opens report
    /// an unknown PSK identity; the server then falls back to a full
    /// handshake rather than failing the connection.
    pub fn open(&self, provider: &dyn CryptoProvider, ticket: &[u8]) -> Result<TicketState> {
        if ticket.len() < 1 + GCM_NONCE_SIZE + 16 {
            return Err(Error::DecodeError("ticket too short".into()));
        }

        let key_id = ticket[0];
        let key = if key_id == self.current.key_id {
            &self.current
        } else {
            match &self.previous {
                Some(previous) if previous.key_id == key_id => previous,
                _ => {
                    return Err(Error::DecodeError(format!(
                        "ticket sealed under unknown key {}",
                        key_id
                    )))
                }
            }
        };

        let nonce = &ticket[1..1 + GCM_NONCE_SIZE];
        let sealed = &ticket[1 + GCM_NONCE_SIZE..];
        let aad = [key_id];
        let aead = provider.aead(AeadAlgorithm::Aes256Gcm)?;
        let payload = Zeroizing::new(
            aead.open(key.key.as_slice(), nonce, &aad, sealed)
                .map_err(|_| Error::DecodeError("ticket does not authenticate".into()))?,
        );

        TicketState::decode(&payload)
    }
}

impl Default for TicketEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambertls_crypto_rustcrypto::RustCryptoProvider;

    fn state() -> TicketState {
        TicketState {
            cipher_suite: CipherSuite::Aes128GcmSha256,
            issued_at: 1_700_000_000,
            lifetime: 7200,
            ticket_age_add: 0xC0FFEE00,
            max_early_data_size: 16384,
            ticket_nonce: vec![0, 0, 0, 0, 0, 0, 0, 1],
            resumption_master_secret: Zeroizing::new(vec![0x42; 32]),
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let provider = RustCryptoProvider::new();
        let encryptor = TicketEncryptor::new();

        let ticket = encryptor.seal(&provider, &state()).unwrap();
        let opened = encryptor.open(&provider, &ticket).unwrap();

        assert_eq!(opened.cipher_suite, CipherSuite::Aes128GcmSha256);
        assert_eq!(opened.issued_at, 1_700_000_000);
        assert_eq!(opened.lifetime, 7200);
        assert_eq!(opened.ticket_age_add, 0xC0FFEE00);
        assert_eq!(opened.max_early_data_size, 16384);
        assert_eq!(opened.resumption_master_secret.as_slice(), &[0x42; 32]);
    }

    #[test]
    fn test_tickets_are_opaque_and_distinct() {
        let provider = RustCryptoProvider::new();
        let encryptor = TicketEncryptor::new();
        let a = encryptor.seal(&provider, &state()).unwrap();
        let b = encryptor.seal(&provider, &state()).unwrap();
        // Fresh GCM nonce per seal; identical state never repeats bytes.
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ticket_rejected() {
        let provider = RustCryptoProvider::new();
        let encryptor = TicketEncryptor::new();
        let mut ticket = encryptor.seal(&provider, &state()).unwrap();
        let last = ticket.len() - 1;
        ticket[last] ^= 1;
        assert!(encryptor.open(&provider, &ticket).is_err());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let provider = RustCryptoProvider::new();
        let minter = TicketEncryptor::new();
        let other = TicketEncryptor::new();
        let ticket = minter.seal(&provider, &state()).unwrap();
        assert!(other.open(&provider, &ticket).is_err());
    }

    #[test]
    fn test_rotation_keeps_previous_key() {
        let provider = RustCryptoProvider::new();
        let mut encryptor = TicketEncryptor::new();
        let old_ticket = encryptor.seal(&provider, &state()).unwrap();

        encryptor.rotate();
        let new_ticket = encryptor.seal(&provider, &state()).unwrap();
        assert_ne!(old_ticket[0], new_ticket[0]);

        // Both generations open after one rotation.
        encryptor.open(&provider, &old_ticket).unwrap();
        encryptor.open(&provider, &new_ticket).unwrap();

        // A second rotation drops the oldest key.
        encryptor.rotate();
        assert!(encryptor.open(&provider, &old_ticket).is_err());
        encryptor.open(&provider, &new_ticket).unwrap();
    }
}
