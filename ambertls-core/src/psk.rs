//! Pre-shared keys and session resumption (RFC 8446 Sections 4.2.9,
//! 4.2.11, 4.6.1).
//!
//! ```text
//! Initial Connection:
//!   ClientHello           -------->
//!                         <--------        ServerHello ... Finished
//!   Finished              -------->
//!                         <--------       [NewSessionTicket]
//!
//! Resumed Connection:
//!   ClientHello
//!     + psk_key_exchange_modes
//!     + pre_shared_key      -------->
//!                           <--------  ServerHello + pre_shared_key
//! ```
//!
//! The binder at the end of ClientHello commits the hello to one PSK
//! identity; it is an HMAC under a key derived from the early secret,
//! computed over the hello truncated just before the binder list.

use crate::cipher::CipherSuite;
use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::key_schedule::BinderKind;
use crate::transcript::{compute_verify_data, TranscriptHash};
use ambertls_crypto::CryptoProvider;
use zeroize::Zeroizing;

/// Default ticket lifetime (7 days, the RFC 8446 maximum).
pub const DEFAULT_TICKET_LIFETIME: u32 = 7 * 24 * 60 * 60;

/// Permitted clock skew when judging ticket age for 0-RTT acceptance.
pub const TICKET_AGE_TOLERANCE_SECS: u64 = 10;

/// PSK key exchange mode (RFC 8446 Section 4.2.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PskKeyExchangeMode {
    /// PSK-only key exchange, no (EC)DHE
    PskKe = 0,

    /// PSK with (EC)DHE key exchange
    PskDheKe = 1,
}

impl PskKeyExchangeMode {
    /// Convert from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PskKeyExchangeMode::PskKe),
            1 => Some(PskKeyExchangeMode::PskDheKe),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// One PSK identity offered in ClientHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskIdentity {
    /// Opaque ticket bytes
    pub identity: Vec<u8>,

    /// `(age_ms + ticket_age_add) mod 2^32`
    pub obfuscated_ticket_age: u32,
}

impl PskIdentity {
    /// Encode to wire format.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.identity.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.identity);
        buf.extend_from_slice(&self.obfuscated_ticket_age.to_be_bytes());
    }

    /// Decode from a reader.
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let identity = reader.take_vec16()?.to_vec();
        let obfuscated_ticket_age = reader.take_u32()?;
        Ok(Self {
            identity,
            obfuscated_ticket_age,
        })
    }
}

/// The pre_shared_key offer carried in ClientHello.
///
/// Identities and binders are parallel lists; the extension MUST be the
/// last one in the hello because the binders cover everything before
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreSharedKeyOffer {
    /// PSK identities, in preference order
    pub identities: Vec<PskIdentity>,

    /// One binder per identity
    pub binders: Vec<Vec<u8>>,
}

impl PreSharedKeyOffer {
    /// Encode to extension payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut identities = Vec::new();
        for identity in &self.identities {
            identity.encode(&mut identities);
        }

        let mut binders = Vec::new();
        for binder in &self.binders {
            binders.push(binder.len() as u8);
            binders.extend_from_slice(binder);
        }

        let mut buf = Vec::with_capacity(4 + identities.len() + binders.len());
        buf.extend_from_slice(&(identities.len() as u16).to_be_bytes());
        buf.extend_from_slice(&identities);
        buf.extend_from_slice(&(binders.len() as u16).to_be_bytes());
        buf.extend_from_slice(&binders);
        buf
    }

    /// Length in bytes of the encoded binder list (including its
    /// two-byte length prefix). The ClientHello truncated for binder
    /// computation ends exactly this many bytes early.
    pub fn binders_encoded_len(&self) -> usize {
        2 + self.binders.iter().map(|b| 1 + b.len()).sum::<usize>()
    }

    /// Decode from extension payload bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let mut identities = Vec::new();
        let mut identities_reader = reader.sub_reader16()?;
        while !identities_reader.is_empty() {
            identities.push(PskIdentity::decode(&mut identities_reader)?);
        }

        let mut binders = Vec::new();
        let mut binders_reader = reader.sub_reader16()?;
        while !binders_reader.is_empty() {
            binders.push(binders_reader.take_vec8()?.to_vec());
        }
        reader.expect_end("pre_shared_key")?;

        if identities.is_empty() {
            return Err(Error::DecodeError("pre_shared_key offers no identity".into()));
        }
        if identities.len() != binders.len() {
            return Err(Error::IllegalParameter(
                "identity and binder counts differ".to_string(),
            ));
        }

        Ok(Self { identities, binders })
    }
}

/// Compute the binder for a PSK over the truncated ClientHello.
///
/// `transcript` holds any messages preceding the hello (after a
/// HelloRetryRequest: the synthetic message_hash and the HRR);
/// `truncated_hello` is the encoded hello handshake message up to but
/// not including the binder list.
pub fn compute_binder(
    provider: &dyn CryptoProvider,
    psk: &[u8],
    cipher_suite: CipherSuite,
    kind: BinderKind,
    transcript: &TranscriptHash,
    truncated_hello: &[u8],
) -> Result<Vec<u8>> {
    let mut schedule = crate::key_schedule::KeySchedule::new(cipher_suite);
    schedule.init_early_secret(provider, Some(psk))?;
    let binder_key = schedule.derive_binder_key(provider, kind)?;

    let transcript_hash = transcript.hash_with(provider, truncated_hello)?;
    compute_verify_data(
        provider,
        cipher_suite.hash_algorithm(),
        &binder_key,
        &transcript_hash,
    )
}

/// A ticket stored on the client for resumption.
#[derive(Clone)]
pub struct StoredTicket {
    /// Opaque ticket from NewSessionTicket
    pub ticket: Vec<u8>,

    /// PSK derived from the resumption master secret and ticket nonce
    pub psk: Zeroizing<Vec<u8>>,

    /// Cipher suite of the original connection
    pub cipher_suite: CipherSuite,

    /// Ticket age obfuscation value
    pub ticket_age_add: u32,

    /// When the ticket was received (seconds since UNIX epoch)
    pub received_at: u64,

    /// Ticket lifetime in seconds
    pub lifetime: u32,

    /// Maximum early data the server will accept under this ticket
    pub max_early_data_size: u32,
}

impl std::fmt::Debug for StoredTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTicket")
            .field("ticket_len", &self.ticket.len())
            .field("cipher_suite", &self.cipher_suite)
            .field("lifetime", &self.lifetime)
            .field("psk", &"<redacted>")
            .finish()
    }
}

impl StoredTicket {
    /// Check if the ticket is still within its lifetime.
    pub fn is_valid(&self, now: u64) -> bool {
        let age = now.saturating_sub(self.received_at);
        age < self.lifetime.min(DEFAULT_TICKET_LIFETIME) as u64
    }

    /// Obfuscated age in milliseconds for the PSK identity.
    pub fn obfuscated_age(&self, now: u64) -> u32 {
        let age_ms = now.saturating_sub(self.received_at).saturating_mul(1000) as u32;
        age_ms.wrapping_add(self.ticket_age_add)
    }
}

/// Client-side ticket store keyed by (server name, cipher suite).
///
/// At most one ticket is kept per key; a newer ticket replaces the old
/// one, and taking a ticket removes it so each is offered once.
#[derive(Debug, Default)]
pub struct TicketStore {
    entries: Vec<(String, CipherSuite, StoredTicket)>,
}

impl TicketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ticket for `server_name`, replacing any existing entry
    /// for the same server and suite.
    pub fn insert(&mut self, server_name: &str, ticket: StoredTicket) {
        let suite = ticket.cipher_suite;
        self.entries
            .retain(|(name, s, _)| !(name == server_name && *s == suite));
        self.entries.push((server_name.to_string(), suite, ticket));
    }

    /// Take a valid ticket for `server_name` usable with one of
    /// `suites`. The ticket is removed from the store.
    pub fn take(
        &mut self,
        server_name: &str,
        suites: &[CipherSuite],
        now: u64,
    ) -> Option<StoredTicket> {
        let position = self.entries.iter().position(|(name, suite, ticket)| {
            name == server_name && suites.contains(suite) && ticket.is_valid(now)
        })?;
        Some(self.entries.remove(position).2)
    }

    /// Number of stored tickets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambertls_crypto_rustcrypto::RustCryptoProvider;

    fn ticket(lifetime: u32, received_at: u64) -> StoredTicket {
        StoredTicket {
            ticket: vec![0xAB; 16],
            psk: Zeroizing::new(vec![0x11; 32]),
            cipher_suite: CipherSuite::Aes128GcmSha256,
            ticket_age_add: 0x55AA55AA,
            received_at,
            lifetime,
            max_early_data_size: 0,
        }
    }

    #[test]
    fn test_psk_offer_roundtrip() {
        let offer = PreSharedKeyOffer {
            identities: vec![PskIdentity {
                identity: vec![1, 2, 3, 4],
                obfuscated_ticket_age: 0xDEADBEEF,
            }],
            binders: vec![vec![0x42; 32]],
        };

        let encoded = offer.encode();
        let decoded = PreSharedKeyOffer::decode(&encoded).unwrap();
        assert_eq!(decoded, offer);
        assert_eq!(offer.binders_encoded_len(), 2 + 1 + 32);
    }

    #[test]
    fn test_psk_offer_mismatched_binders() {
        let offer = PreSharedKeyOffer {
            identities: vec![
                PskIdentity {
                    identity: vec![1],
                    obfuscated_ticket_age: 0,
                },
                PskIdentity {
                    identity: vec![2],
                    obfuscated_ticket_age: 0,
                },
            ],
            binders: vec![vec![0x42; 32]],
        };
        assert!(PreSharedKeyOffer::decode(&offer.encode()).is_err());
    }

    #[test]
    fn test_binder_depends_on_hello_and_psk() {
        let provider = RustCryptoProvider::new();
        let transcript = TranscriptHash::new(CipherSuite::Aes128GcmSha256.hash_algorithm());

        let binder = |psk: &[u8], hello: &[u8]| {
            compute_binder(
                &provider,
                psk,
                CipherSuite::Aes128GcmSha256,
                BinderKind::Resumption,
                &transcript,
                hello,
            )
            .unwrap()
        };

        let base = binder(&[0x11; 32], b"truncated hello");
        assert_eq!(base.len(), 32);
        assert_ne!(base, binder(&[0x22; 32], b"truncated hello"));
        assert_ne!(base, binder(&[0x11; 32], b"different hello"));
        assert_eq!(base, binder(&[0x11; 32], b"truncated hello"));
    }

    #[test]
    fn test_ticket_lifetime() {
        let t = ticket(60, 1000);
        assert!(t.is_valid(1000));
        assert!(t.is_valid(1059));
        assert!(!t.is_valid(1060));
    }

    #[test]
    fn test_obfuscated_age_wraps() {
        let t = ticket(3600, 1000);
        let age = t.obfuscated_age(1002);
        assert_eq!(age, 2000u32.wrapping_add(0x55AA55AA));
    }

    #[test]
    fn test_store_one_ticket_per_server_and_suite() {
        let mut store = TicketStore::new();
        store.insert("example.com", ticket(3600, 100));
        store.insert("example.com", ticket(3600, 200));
        assert_eq!(store.len(), 1);

        let taken = store
            .take("example.com", &[CipherSuite::Aes128GcmSha256], 300)
            .unwrap();
        assert_eq!(taken.received_at, 200);
        assert!(store.is_empty());

        // Taking removed it; a second resumption attempt has nothing.
        assert!(store
            .take("example.com", &[CipherSuite::Aes128GcmSha256], 300)
            .is_none());
    }

    #[test]
    fn test_store_filters_suite_and_expiry() {
        let mut store = TicketStore::new();
        store.insert("example.com", ticket(60, 100));
        assert!(store
            .take("example.com", &[CipherSuite::Aes256GcmSha384], 110)
            .is_none());
        assert!(store
            .take("example.com", &[CipherSuite::Aes128GcmSha256], 200)
            .is_none());
    }
}
