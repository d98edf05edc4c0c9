//! Record protection: AEAD encryption and decryption of TLS records
//! (RFC 8446 Section 5.2).
//!
//! The protected form is:
//!
//! ```text
//! struct {
//!     opaque content[TLSPlaintext.length];
//!     ContentType type;
//!     uint8 zeros[length_of_padding];
//! } TLSInnerPlaintext;
//!
//! struct {
//!     ContentType opaque_type = application_data; /* 23 */
//!     ProtocolVersion legacy_record_version = 0x0303;
//!     uint16 length;
//!     opaque encrypted_record[TLSCiphertext.length];
//! } TLSCiphertext;
//! ```
//!
//! The additional data is the five-byte record header; the per-record
//! nonce is the static IV XORed with the big-endian sequence number
//! (RFC 8446 Section 5.3).

use crate::cipher::CipherSuite;
use crate::error::{Error, Result};
use crate::key_schedule::derive_traffic_keys;
use crate::protocol::{ContentType, ProtocolVersion};
use crate::record::{MAX_CIPHERTEXT_SIZE, MAX_FRAGMENT_SIZE, RECORD_HEADER_SIZE, TlsPlaintext};
use ambertls_crypto::CryptoProvider;
use zeroize::Zeroizing;

/// Default record size limit: a full fragment plus the content type byte.
pub const DEFAULT_RECORD_SIZE_LIMIT: u16 = (MAX_FRAGMENT_SIZE as u16) + 1;

/// Protected TLS record.
#[derive(Debug, Clone)]
pub struct TlsCiphertext {
    /// Encrypted fragment (ciphertext plus tag)
    pub encrypted_record: Vec<u8>,
}

impl TlsCiphertext {
    /// Encode to wire format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.encrypted_record.len() > MAX_CIPHERTEXT_SIZE {
            return Err(Error::RecordOverflow);
        }
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + self.encrypted_record.len());
        buf.push(ContentType::ApplicationData.to_u8());
        buf.extend_from_slice(&ProtocolVersion::Tls12.to_u16().to_be_bytes());
        buf.extend_from_slice(&(self.encrypted_record.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.encrypted_record);
        Ok(buf)
    }

    /// The five-byte header, which doubles as the AEAD additional data.
    pub fn additional_data(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut ad = [0u8; RECORD_HEADER_SIZE];
        ad[0] = ContentType::ApplicationData.to_u8();
        ad[1..3].copy_from_slice(&ProtocolVersion::Tls12.to_u16().to_be_bytes());
        ad[3..5].copy_from_slice(&(self.encrypted_record.len() as u16).to_be_bytes());
        ad
    }
}

/// Per-direction record protection state.
///
/// Holds `(traffic_secret, key, iv, sequence_number)` for one direction.
/// Sequence numbers start at zero, increment per record and reset on key
/// update; they never wrap.
pub struct RecordProtection {
    cipher_suite: CipherSuite,
    traffic_secret: Zeroizing<Vec<u8>>,
    key: Zeroizing<Vec<u8>>,
    iv: Zeroizing<Vec<u8>>,
    sequence_number: u64,

    /// Peer's record_size_limit: cap on inner plaintext (content plus
    /// content-type byte plus padding).
    record_size_limit: u16,

    /// Zero padding appended to each outbound inner plaintext.
    padding_policy: usize,
}

impl std::fmt::Debug for RecordProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProtection")
            .field("cipher_suite", &self.cipher_suite)
            .field("sequence_number", &self.sequence_number)
            .field("key_material", &"<redacted>")
            .finish()
    }
}

impl RecordProtection {
    /// Install protection for one direction, deriving the key and IV
    /// from `traffic_secret`.
    pub fn new(
        provider: &dyn CryptoProvider,
        cipher_suite: CipherSuite,
        traffic_secret: &[u8],
    ) -> Result<Self> {
        let (key, iv) = derive_traffic_keys(provider, cipher_suite, traffic_secret)?;
        Ok(Self {
            cipher_suite,
            traffic_secret: Zeroizing::new(traffic_secret.to_vec()),
            key,
            iv,
            sequence_number: 0,
            record_size_limit: DEFAULT_RECORD_SIZE_LIMIT,
            padding_policy: 0,
        })
    }

    /// Set the peer's record_size_limit.
    pub fn set_record_size_limit(&mut self, limit: u16) {
        self.record_size_limit = limit.min(DEFAULT_RECORD_SIZE_LIMIT).max(64);
    }

    /// Set the number of zero padding bytes appended per record.
    pub fn set_padding(&mut self, padding: usize) {
        self.padding_policy = padding;
    }

    /// Largest content fragment that fits one record under the current
    /// size limit and padding policy.
    pub fn max_content_len(&self) -> usize {
        (self.record_size_limit as usize)
            .saturating_sub(1 + self.padding_policy)
            .max(1)
    }

    /// Get the current sequence number.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Get the traffic secret this direction currently uses.
    pub fn traffic_secret(&self) -> &[u8] {
        &self.traffic_secret
    }

    /// Encrypt one fragment into a protected record.
    pub fn encrypt(
        &mut self,
        provider: &dyn CryptoProvider,
        content_type: ContentType,
        fragment: &[u8],
    ) -> Result<TlsCiphertext> {
        // Inner plaintext: content || type || zero padding.
        let inner_len = fragment.len() + 1 + self.padding_policy;
        if inner_len > self.record_size_limit as usize {
            return Err(Error::InternalError(
                "fragment exceeds negotiated record size limit".to_string(),
            ));
        }
        let mut inner = Zeroizing::new(Vec::with_capacity(inner_len));
        inner.extend_from_slice(fragment);
        inner.push(content_type.to_u8());
        inner.resize(inner_len, 0);

        let aead = provider.aead(self.cipher_suite.aead_algorithm())?;
        let encrypted_length = inner.len() + aead.tag_size();
        if encrypted_length > MAX_CIPHERTEXT_SIZE {
            return Err(Error::RecordOverflow);
        }

        let mut ad = [0u8; RECORD_HEADER_SIZE];
        ad[0] = ContentType::ApplicationData.to_u8();
        ad[1..3].copy_from_slice(&ProtocolVersion::Tls12.to_u16().to_be_bytes());
        ad[3..5].copy_from_slice(&(encrypted_length as u16).to_be_bytes());

        let nonce = self.compute_nonce();
        let encrypted_record = aead.seal(&self.key, &nonce, &ad, &inner)?;

        self.advance_sequence()?;
        Ok(TlsCiphertext { encrypted_record })
    }

    /// Decrypt one protected record, recovering the real content type.
    ///
    /// AEAD failure is [`Error::BadRecordMac`]; the caller must treat it
    /// as irrecoverable.
    pub fn decrypt(
        &mut self,
        provider: &dyn CryptoProvider,
        ciphertext: &TlsCiphertext,
    ) -> Result<TlsPlaintext> {
        if ciphertext.encrypted_record.len() > MAX_CIPHERTEXT_SIZE {
            return Err(Error::RecordOverflow);
        }

        let ad = ciphertext.additional_data();
        let nonce = self.compute_nonce();
        let aead = provider.aead(self.cipher_suite.aead_algorithm())?;
        let inner = Zeroizing::new(
            aead.open(&self.key, &nonce, &ad, &ciphertext.encrypted_record)
                .map_err(|_| Error::BadRecordMac)?,
        );

        // Scan back over the zero padding for the real content type. A
        // plaintext with no non-zero byte is a fatal decode error.
        let mut type_pos = inner.len();
        while type_pos > 0 && inner[type_pos - 1] == 0 {
            type_pos -= 1;
        }
        if type_pos == 0 {
            return Err(Error::DecodeError(
                "protected record contains no content type".into(),
            ));
        }

        let content_type = ContentType::from_u8(inner[type_pos - 1]).ok_or_else(|| {
            Error::DecodeError(format!("invalid inner content type {}", inner[type_pos - 1]))
        })?;
        if !content_type.is_valid_inner_type() {
            return Err(Error::UnexpectedMessage(format!(
                "{:?} not permitted inside a protected record",
                content_type
            )));
        }

        let fragment = inner[..type_pos - 1].to_vec();
        if fragment.len() > MAX_FRAGMENT_SIZE {
            return Err(Error::RecordOverflow);
        }

        self.advance_sequence()?;
        Ok(TlsPlaintext::new(content_type, ProtocolVersion::Tls12, fragment))
    }

    /// Rotate to the next traffic secret and reset the sequence number
    /// (KeyUpdate, RFC 8446 Section 4.6.3).
    pub fn update_traffic_secret(
        &mut self,
        provider: &dyn CryptoProvider,
        new_traffic_secret: &[u8],
    ) -> Result<()> {
        let (key, iv) = derive_traffic_keys(provider, self.cipher_suite, new_traffic_secret)?;
        self.traffic_secret = Zeroizing::new(new_traffic_secret.to_vec());
        self.key = key;
        self.iv = iv;
        self.sequence_number = 0;
        Ok(())
    }

    /// Whether this direction must rotate keys before the next record.
    pub fn needs_key_update(&self) -> bool {
        self.sequence_number == u64::MAX
    }

    fn advance_sequence(&mut self) -> Result<()> {
        self.sequence_number = self
            .sequence_number
            .checked_add(1)
            .ok_or_else(|| Error::InternalError("sequence number exhausted".to_string()))?;
        Ok(())
    }

    fn compute_nonce(&self) -> Zeroizing<Vec<u8>> {
        let mut nonce = Zeroizing::new(self.iv.to_vec());
        let seq = self.sequence_number.to_be_bytes();
        let offset = nonce.len() - 8;
        for (i, byte) in seq.iter().enumerate() {
            nonce[offset + i] ^= byte;
        }
        nonce
    }

    #[cfg(test)]
    pub(crate) fn set_sequence_number(&mut self, seq: u64) {
        self.sequence_number = seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambertls_crypto_rustcrypto::RustCryptoProvider;

    fn protection(suite: CipherSuite, secret_byte: u8) -> RecordProtection {
        let provider = RustCryptoProvider::new();
        let secret = vec![secret_byte; suite.hash_len()];
        RecordProtection::new(&provider, suite, &secret).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_all_suites() {
        let provider = RustCryptoProvider::new();
        for suite in [
            CipherSuite::Aes128GcmSha256,
            CipherSuite::Aes256GcmSha384,
            CipherSuite::ChaCha20Poly1305Sha256,
        ] {
            let mut sender = protection(suite, 0x42);
            let mut receiver = protection(suite, 0x42);

            let ciphertext = sender
                .encrypt(&provider, ContentType::ApplicationData, b"hello record layer")
                .unwrap();
            let plaintext = receiver.decrypt(&provider, &ciphertext).unwrap();

            assert_eq!(plaintext.content_type, ContentType::ApplicationData);
            assert_eq!(plaintext.fragment, b"hello record layer");
        }
    }

    #[test]
    fn test_padding_recovers_content_type() {
        let provider = RustCryptoProvider::new();
        for padding in [0usize, 1, 7, 255] {
            let mut sender = protection(CipherSuite::Aes128GcmSha256, 0x01);
            sender.set_padding(padding);
            let mut receiver = protection(CipherSuite::Aes128GcmSha256, 0x01);

            let ciphertext = sender.encrypt(&provider, ContentType::Handshake, b"msg").unwrap();
            assert_eq!(ciphertext.encrypted_record.len(), 3 + 1 + padding + 16);

            let plaintext = receiver.decrypt(&provider, &ciphertext).unwrap();
            assert_eq!(plaintext.content_type, ContentType::Handshake);
            assert_eq!(plaintext.fragment, b"msg");
        }
    }

    #[test]
    fn test_tampered_ciphertext_is_bad_record_mac() {
        let provider = RustCryptoProvider::new();
        let mut sender = protection(CipherSuite::Aes128GcmSha256, 0x11);
        let mut receiver = protection(CipherSuite::Aes128GcmSha256, 0x11);

        let mut ciphertext = sender
            .encrypt(&provider, ContentType::ApplicationData, b"payload")
            .unwrap();
        ciphertext.encrypted_record[2] ^= 0x80;

        assert_eq!(
            receiver.decrypt(&provider, &ciphertext),
            Err(Error::BadRecordMac)
        );
    }

    #[test]
    fn test_sequence_number_mismatch_fails() {
        let provider = RustCryptoProvider::new();
        let mut sender = protection(CipherSuite::ChaCha20Poly1305Sha256, 0x22);
        let mut receiver = protection(CipherSuite::ChaCha20Poly1305Sha256, 0x22);

        let first = sender.encrypt(&provider, ContentType::ApplicationData, b"one").unwrap();
        let second = sender.encrypt(&provider, ContentType::ApplicationData, b"two").unwrap();

        // Receiving out of order means the nonce is wrong.
        assert_eq!(receiver.decrypt(&provider, &second), Err(Error::BadRecordMac));
        // A failed open does not consume a sequence slot; wire order
        // still decrypts.
        assert_eq!(receiver.decrypt(&provider, &first).unwrap().fragment, b"one");
        assert_eq!(receiver.decrypt(&provider, &second).unwrap().fragment, b"two");
    }

    #[test]
    fn test_nonces_unique_across_sequence() {
        let mut protection = protection(CipherSuite::Aes128GcmSha256, 0x33);
        let n0 = protection.compute_nonce();
        protection.set_sequence_number(1);
        let n1 = protection.compute_nonce();
        protection.set_sequence_number(u64::MAX - 1);
        let n2 = protection.compute_nonce();
        assert_ne!(n0, n1);
        assert_ne!(n0, n2);
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_key_update_resets_sequence_and_keys() {
        let provider = RustCryptoProvider::new();
        let mut sender = protection(CipherSuite::Aes128GcmSha256, 0x44);
        let mut receiver = protection(CipherSuite::Aes128GcmSha256, 0x44);

        sender.encrypt(&provider, ContentType::ApplicationData, b"x").unwrap();
        receiver
            .decrypt(
                &provider,
                &{
                    let mut s2 = protection(CipherSuite::Aes128GcmSha256, 0x44);
                    s2.encrypt(&provider, ContentType::ApplicationData, b"x").unwrap()
                },
            )
            .unwrap();
        assert_eq!(sender.sequence_number(), 1);

        let new_secret = vec![0x55; 32];
        sender.update_traffic_secret(&provider, &new_secret).unwrap();
        receiver.update_traffic_secret(&provider, &new_secret).unwrap();
        assert_eq!(sender.sequence_number(), 0);

        let ciphertext = sender.encrypt(&provider, ContentType::ApplicationData, b"y").unwrap();
        let plaintext = receiver.decrypt(&provider, &ciphertext).unwrap();
        assert_eq!(plaintext.fragment, b"y");
    }

    #[test]
    fn test_records_under_old_key_fail_after_rotation() {
        let provider = RustCryptoProvider::new();
        let mut sender = protection(CipherSuite::Aes128GcmSha256, 0x66);
        let mut receiver = protection(CipherSuite::Aes128GcmSha256, 0x66);

        let old_record = sender.encrypt(&provider, ContentType::ApplicationData, b"old").unwrap();

        receiver.update_traffic_secret(&provider, &[0x67; 32]).unwrap();
        assert_eq!(receiver.decrypt(&provider, &old_record), Err(Error::BadRecordMac));
    }

    #[test]
    fn test_record_size_limit_enforced_on_send() {
        let provider = RustCryptoProvider::new();
        let mut sender = protection(CipherSuite::Aes128GcmSha256, 0x77);
        sender.set_record_size_limit(256);
        assert_eq!(sender.max_content_len(), 255);

        assert!(sender
            .encrypt(&provider, ContentType::ApplicationData, &[0u8; 255])
            .is_ok());
        assert!(sender
            .encrypt(&provider, ContentType::ApplicationData, &[0u8; 256])
            .is_err());
    }

    #[test]
    fn test_all_zero_inner_plaintext_rejected() {
        let provider = RustCryptoProvider::new();
        let suite = CipherSuite::Aes128GcmSha256;
        let secret = vec![0x42; 32];
        let sender = RecordProtection::new(&provider, suite, &secret).unwrap();
        let mut receiver = RecordProtection::new(&provider, suite, &secret).unwrap();

        // Hand-seal an inner plaintext that is all padding.
        let aead = provider.aead(suite.aead_algorithm()).unwrap();
        let inner = [0u8; 8];
        let encrypted_length = inner.len() + aead.tag_size();
        let mut ad = [0u8; 5];
        ad[0] = 23;
        ad[1..3].copy_from_slice(&0x0303u16.to_be_bytes());
        ad[3..5].copy_from_slice(&(encrypted_length as u16).to_be_bytes());
        let nonce = sender.compute_nonce();
        let encrypted_record = aead.seal(&sender.key, &nonce, &ad, &inner).unwrap();

        let result = receiver.decrypt(&provider, &TlsCiphertext { encrypted_record });
        assert!(matches!(result, Err(Error::DecodeError(_))));
    }
}
