//! Transcript hash management for the TLS 1.3 handshake.
//!
//! The transcript covers the concatenation of all handshake messages in
//! wire order (type + 24-bit length + body), excluding record framing.
//! It feeds key derivation, Finished verify data and PSK binders.
//!
//! After a HelloRetryRequest the transcript head is rewritten: the
//! original ClientHello is replaced by a synthetic `message_hash`
//! entry (RFC 8446 Section 4.4.1):
//!
//! ```text
//! Transcript-Hash(CH1, HRR, ...) =
//!     Hash(message_hash || 00 00 Hash.length || Hash(CH1) || HRR || ...)
//! ```
//!
//! The accumulator therefore keeps raw message bytes until the HRR
//! disposition is known, rather than hashing incrementally.

use crate::error::{Error, Result};
use crate::protocol::HandshakeType;
use ambertls_crypto::{CryptoProvider, HashAlgorithm};
use subtle::ConstantTimeEq;

/// Append-only transcript of handshake messages with one privileged
/// rewrite operation for HelloRetryRequest.
#[derive(Debug, Clone)]
pub struct TranscriptHash {
    /// Hash algorithm in use
    algorithm: HashAlgorithm,

    /// Complete handshake messages in wire order
    messages: Vec<Vec<u8>>,
}

impl TranscriptHash {
    /// Create a new transcript for the given hash algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            messages: Vec::new(),
        }
    }

    /// Get the hash algorithm being used.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Append a complete handshake message (4-byte header included).
    pub fn update(&mut self, message: &[u8]) {
        self.messages.push(message.to_vec());
    }

    /// Compute the hash over everything appended so far.
    pub fn current_hash(&self, provider: &dyn CryptoProvider) -> Result<Vec<u8>> {
        let mut hasher = provider.hash(self.algorithm)?;
        for msg in &self.messages {
            hasher.update(msg);
        }
        Ok(hasher.finalize())
    }

    /// Compute the hash of everything appended so far plus `extra`,
    /// without mutating the transcript. Used for PSK binders over the
    /// truncated ClientHello.
    pub fn hash_with(&self, provider: &dyn CryptoProvider, extra: &[u8]) -> Result<Vec<u8>> {
        let mut hasher = provider.hash(self.algorithm)?;
        for msg in &self.messages {
            hasher.update(msg);
        }
        hasher.update(extra);
        Ok(hasher.finalize())
    }

    /// Rewrite the transcript head after a HelloRetryRequest.
    ///
    /// Everything appended so far (which must be exactly ClientHello1)
    /// is replaced by the synthetic entry
    /// `message_hash(254) || uint24(Hash.length) || Hash(CH1)`.
    pub fn rewrite_for_hello_retry(&mut self, provider: &dyn CryptoProvider) -> Result<()> {
        if self.messages.is_empty() {
            return Err(Error::InternalError(
                "transcript rewrite with no messages".to_string(),
            ));
        }

        let hash = self.current_hash(provider)?;
        let mut synthetic = Vec::with_capacity(4 + hash.len());
        synthetic.push(HandshakeType::MessageHash.to_u8());
        synthetic.push(0);
        synthetic.push(0);
        synthetic.push(hash.len() as u8);
        synthetic.extend_from_slice(&hash);

        self.messages.clear();
        self.messages.push(synthetic);
        Ok(())
    }

    /// Discard the retained message bytes.
    ///
    /// Called once the connection reaches the connected state and only
    /// derived secrets are still needed.
    pub fn discard(&mut self) {
        self.messages.clear();
    }

    /// Number of messages currently in the transcript.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// HKDF-Expand-Label (RFC 8446 Section 7.1).
///
/// ```text
/// struct {
///     uint16 length = Length;
///     opaque label<7..255> = "tls13 " + Label;
///     opaque context<0..255> = Context;
/// } HkdfLabel;
/// ```
pub fn hkdf_expand_label(
    provider: &dyn CryptoProvider,
    algorithm: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>> {
    if length > 0xFFFF {
        return Err(Error::InternalError("expand length too large".to_string()));
    }
    if context.len() > 255 {
        return Err(Error::InternalError("expand context too large".to_string()));
    }

    let mut info = Vec::with_capacity(10 + label.len() + context.len());
    info.extend_from_slice(&(length as u16).to_be_bytes());
    info.push((b"tls13 ".len() + label.len()) as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    let kdf = provider.kdf(algorithm.to_kdf_algorithm())?;
    kdf.expand(secret, &info, length).map_err(Error::from)
}

/// Derive-Secret (RFC 8446 Section 7.1).
///
/// `Derive-Secret(Secret, Label, Messages) =
///  HKDF-Expand-Label(Secret, Label, Hash(Messages), Hash.length)`
pub fn derive_secret(
    provider: &dyn CryptoProvider,
    algorithm: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>> {
    hkdf_expand_label(
        provider,
        algorithm,
        secret,
        label,
        transcript_hash,
        algorithm.output_size(),
    )
}

/// Hash of the empty string under `algorithm`, the context used with the
/// "derived" label.
pub fn empty_hash(provider: &dyn CryptoProvider, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
    let hasher = provider.hash(algorithm)?;
    Ok(hasher.finalize())
}

/// Compute Finished verify data (RFC 8446 Section 4.4.4).
///
/// ```text
/// finished_key = HKDF-Expand-Label(BaseKey, "finished", "", Hash.length)
/// verify_data  = HMAC(finished_key, Transcript-Hash(context))
/// ```
pub fn compute_verify_data(
    provider: &dyn CryptoProvider,
    algorithm: HashAlgorithm,
    base_key: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>> {
    let finished_key = hkdf_expand_label(
        provider,
        algorithm,
        base_key,
        b"finished",
        &[],
        algorithm.output_size(),
    )?;

    let mut hmac = provider.hmac(algorithm, &finished_key)?;
    hmac.update(transcript_hash);
    Ok(hmac.finalize())
}

/// Constant-time comparison for verify data and binders.
pub fn verify_data_matches(expected: &[u8], received: &[u8]) -> bool {
    expected.len() == received.len() && bool::from(expected.ct_eq(received))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambertls_crypto_rustcrypto::RustCryptoProvider;

    #[test]
    fn test_transcript_order_matters() {
        let provider = RustCryptoProvider::new();
        let mut a = TranscriptHash::new(HashAlgorithm::Sha256);
        a.update(b"first");
        a.update(b"second");

        let mut b = TranscriptHash::new(HashAlgorithm::Sha256);
        b.update(b"second");
        b.update(b"first");

        assert_ne!(
            a.current_hash(&provider).unwrap(),
            b.current_hash(&provider).unwrap()
        );
    }

    #[test]
    fn test_transcript_equals_concatenated_hash() {
        let provider = RustCryptoProvider::new();
        let mut transcript = TranscriptHash::new(HashAlgorithm::Sha256);
        transcript.update(b"hello ");
        transcript.update(b"world");

        let mut hasher = provider.hash(HashAlgorithm::Sha256).unwrap();
        hasher.update(b"hello world");
        assert_eq!(transcript.current_hash(&provider).unwrap(), hasher.finalize());
    }

    #[test]
    fn test_hello_retry_rewrite() {
        let provider = RustCryptoProvider::new();
        let client_hello = vec![1u8, 0, 0, 2, 0xAB, 0xCD];

        let mut transcript = TranscriptHash::new(HashAlgorithm::Sha256);
        transcript.update(&client_hello);
        transcript.rewrite_for_hello_retry(&provider).unwrap();
        assert_eq!(transcript.message_count(), 1);

        // Expected: Hash(message_hash || 00 00 32 || Hash(CH1))
        let mut inner = provider.hash(HashAlgorithm::Sha256).unwrap();
        inner.update(&client_hello);
        let ch1_hash = inner.finalize();

        let mut expected = vec![254u8, 0, 0, 32];
        expected.extend_from_slice(&ch1_hash);
        let mut outer = provider.hash(HashAlgorithm::Sha256).unwrap();
        outer.update(&expected);

        assert_eq!(transcript.current_hash(&provider).unwrap(), outer.finalize());
    }

    #[test]
    fn test_hash_with_does_not_mutate() {
        let provider = RustCryptoProvider::new();
        let mut transcript = TranscriptHash::new(HashAlgorithm::Sha256);
        transcript.update(b"base");

        let before = transcript.current_hash(&provider).unwrap();
        let combined = transcript.hash_with(&provider, b"extra").unwrap();
        let after = transcript.current_hash(&provider).unwrap();

        assert_eq!(before, after);
        assert_ne!(before, combined);
    }

    #[test]
    fn test_hkdf_expand_label_is_deterministic() {
        let provider = RustCryptoProvider::new();
        let secret = [0x42u8; 32];
        let a = hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"key", &[], 16)
            .unwrap();
        let b = hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"key", &[], 16)
            .unwrap();
        let c = hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"iv", &[], 16)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_verify_data_changes_with_transcript() {
        let provider = RustCryptoProvider::new();
        let base_key = [0x11u8; 32];
        let a = compute_verify_data(&provider, HashAlgorithm::Sha256, &base_key, &[0x01; 32])
            .unwrap();
        let b = compute_verify_data(&provider, HashAlgorithm::Sha256, &base_key, &[0x02; 32])
            .unwrap();
        assert_ne!(a, b);
        assert!(verify_data_matches(&a, &a));
        assert!(!verify_data_matches(&a, &b));
        assert!(!verify_data_matches(&a, &a[..31]));
    }
}
