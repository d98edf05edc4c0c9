//! AEAD cipher implementations backed by `aes-gcm` and
//! `chacha20poly1305`.

use aes_gcm::aead::{Aead as _, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use ambertls_crypto::{Aead, AeadAlgorithm, Error, Result};
use chacha20poly1305::ChaCha20Poly1305;

/// Create an AEAD cipher instance for the specified algorithm.
pub fn create_aead(algorithm: AeadAlgorithm) -> Result<Box<dyn Aead>> {
    match algorithm {
        AeadAlgorithm::Aes128Gcm => Ok(Box::new(Aes128GcmImpl)),
        AeadAlgorithm::Aes256Gcm => Ok(Box::new(Aes256GcmImpl)),
        AeadAlgorithm::ChaCha20Poly1305 => Ok(Box::new(ChaCha20Poly1305Impl)),
    }
}

fn check_sizes(algorithm: AeadAlgorithm, key: &[u8], nonce: &[u8]) -> Result<()> {
    if key.len() != algorithm.key_size() {
        return Err(Error::InvalidKeySize {
            expected: algorithm.key_size(),
            actual: key.len(),
        });
    }
    if nonce.len() != algorithm.nonce_size() {
        return Err(Error::InvalidNonceSize {
            expected: algorithm.nonce_size(),
            actual: nonce.len(),
        });
    }
    Ok(())
}

/// AES-128-GCM.
struct Aes128GcmImpl;

impl Aead for Aes128GcmImpl {
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        check_sizes(self.algorithm(), key, nonce)?;
        let cipher = Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::Internal("AES-128-GCM key rejected".to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| Error::Internal("AES-128-GCM seal failed".to_string()))
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_sizes(self.algorithm(), key, nonce)?;
        let cipher = Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::Internal("AES-128-GCM key rejected".to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::AuthenticationFailed)
    }

    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::Aes128Gcm
    }
}

/// AES-256-GCM.
struct Aes256GcmImpl;

impl Aead for Aes256GcmImpl {
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        check_sizes(self.algorithm(), key, nonce)?;
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::Internal("AES-256-GCM key rejected".to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| Error::Internal("AES-256-GCM seal failed".to_string()))
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_sizes(self.algorithm(), key, nonce)?;
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::Internal("AES-256-GCM key rejected".to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::AuthenticationFailed)
    }

    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::Aes256Gcm
    }
}

/// ChaCha20-Poly1305.
struct ChaCha20Poly1305Impl;

impl Aead for ChaCha20Poly1305Impl {
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        check_sizes(self.algorithm(), key, nonce)?;
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::Internal("ChaCha20-Poly1305 key rejected".to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| Error::Internal("ChaCha20-Poly1305 seal failed".to_string()))
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_sizes(self.algorithm(), key, nonce)?;
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::Internal("ChaCha20-Poly1305 key rejected".to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::AuthenticationFailed)
    }

    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::ChaCha20Poly1305
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        for alg in [
            AeadAlgorithm::Aes128Gcm,
            AeadAlgorithm::Aes256Gcm,
            AeadAlgorithm::ChaCha20Poly1305,
        ] {
            let aead = create_aead(alg).unwrap();
            let key = vec![0x11u8; alg.key_size()];
            let nonce = vec![0x22u8; alg.nonce_size()];
            let sealed = aead.seal(&key, &nonce, b"aad", b"plaintext").unwrap();
            assert_eq!(sealed.len(), b"plaintext".len() + alg.tag_size());
            let opened = aead.open(&key, &nonce, b"aad", &sealed).unwrap();
            assert_eq!(opened, b"plaintext");
        }
    }

    #[test]
    fn test_open_rejects_tampered_ciphertext() {
        let aead = create_aead(AeadAlgorithm::Aes128Gcm).unwrap();
        let key = [0x11u8; 16];
        let nonce = [0x22u8; 12];
        let mut sealed = aead.seal(&key, &nonce, b"aad", b"plaintext").unwrap();
        sealed[0] ^= 0x01;
        assert_eq!(
            aead.open(&key, &nonce, b"aad", &sealed),
            Err(Error::AuthenticationFailed)
        );
    }

    #[test]
    fn test_open_rejects_wrong_aad() {
        let aead = create_aead(AeadAlgorithm::ChaCha20Poly1305).unwrap();
        let key = [0x33u8; 32];
        let nonce = [0x44u8; 12];
        let sealed = aead.seal(&key, &nonce, b"aad", b"plaintext").unwrap();
        assert_eq!(
            aead.open(&key, &nonce, b"other", &sealed),
            Err(Error::AuthenticationFailed)
        );
    }

    #[test]
    fn test_key_size_checked() {
        let aead = create_aead(AeadAlgorithm::Aes256Gcm).unwrap();
        let result = aead.seal(&[0u8; 16], &[0u8; 12], b"", b"x");
        assert!(matches!(result, Err(Error::InvalidKeySize { .. })));
    }
}
