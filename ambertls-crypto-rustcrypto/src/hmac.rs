//! HMAC implementations backed by the `hmac` crate.

use ambertls_crypto::{Error, HashAlgorithm, Hmac, Result};
use hmac::Mac;
use sha2::{Sha256, Sha384};

type HmacSha256 = hmac::Hmac<Sha256>;
type HmacSha384 = hmac::Hmac<Sha384>;

/// Create a keyed HMAC instance for the given hash algorithm.
pub fn create_hmac(algorithm: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>> {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mac = HmacSha256::new_from_slice(key)
                .map_err(|_| Error::Internal("HMAC key rejected".to_string()))?;
            Ok(Box::new(HmacSha256Impl(mac)))
        }
        HashAlgorithm::Sha384 => {
            let mac = HmacSha384::new_from_slice(key)
                .map_err(|_| Error::Internal("HMAC key rejected".to_string()))?;
            Ok(Box::new(HmacSha384Impl(mac)))
        }
    }
}

struct HmacSha256Impl(HmacSha256);

impl Hmac for HmacSha256Impl {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().into_bytes().to_vec()
    }
}

struct HmacSha384Impl(HmacSha384);

impl Hmac for HmacSha384Impl {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_deterministic() {
        let mut a = create_hmac(HashAlgorithm::Sha256, b"key").unwrap();
        a.update(b"message");
        let mut b = create_hmac(HashAlgorithm::Sha256, b"key").unwrap();
        b.update(b"message");
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_hmac_key_separation() {
        let mut a = create_hmac(HashAlgorithm::Sha256, b"key-a").unwrap();
        a.update(b"message");
        let mut b = create_hmac(HashAlgorithm::Sha256, b"key-b").unwrap();
        b.update(b"message");
        assert_ne!(a.finalize(), b.finalize());
    }
}
