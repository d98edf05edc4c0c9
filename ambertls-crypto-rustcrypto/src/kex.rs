//! Key exchange implementations backed by `x25519-dalek` and `p256`.

use ambertls_crypto::{
    Error, KeyExchange, KeyExchangeAlgorithm, PrivateKey, PublicKey, Result, SharedSecret,
};
use p256::elliptic_curve::sec1::ToEncodedPoint;

/// Create a key exchange instance for the specified group.
pub fn create_key_exchange(algorithm: KeyExchangeAlgorithm) -> Result<Box<dyn KeyExchange>> {
    match algorithm {
        KeyExchangeAlgorithm::X25519 => Ok(Box::new(X25519Kex)),
        KeyExchangeAlgorithm::Secp256r1 => Ok(Box::new(EcdhP256)),
    }
}

/// X25519 Diffie-Hellman (RFC 7748).
///
/// 32-byte public keys and shared secrets; the dalek implementation is
/// constant-time and clamps scalars internally.
struct X25519Kex;

impl KeyExchange for X25519Kex {
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        let secret = x25519_dalek::StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        Ok((
            PrivateKey::from_bytes(secret.to_bytes().to_vec()),
            PublicKey::from_bytes(public.as_bytes().to_vec()),
        ))
    }

    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret> {
        let secret_bytes: [u8; 32] = private_key
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidPrivateKey)?;
        let peer_bytes: [u8; 32] = peer_public_key
            .try_into()
            .map_err(|_| Error::InvalidPublicKey)?;

        let secret = x25519_dalek::StaticSecret::from(secret_bytes);
        let peer = x25519_dalek::PublicKey::from(peer_bytes);
        let shared = secret.diffie_hellman(&peer);

        // An all-zero output means the peer sent a low-order point.
        if shared.as_bytes().iter().all(|&b| b == 0) {
            return Err(Error::InvalidPublicKey);
        }

        Ok(SharedSecret::from_bytes(shared.as_bytes().to_vec()))
    }

    fn algorithm(&self) -> KeyExchangeAlgorithm {
        KeyExchangeAlgorithm::X25519
    }
}

/// ECDH on secp256r1 (NIST P-256).
///
/// Public keys travel as uncompressed SEC1 points (65 bytes); the shared
/// secret is the big-endian X coordinate padded to 32 bytes.
struct EcdhP256;

impl KeyExchange for EcdhP256 {
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key();
        let point = public.to_encoded_point(false);
        Ok((
            PrivateKey::from_bytes(secret.to_bytes().to_vec()),
            PublicKey::from_bytes(point.as_bytes().to_vec()),
        ))
    }

    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret> {
        let secret = p256::SecretKey::from_slice(private_key.as_bytes())
            .map_err(|_| Error::InvalidPrivateKey)?;
        let peer = p256::PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|_| Error::InvalidPublicKey)?;

        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        Ok(SharedSecret::from_bytes(shared.raw_secret_bytes().to_vec()))
    }

    fn algorithm(&self) -> KeyExchangeAlgorithm {
        KeyExchangeAlgorithm::Secp256r1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x25519_agreement() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::X25519).unwrap();
        let (priv_a, pub_a) = kex.generate_keypair().unwrap();
        let (priv_b, pub_b) = kex.generate_keypair().unwrap();
        assert_eq!(pub_a.as_bytes().len(), 32);

        let shared_a = kex.exchange(&priv_a, pub_b.as_bytes()).unwrap();
        let shared_b = kex.exchange(&priv_b, pub_a.as_bytes()).unwrap();
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
        assert_eq!(shared_a.as_bytes().len(), 32);
    }

    #[test]
    fn test_p256_agreement() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::Secp256r1).unwrap();
        let (priv_a, pub_a) = kex.generate_keypair().unwrap();
        let (priv_b, pub_b) = kex.generate_keypair().unwrap();
        assert_eq!(pub_a.as_bytes().len(), 65);
        assert_eq!(pub_a.as_bytes()[0], 0x04); // uncompressed point

        let shared_a = kex.exchange(&priv_a, pub_b.as_bytes()).unwrap();
        let shared_b = kex.exchange(&priv_b, pub_a.as_bytes()).unwrap();
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
        assert_eq!(shared_a.as_bytes().len(), 32);
    }

    #[test]
    fn test_p256_rejects_garbage_point() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::Secp256r1).unwrap();
        let (priv_a, _) = kex.generate_keypair().unwrap();
        let result = kex.exchange(&priv_a, &[0xFFu8; 65]);
        assert!(result.is_err());
    }

    #[test]
    fn test_x25519_rejects_wrong_length() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::X25519).unwrap();
        let (priv_a, _) = kex.generate_keypair().unwrap();
        assert!(kex.exchange(&priv_a, &[0u8; 31]).is_err());
    }
}
