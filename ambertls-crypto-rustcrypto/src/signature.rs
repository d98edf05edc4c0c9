//! Signature implementations backed by `p256`, `p384` and `rsa`.

use ambertls_crypto::{Error, Result, Signature, SignatureScheme};
use rsa::pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use sha2::Sha256;

/// Create a signature scheme instance.
pub fn create_signature(scheme: SignatureScheme) -> Result<Box<dyn Signature>> {
    match scheme {
        SignatureScheme::EcdsaSecp256r1Sha256 => Ok(Box::new(EcdsaP256Sha256)),
        SignatureScheme::EcdsaSecp384r1Sha384 => Ok(Box::new(EcdsaP384Sha384)),
        SignatureScheme::RsaPssRsaeSha256 => Ok(Box::new(RsaPssSha256)),
    }
}

/// ECDSA with P-256 and SHA-256; raw-scalar private keys, DER signatures.
struct EcdsaP256Sha256;

impl Signature for EcdsaP256Sha256 {
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        use p256::ecdsa::signature::Signer;
        let signing_key = p256::ecdsa::SigningKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey)?;
        let signature: p256::ecdsa::Signature = signing_key.sign(message);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        use p256::ecdsa::signature::Verifier;
        let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let signature =
            p256::ecdsa::Signature::from_der(signature).map_err(|_| Error::VerificationFailed)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| Error::VerificationFailed)
    }

    fn algorithm(&self) -> SignatureScheme {
        SignatureScheme::EcdsaSecp256r1Sha256
    }
}

/// ECDSA with P-384 and SHA-384; raw-scalar private keys, DER signatures.
struct EcdsaP384Sha384;

impl Signature for EcdsaP384Sha384 {
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        use p384::ecdsa::signature::Signer;
        let signing_key = p384::ecdsa::SigningKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey)?;
        let signature: p384::ecdsa::Signature = signing_key.sign(message);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        use p384::ecdsa::signature::Verifier;
        let verifying_key = p384::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let signature =
            p384::ecdsa::Signature::from_der(signature).map_err(|_| Error::VerificationFailed)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| Error::VerificationFailed)
    }

    fn algorithm(&self) -> SignatureScheme {
        SignatureScheme::EcdsaSecp384r1Sha384
    }
}

/// RSASSA-PSS with SHA-256, salt length equal to the digest length.
///
/// Private keys are PKCS#8 DER, public keys PKCS#1 DER.
struct RsaPssSha256;

impl Signature for RsaPssSha256 {
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let key =
            rsa::RsaPrivateKey::from_pkcs8_der(private_key).map_err(|_| Error::InvalidPrivateKey)?;
        let signing_key = rsa::pss::SigningKey::<Sha256>::new(key);
        let signature = signing_key.sign_with_rng(&mut rand::rngs::OsRng, message);
        Ok(signature.to_vec())
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        let key =
            rsa::RsaPublicKey::from_pkcs1_der(public_key).map_err(|_| Error::InvalidPublicKey)?;
        let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(key);
        let signature =
            rsa::pss::Signature::try_from(signature).map_err(|_| Error::VerificationFailed)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| Error::VerificationFailed)
    }

    fn algorithm(&self) -> SignatureScheme {
        SignatureScheme::RsaPssRsaeSha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    #[test]
    fn test_ecdsa_p256_sign_verify() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key().to_encoded_point(false);

        let sig_impl = create_signature(SignatureScheme::EcdsaSecp256r1Sha256).unwrap();
        let signature = sig_impl.sign(&secret.to_bytes(), b"handshake transcript").unwrap();

        sig_impl
            .verify(public.as_bytes(), b"handshake transcript", &signature)
            .unwrap();

        assert!(sig_impl
            .verify(public.as_bytes(), b"different message", &signature)
            .is_err());
    }

    #[test]
    fn test_ecdsa_p384_sign_verify() {
        let secret = p384::SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key().to_encoded_point(false);

        let sig_impl = create_signature(SignatureScheme::EcdsaSecp384r1Sha384).unwrap();
        let signature = sig_impl.sign(&secret.to_bytes(), b"message").unwrap();
        sig_impl.verify(public.as_bytes(), b"message", &signature).unwrap();
    }

    #[test]
    fn test_ecdsa_rejects_garbage_signature() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key().to_encoded_point(false);
        let sig_impl = create_signature(SignatureScheme::EcdsaSecp256r1Sha256).unwrap();
        assert!(sig_impl.verify(public.as_bytes(), b"message", &[0u8; 70]).is_err());
    }
}
