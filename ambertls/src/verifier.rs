//! Certificate verifier implementations.
//!
//! Chain building and X.509 parsing are outside this workspace; these
//! verifiers cover the deployment shapes the library itself needs:
//! pinning a known key, or explicitly opting out of verification.

use ambertls_core::verifier::CertificateVerifier;
use ambertls_core::{Error, Result};
use ambertls_crypto::{CryptoProvider, SignatureScheme};
use std::sync::Arc;

/// Verifier for deployments that pin the peer's public key.
///
/// The chain is accepted when its end-entity certificate matches one of
/// the pinned DER blobs exactly; CertificateVerify signatures are
/// checked against the configured raw public key.
pub struct PinnedKeyVerifier {
    provider: Arc<dyn CryptoProvider>,
    pinned_certificates: Vec<Vec<u8>>,
    public_key: Vec<u8>,
}

impl std::fmt::Debug for PinnedKeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedKeyVerifier")
            .field("pinned_certificates", &self.pinned_certificates.len())
            .finish_non_exhaustive()
    }
}

impl PinnedKeyVerifier {
    /// Pin `certificates` (DER) with the raw `public_key` used for
    /// signature checks (SEC1 point for ECDSA, PKCS#1 DER for RSA).
    pub fn new(
        provider: Arc<dyn CryptoProvider>,
        certificates: Vec<Vec<u8>>,
        public_key: Vec<u8>,
    ) -> Self {
        Self {
            provider,
            pinned_certificates: certificates,
            public_key,
        }
    }
}

impl CertificateVerifier for PinnedKeyVerifier {
    fn verify_chain(&self, chain: &[Vec<u8>], _server_name: Option<&str>, _now: u64) -> Result<()> {
        let end_entity = chain
            .first()
            .ok_or_else(|| Error::BadCertificate("empty chain".to_string()))?;
        if self.pinned_certificates.iter().any(|pinned| pinned == end_entity) {
            Ok(())
        } else {
            Err(Error::BadCertificate(
                "end-entity certificate is not pinned".to_string(),
            ))
        }
    }

    fn verify_signature(
        &self,
        _end_entity: &[u8],
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let verifier = self.provider.signature(scheme)?;
        verifier
            .verify(&self.public_key, message, signature)
            .map_err(|_| Error::BadCertificate("CertificateVerify does not verify".to_string()))
    }
}

/// Danger: accepts any chain and any signature.
///
/// Only for tests and local tooling; a connection using this verifier
/// authenticates nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVerification;

impl CertificateVerifier for NoVerification {
    fn verify_chain(&self, _chain: &[Vec<u8>], _server_name: Option<&str>, _now: u64) -> Result<()> {
        Ok(())
    }

    fn verify_signature(
        &self,
        _end_entity: &[u8],
        _scheme: SignatureScheme,
        _message: &[u8],
        _signature: &[u8],
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambertls_crypto_rustcrypto::RustCryptoProvider;

    #[test]
    fn test_pinned_verifier_matches_exact_der() {
        let provider: Arc<dyn CryptoProvider> = Arc::new(RustCryptoProvider::new());
        let verifier =
            PinnedKeyVerifier::new(provider, vec![vec![0x30, 0x01, 0xAA]], vec![0x04; 65]);

        verifier.verify_chain(&[vec![0x30, 0x01, 0xAA]], Some("example.com"), 0).unwrap();
        assert!(verifier.verify_chain(&[vec![0x30, 0x01, 0xBB]], None, 0).is_err());
        assert!(verifier.verify_chain(&[], None, 0).is_err());
    }
}
