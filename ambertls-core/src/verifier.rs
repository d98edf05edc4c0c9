//! Certificate verification interface.
//!
//! X.509 parsing and chain validation are external collaborators: the
//! core hands the DER chain and the CertificateVerify inputs to a
//! [`CertificateVerifier`] and acts on the outcome. No ASN.1 machinery
//! lives in this crate.

use crate::error::Result;
use ambertls_crypto::SignatureScheme;

/// Validates peer certificate chains and CertificateVerify signatures.
pub trait CertificateVerifier: Send + Sync {
    /// Validate the peer's chain (DER, end-entity first) for
    /// `server_name` at time `now` (UNIX seconds).
    fn verify_chain(&self, chain: &[Vec<u8>], server_name: Option<&str>, now: u64) -> Result<()>;

    /// Verify `signature` over `message` against the end-entity
    /// certificate's public key.
    fn verify_signature(
        &self,
        end_entity: &[u8],
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()>;
}
