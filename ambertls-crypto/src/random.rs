//! Cryptographically secure random number generation.

use crate::Result;

/// CSPRNG interface.
///
/// All randomness consumed by the protocol core (hello randoms, session
/// ids, key generation, ticket nonces) flows through this trait.
pub trait Random: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}
