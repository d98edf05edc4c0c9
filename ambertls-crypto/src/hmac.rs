//! HMAC interface.

/// Keyed-hash message authentication code.
///
/// Instances are created keyed by [`crate::CryptoProvider::hmac`]; feed
/// data with [`Hmac::update`] and consume with [`Hmac::finalize`].
pub trait Hmac: Send {
    /// Feed data into the MAC state.
    fn update(&mut self, data: &[u8]);

    /// Finish and return the MAC tag.
    fn finalize(self: Box<Self>) -> Vec<u8>;
}
