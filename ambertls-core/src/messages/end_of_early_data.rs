//! EndOfEarlyData message (RFC 8446 Section 4.5).

use crate::error::{Error, Result};

/// EndOfEarlyData message.
///
/// Sent by the client under the early traffic key to mark the end of
/// 0-RTT data; the server switches to the handshake receive key after
/// processing it. The body is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndOfEarlyData;

impl EndOfEarlyData {
    /// Create a new EndOfEarlyData message.
    pub fn new() -> Self {
        Self
    }

    /// Encode the (empty) body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Decode the body; any content is a decode error.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if !data.is_empty() {
            return Err(Error::DecodeError(
                "EndOfEarlyData must have an empty body".into(),
            ));
        }
        Ok(Self)
    }
}
