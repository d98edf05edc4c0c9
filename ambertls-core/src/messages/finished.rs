//! Finished message (RFC 8446 Section 4.4.4).

use crate::error::{Error, Result};

/// Finished message: an HMAC over the handshake transcript under a key
/// derived from the sender's handshake traffic secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// verify_data, Hash.length bytes
    pub verify_data: Vec<u8>,
}

impl Finished {
    /// Create a new Finished message.
    pub fn new(verify_data: Vec<u8>) -> Self {
        Self { verify_data }
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.verify_data.clone())
    }

    /// Decode the body from bytes; the expected length is the
    /// negotiated hash length.
    pub fn decode(data: &[u8], expected_len: usize) -> Result<Self> {
        if data.len() != expected_len {
            return Err(Error::DecodeError(format!(
                "Finished must be {} bytes, got {}",
                expected_len,
                data.len()
            )));
        }
        Ok(Self {
            verify_data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_roundtrip() {
        let message = Finished::new(vec![0x42; 32]);
        let decoded = Finished::decode(&message.encode().unwrap(), 32).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(Finished::decode(&[0; 31], 32).is_err());
        assert!(Finished::decode(&[0; 48], 32).is_err());
    }
}
