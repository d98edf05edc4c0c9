//! KeyUpdate message (RFC 8446 Section 4.6.3).

use crate::error::{Error, Result};

/// Whether the peer is asked to rotate its sending keys too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyUpdateRequest {
    /// update_not_requested (0)
    UpdateNotRequested = 0,

    /// update_requested (1) - the receiver must answer with its own
    /// KeyUpdate before sending further application data
    UpdateRequested = 1,
}

/// KeyUpdate message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUpdate {
    /// Rotation request flag
    pub request_update: KeyUpdateRequest,
}

impl KeyUpdate {
    /// Create a new KeyUpdate.
    pub fn new(request_update: KeyUpdateRequest) -> Self {
        Self { request_update }
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(vec![self.request_update as u8])
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != 1 {
            return Err(Error::DecodeError("KeyUpdate must be one byte".into()));
        }
        let request_update = match data[0] {
            0 => KeyUpdateRequest::UpdateNotRequested,
            1 => KeyUpdateRequest::UpdateRequested,
            other => {
                return Err(Error::IllegalParameter(format!(
                    "invalid KeyUpdateRequest {}",
                    other
                )))
            }
        };
        Ok(Self { request_update })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_update_roundtrip() {
        for request in [
            KeyUpdateRequest::UpdateNotRequested,
            KeyUpdateRequest::UpdateRequested,
        ] {
            let message = KeyUpdate::new(request);
            let decoded = KeyUpdate::decode(&message.encode().unwrap()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_invalid_request_rejected() {
        assert!(KeyUpdate::decode(&[2]).is_err());
        assert!(KeyUpdate::decode(&[]).is_err());
        assert!(KeyUpdate::decode(&[0, 0]).is_err());
    }
}
