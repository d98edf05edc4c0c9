//! TLS alert protocol.

use crate::error::{AlertDescription, Error, Result};

/// Alert level (RFC 8446 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertLevel {
    /// Warning (1) - in TLS 1.3 only close_notify and user_canceled
    Warning = 1,

    /// Fatal (2)
    Fatal = 2,
}

impl AlertLevel {
    /// Create from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// TLS alert message: two bytes of (level, description).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Alert level
    pub level: AlertLevel,

    /// Alert description
    pub description: AlertDescription,
}

impl Alert {
    /// Create a new alert.
    pub fn new(level: AlertLevel, description: AlertDescription) -> Self {
        Self { level, description }
    }

    /// Create a fatal alert.
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    /// Create a close_notify alert.
    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    /// Encode the alert to its two-byte wire form.
    pub fn encode(&self) -> [u8; 2] {
        [self.level.to_u8(), self.description.to_u8()]
    }

    /// Decode an alert from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != 2 {
            return Err(Error::DecodeError("alert must be exactly two bytes".into()));
        }

        let level = AlertLevel::from_u8(data[0])
            .ok_or_else(|| Error::DecodeError("invalid alert level".into()))?;

        let description = AlertDescription::from_u8(data[1])
            .ok_or_else(|| Error::DecodeError("invalid alert description".into()))?;

        Ok(Self { level, description })
    }

    /// Check if this alert closes the connection immediately.
    pub fn is_fatal(&self) -> bool {
        self.level == AlertLevel::Fatal || self.description.is_fatal()
    }
}
