//! Error types for the TLS protocol core.

use core::fmt;

/// Result type for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while running the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid configuration
    InvalidConfig(String),

    /// Malformed syntax: trailing bytes, truncated vector, bad framing
    DecodeError(String),

    /// Wrong message or record type for the current state
    UnexpectedMessage(String),

    /// AEAD open failure on a protected record
    BadRecordMac,

    /// Record larger than the protocol allows
    RecordOverflow,

    /// No common cipher suite, group or signature scheme
    HandshakeFailure(String),

    /// Echo mismatch, invalid key share encoding, bad parameter
    IllegalParameter(String),

    /// Certificate chain rejected by the verifier
    BadCertificate(String),

    /// supported_versions did not include TLS 1.3
    ProtocolVersion,

    /// A required extension is missing
    MissingExtension(String),

    /// Key derivation or signer failure
    InternalError(String),

    /// Cryptographic backend failure
    CryptoError(String),

    /// Local cancellation during the handshake
    UserCanceled,

    /// Peer sent close_notify
    CloseNotify,

    /// Peer sent a fatal alert
    AlertReceived(AlertDescription),

    /// Transport failure; the connection is terminally failed
    IoError(String),
}

impl Error {
    /// The alert description sent to the peer when this error makes the
    /// connection fail (spec error taxonomy).
    ///
    /// Returns `None` for errors that never produce an outgoing alert
    /// (transport failures, an alert already received from the peer).
    pub fn alert_description(&self) -> Option<AlertDescription> {
        match self {
            Error::DecodeError(_) => Some(AlertDescription::DecodeError),
            Error::UnexpectedMessage(_) => Some(AlertDescription::UnexpectedMessage),
            Error::BadRecordMac => Some(AlertDescription::BadRecordMac),
            Error::RecordOverflow => Some(AlertDescription::RecordOverflow),
            Error::HandshakeFailure(_) => Some(AlertDescription::HandshakeFailure),
            Error::IllegalParameter(_) => Some(AlertDescription::IllegalParameter),
            Error::BadCertificate(_) => Some(AlertDescription::BadCertificate),
            Error::ProtocolVersion => Some(AlertDescription::ProtocolVersion),
            Error::MissingExtension(_) => Some(AlertDescription::MissingExtension),
            Error::InternalError(_) | Error::CryptoError(_) => {
                Some(AlertDescription::InternalError)
            }
            Error::UserCanceled => Some(AlertDescription::UserCanceled),
            Error::CloseNotify => Some(AlertDescription::CloseNotify),
            Error::InvalidConfig(_) => Some(AlertDescription::InternalError),
            Error::AlertReceived(_) | Error::IoError(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Error::DecodeError(msg) => write!(f, "decode error: {}", msg),
            Error::UnexpectedMessage(msg) => write!(f, "unexpected message: {}", msg),
            Error::BadRecordMac => write!(f, "bad record MAC"),
            Error::RecordOverflow => write!(f, "record overflow"),
            Error::HandshakeFailure(msg) => write!(f, "handshake failure: {}", msg),
            Error::IllegalParameter(msg) => write!(f, "illegal parameter: {}", msg),
            Error::BadCertificate(msg) => write!(f, "bad certificate: {}", msg),
            Error::ProtocolVersion => write!(f, "peer does not support TLS 1.3"),
            Error::MissingExtension(msg) => write!(f, "missing extension: {}", msg),
            Error::InternalError(msg) => write!(f, "internal error: {}", msg),
            Error::CryptoError(msg) => write!(f, "crypto error: {}", msg),
            Error::UserCanceled => write!(f, "user canceled"),
            Error::CloseNotify => write!(f, "connection closed by peer"),
            Error::AlertReceived(desc) => write!(f, "fatal alert received: {:?}", desc),
            Error::IoError(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ambertls_crypto::Error> for Error {
    fn from(e: ambertls_crypto::Error) -> Self {
        match e {
            ambertls_crypto::Error::AuthenticationFailed => Error::BadRecordMac,
            other => Error::CryptoError(other.to_string()),
        }
    }
}

/// TLS alert descriptions (RFC 8446 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertDescription {
    /// Close notify
    CloseNotify = 0,

    /// Unexpected message
    UnexpectedMessage = 10,

    /// Bad record MAC
    BadRecordMac = 20,

    /// Record overflow
    RecordOverflow = 22,

    /// Handshake failure
    HandshakeFailure = 40,

    /// Bad certificate
    BadCertificate = 42,

    /// Certificate unknown
    CertificateUnknown = 46,

    /// Illegal parameter
    IllegalParameter = 47,

    /// Decode error
    DecodeError = 50,

    /// Decrypt error
    DecryptError = 51,

    /// Protocol version
    ProtocolVersion = 70,

    /// Internal error
    InternalError = 80,

    /// User canceled
    UserCanceled = 90,

    /// Missing extension
    MissingExtension = 109,

    /// Unsupported extension
    UnsupportedExtension = 110,

    /// Unknown PSK identity
    UnknownPskIdentity = 115,

    /// No application protocol
    NoApplicationProtocol = 120,
}

impl AlertDescription {
    /// Convert from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AlertDescription::CloseNotify),
            10 => Some(AlertDescription::UnexpectedMessage),
            20 => Some(AlertDescription::BadRecordMac),
            22 => Some(AlertDescription::RecordOverflow),
            40 => Some(AlertDescription::HandshakeFailure),
            42 => Some(AlertDescription::BadCertificate),
            46 => Some(AlertDescription::CertificateUnknown),
            47 => Some(AlertDescription::IllegalParameter),
            50 => Some(AlertDescription::DecodeError),
            51 => Some(AlertDescription::DecryptError),
            70 => Some(AlertDescription::ProtocolVersion),
            80 => Some(AlertDescription::InternalError),
            90 => Some(AlertDescription::UserCanceled),
            109 => Some(AlertDescription::MissingExtension),
            110 => Some(AlertDescription::UnsupportedExtension),
            115 => Some(AlertDescription::UnknownPskIdentity),
            120 => Some(AlertDescription::NoApplicationProtocol),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this alert is fatal.
    ///
    /// All alerts except CloseNotify and UserCanceled are fatal in TLS 1.3.
    pub const fn is_fatal(self) -> bool {
        !matches!(
            self,
            AlertDescription::CloseNotify | AlertDescription::UserCanceled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_description_conversion() {
        assert_eq!(AlertDescription::from_u8(0), Some(AlertDescription::CloseNotify));
        assert_eq!(
            AlertDescription::from_u8(40),
            Some(AlertDescription::HandshakeFailure)
        );
        assert_eq!(AlertDescription::from_u8(255), None);
        assert_eq!(AlertDescription::BadRecordMac.to_u8(), 20);
    }

    #[test]
    fn test_alert_fatality() {
        assert!(!AlertDescription::CloseNotify.is_fatal());
        assert!(!AlertDescription::UserCanceled.is_fatal());
        assert!(AlertDescription::BadRecordMac.is_fatal());
        assert!(AlertDescription::DecodeError.is_fatal());
    }

    #[test]
    fn test_error_alert_mapping() {
        assert_eq!(
            Error::BadRecordMac.alert_description(),
            Some(AlertDescription::BadRecordMac)
        );
        assert_eq!(
            Error::DecodeError("x".into()).alert_description(),
            Some(AlertDescription::DecodeError)
        );
        assert_eq!(
            Error::UnexpectedMessage("x".into()).alert_description(),
            Some(AlertDescription::UnexpectedMessage)
        );
        assert_eq!(Error::ProtocolVersion.alert_description(), Some(AlertDescription::ProtocolVersion));
        assert_eq!(Error::IoError("eof".into()).alert_description(), None);
    }
}
