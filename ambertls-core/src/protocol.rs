//! TLS protocol constants and types.

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ProtocolVersion {
    /// TLS 1.0 (0x0301) - only valid as the record-header version of the
    /// very first ClientHello
    Tls10 = 0x0301,

    /// TLS 1.2 (0x0303) - the legacy_version carried by every TLS 1.3
    /// message and record
    Tls12 = 0x0303,

    /// TLS 1.3 (0x0304) - negotiated via supported_versions
    Tls13 = 0x0304,
}

impl ProtocolVersion {
    /// Create from wire format (u16 big-endian).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0301 => Some(ProtocolVersion::Tls10),
            0x0303 => Some(ProtocolVersion::Tls12),
            0x0304 => Some(ProtocolVersion::Tls13),
            _ => None,
        }
    }

    /// Convert to wire format (u16 big-endian).
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Get the protocol name.
    pub const fn name(self) -> &'static str {
        match self {
            ProtocolVersion::Tls10 => "TLS 1.0",
            ProtocolVersion::Tls12 => "TLS 1.2",
            ProtocolVersion::Tls13 => "TLS 1.3",
        }
    }
}

/// TLS content type (RFC 8446 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    /// Invalid content type (0)
    Invalid = 0,

    /// Change cipher spec (20) - middlebox compatibility only
    ChangeCipherSpec = 20,

    /// Alert (21)
    Alert = 21,

    /// Handshake (22)
    Handshake = 22,

    /// Application data (23)
    ApplicationData = 23,
}

impl ContentType {
    /// Create from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ContentType::Invalid),
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this type may appear as the real content type of a
    /// protected record.
    pub const fn is_valid_inner_type(self) -> bool {
        matches!(
            self,
            ContentType::Alert | ContentType::Handshake | ContentType::ApplicationData
        )
    }
}

/// Handshake message type (RFC 8446 Section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeType {
    /// ClientHello (1)
    ClientHello = 1,

    /// ServerHello (2)
    ServerHello = 2,

    /// NewSessionTicket (4)
    NewSessionTicket = 4,

    /// EndOfEarlyData (5)
    EndOfEarlyData = 5,

    /// EncryptedExtensions (8)
    EncryptedExtensions = 8,

    /// Certificate (11)
    Certificate = 11,

    /// CertificateRequest (13)
    CertificateRequest = 13,

    /// CertificateVerify (15)
    CertificateVerify = 15,

    /// Finished (20)
    Finished = 20,

    /// KeyUpdate (24)
    KeyUpdate = 24,

    /// MessageHash (254) - synthetic transcript entry after a
    /// HelloRetryRequest, never sent on the wire
    MessageHash = 254,
}

impl HandshakeType {
    /// Create from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(HandshakeType::ClientHello),
            2 => Some(HandshakeType::ServerHello),
            4 => Some(HandshakeType::NewSessionTicket),
            5 => Some(HandshakeType::EndOfEarlyData),
            8 => Some(HandshakeType::EncryptedExtensions),
            11 => Some(HandshakeType::Certificate),
            13 => Some(HandshakeType::CertificateRequest),
            15 => Some(HandshakeType::CertificateVerify),
            20 => Some(HandshakeType::Finished),
            24 => Some(HandshakeType::KeyUpdate),
            254 => Some(HandshakeType::MessageHash),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// TLS extension type (IANA registry), limited to what this
/// implementation speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ExtensionType {
    /// server_name (0)
    ServerName = 0,

    /// supported_groups (10)
    SupportedGroups = 10,

    /// signature_algorithms (13)
    SignatureAlgorithms = 13,

    /// application_layer_protocol_negotiation (16)
    ApplicationLayerProtocolNegotiation = 16,

    /// record_size_limit (28)
    RecordSizeLimit = 28,

    /// pre_shared_key (41)
    PreSharedKey = 41,

    /// early_data (42)
    EarlyData = 42,

    /// supported_versions (43)
    SupportedVersions = 43,

    /// cookie (44)
    Cookie = 44,

    /// psk_key_exchange_modes (45)
    PskKeyExchangeModes = 45,

    /// key_share (51)
    KeyShare = 51,
}

impl ExtensionType {
    /// Create from wire format (u16).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(ExtensionType::ServerName),
            10 => Some(ExtensionType::SupportedGroups),
            13 => Some(ExtensionType::SignatureAlgorithms),
            16 => Some(ExtensionType::ApplicationLayerProtocolNegotiation),
            28 => Some(ExtensionType::RecordSizeLimit),
            41 => Some(ExtensionType::PreSharedKey),
            42 => Some(ExtensionType::EarlyData),
            43 => Some(ExtensionType::SupportedVersions),
            44 => Some(ExtensionType::Cookie),
            45 => Some(ExtensionType::PskKeyExchangeModes),
            51 => Some(ExtensionType::KeyShare),
            _ => None,
        }
    }

    /// Convert to wire format (u16).
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version() {
        assert_eq!(ProtocolVersion::from_u16(0x0304), Some(ProtocolVersion::Tls13));
        assert_eq!(ProtocolVersion::Tls12.to_u16(), 0x0303);
        assert_eq!(ProtocolVersion::from_u16(0x0302), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(ContentType::from_u8(22), Some(ContentType::Handshake));
        assert_eq!(ContentType::Handshake.to_u8(), 22);
        assert!(ContentType::Alert.is_valid_inner_type());
        assert!(!ContentType::ChangeCipherSpec.is_valid_inner_type());
    }

    #[test]
    fn test_handshake_type() {
        assert_eq!(HandshakeType::from_u8(1), Some(HandshakeType::ClientHello));
        assert_eq!(HandshakeType::from_u8(254), Some(HandshakeType::MessageHash));
        assert_eq!(HandshakeType::from_u8(12), None);
        assert_eq!(HandshakeType::KeyUpdate.to_u8(), 24);
    }

    #[test]
    fn test_extension_type() {
        assert_eq!(ExtensionType::from_u16(51), Some(ExtensionType::KeyShare));
        assert_eq!(ExtensionType::from_u16(28), Some(ExtensionType::RecordSizeLimit));
        assert_eq!(ExtensionType::from_u16(35), None);
    }
}
