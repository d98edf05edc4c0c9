//! ServerHello message (RFC 8446 Section 4.1.3).
//!
//! A HelloRetryRequest is a ServerHello whose random equals a fixed
//! SHA-256 sentinel; its extensions decode under the
//! HelloRetryRequest context.

use crate::cipher::CipherSuite;
use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::extensions::Extensions;
use crate::protocol::ProtocolVersion;
use bytes::{BufMut, BytesMut};

/// The HelloRetryRequest sentinel: SHA-256 of "HelloRetryRequest".
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

/// ServerHello message.
///
/// ```text
/// struct {
///     ProtocolVersion legacy_version = 0x0303;
///     Random random;
///     opaque legacy_session_id_echo<0..32>;
///     CipherSuite cipher_suite;
///     uint8 legacy_compression_method = 0;
///     Extension extensions<6..2^16-1>;
/// } ServerHello;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Legacy version, always 0x0303
    pub legacy_version: ProtocolVersion,

    /// Random bytes; the HRR sentinel marks a HelloRetryRequest
    pub random: [u8; 32],

    /// Echo of the client's legacy session ID
    pub legacy_session_id_echo: Vec<u8>,

    /// Selected cipher suite
    pub cipher_suite: CipherSuite,

    /// Extensions
    pub extensions: Extensions,
}

impl ServerHello {
    /// Create a new ServerHello.
    pub fn new(random: [u8; 32], cipher_suite: CipherSuite) -> Self {
        Self {
            legacy_version: ProtocolVersion::Tls12,
            random,
            legacy_session_id_echo: Vec::new(),
            cipher_suite,
            extensions: Extensions::new(),
        }
    }

    /// Create a HelloRetryRequest for the selected cipher suite.
    pub fn hello_retry_request(cipher_suite: CipherSuite) -> Self {
        Self::new(HELLO_RETRY_REQUEST_RANDOM, cipher_suite)
    }

    /// Check whether this ServerHello is a HelloRetryRequest.
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }

    /// Set the legacy session ID echo.
    pub fn with_session_id_echo(mut self, session_id: Vec<u8>) -> Self {
        self.legacy_session_id_echo = session_id;
        self
    }

    /// Set the extensions.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();

        buf.put_u16(self.legacy_version.to_u16());
        buf.put_slice(&self.random);

        if self.legacy_session_id_echo.len() > 32 {
            return Err(Error::InternalError("session ID echo too long".to_string()));
        }
        buf.put_u8(self.legacy_session_id_echo.len() as u8);
        buf.put_slice(&self.legacy_session_id_echo);

        buf.put_u16(self.cipher_suite.to_u16());
        buf.put_u8(0); // legacy_compression_method

        buf.put_slice(&self.extensions.encode());
        Ok(buf.to_vec())
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let version_raw = reader.take_u16()?;
        let legacy_version = ProtocolVersion::from_u16(version_raw).ok_or_else(|| {
            Error::DecodeError(format!("invalid legacy_version 0x{:04x}", version_raw))
        })?;
        if legacy_version != ProtocolVersion::Tls12 {
            return Err(Error::IllegalParameter(
                "ServerHello legacy_version must be 0x0303".to_string(),
            ));
        }

        let mut random = [0u8; 32];
        random.copy_from_slice(reader.take(32)?);

        let legacy_session_id_echo = reader.take_vec8()?.to_vec();
        if legacy_session_id_echo.len() > 32 {
            return Err(Error::DecodeError("session ID echo too long".into()));
        }

        let suite_raw = reader.take_u16()?;
        let cipher_suite = CipherSuite::from_u16(suite_raw).ok_or_else(|| {
            Error::IllegalParameter(format!("server selected unknown suite 0x{:04x}", suite_raw))
        })?;

        let compression = reader.take_u8()?;
        if compression != 0 {
            return Err(Error::IllegalParameter(
                "non-zero legacy_compression_method".to_string(),
            ));
        }

        let extensions = Extensions::decode(&mut reader)?;
        reader.expect_end("ServerHello")?;

        Ok(Self {
            legacy_version,
            random,
            legacy_session_id_echo,
            cipher_suite,
            extensions,
        })
    }
}
