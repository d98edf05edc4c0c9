//! Raw TLS extension framing.
//!
//! `struct { uint16 ext_type; opaque ext_data<0..2^16-1>; }`
//!
//! Extension payloads are interpreted in [`crate::extension_types`]; the
//! same type code decodes differently depending on the message carrying
//! it, so payloads stay opaque at this layer.

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::protocol::ExtensionType;

/// A single extension with its payload left opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Extension type code; kept raw so unknown extensions can be
    /// carried past without failing the parse.
    pub extension_type: u16,

    /// Extension payload
    pub data: Vec<u8>,
}

impl Extension {
    /// Create a new extension.
    pub fn new(extension_type: ExtensionType, data: Vec<u8>) -> Self {
        Self {
            extension_type: extension_type.to_u16(),
            data,
        }
    }

    /// The known extension type, if this implementation speaks it.
    pub fn known_type(&self) -> Option<ExtensionType> {
        ExtensionType::from_u16(self.extension_type)
    }

    /// Encode the extension to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&self.extension_type.to_be_bytes());
        buf.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }
}

/// Ordered extension list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    extensions: Vec<Extension>,
}

impl Extensions {
    /// Create an empty extension list.
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Append an extension.
    pub fn add(&mut self, extension: Extension) {
        self.extensions.push(extension);
    }

    /// Get an extension by type.
    pub fn get(&self, ext_type: ExtensionType) -> Option<&Extension> {
        self.extensions
            .iter()
            .find(|e| e.extension_type == ext_type.to_u16())
    }

    /// Check if an extension is present.
    pub fn has(&self, ext_type: ExtensionType) -> bool {
        self.get(ext_type).is_some()
    }

    /// Iterate over the extensions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.extensions.iter()
    }

    /// Number of extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Remove all extensions of the given type.
    pub fn remove(&mut self, ext_type: ExtensionType) {
        self.extensions.retain(|e| e.extension_type != ext_type.to_u16());
    }

    /// Encode the list with its two-byte total length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for ext in &self.extensions {
            body.extend_from_slice(&ext.encode());
        }
        let mut buf = Vec::with_capacity(2 + body.len());
        buf.extend_from_slice(&(body.len() as u16).to_be_bytes());
        buf.extend_from_slice(&body);
        buf
    }

    /// Decode an extension list from a reader positioned at the length
    /// prefix. Duplicate extension types are fatal.
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let mut body = reader.sub_reader16()?;
        let mut extensions = Vec::new();

        while !body.is_empty() {
            let extension_type = body.take_u16()?;
            let data = body.take_vec16()?.to_vec();
            if extensions.iter().any(|e: &Extension| e.extension_type == extension_type) {
                return Err(Error::IllegalParameter(format!(
                    "duplicate extension {}",
                    extension_type
                )));
            }
            extensions.push(Extension {
                extension_type,
                data,
            });
        }

        Ok(Self { extensions })
    }

    /// Enforce that pre_shared_key, when present, is the last extension
    /// (RFC 8446 Section 4.2.11).
    pub fn check_pre_shared_key_last(&self) -> Result<()> {
        let psk_code = ExtensionType::PreSharedKey.to_u16();
        if let Some(pos) = self.extensions.iter().position(|e| e.extension_type == psk_code) {
            if pos != self.extensions.len() - 1 {
                return Err(Error::IllegalParameter(
                    "pre_shared_key is not the last extension".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_encode_decode() {
        let mut exts = Extensions::new();
        exts.add(Extension::new(ExtensionType::ServerName, vec![1, 2, 3]));
        exts.add(Extension::new(ExtensionType::SupportedVersions, vec![4, 5]));

        let encoded = exts.encode();
        let mut reader = Reader::new(&encoded);
        let decoded = Extensions::decode(&mut reader).unwrap();
        reader.expect_end("extensions").unwrap();

        assert_eq!(decoded.len(), 2);
        assert!(decoded.has(ExtensionType::ServerName));
        assert_eq!(decoded.get(ExtensionType::SupportedVersions).unwrap().data, vec![4, 5]);
    }

    #[test]
    fn test_unknown_extension_carried() {
        // Type 0xFF01 is unknown to this implementation but must parse.
        let raw = [0x00, 0x06, 0xFF, 0x01, 0x00, 0x02, 0xAA, 0xBB];
        let mut reader = Reader::new(&raw);
        let decoded = Extensions::decode(&mut reader).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(decoded.iter().next().unwrap().known_type().is_none());
    }

    #[test]
    fn test_duplicate_extension_fatal() {
        let mut exts = Extensions::new();
        exts.add(Extension::new(ExtensionType::Cookie, vec![1]));
        exts.add(Extension::new(ExtensionType::Cookie, vec![2]));
        let encoded = exts.encode();
        let mut reader = Reader::new(&encoded);
        assert!(matches!(
            Extensions::decode(&mut reader),
            Err(Error::IllegalParameter(_))
        ));
    }

    #[test]
    fn test_pre_shared_key_must_be_last() {
        let mut exts = Extensions::new();
        exts.add(Extension::new(ExtensionType::PreSharedKey, vec![]));
        exts.add(Extension::new(ExtensionType::KeyShare, vec![]));
        assert!(exts.check_pre_shared_key_last().is_err());

        let mut exts = Extensions::new();
        exts.add(Extension::new(ExtensionType::KeyShare, vec![]));
        exts.add(Extension::new(ExtensionType::PreSharedKey, vec![]));
        assert!(exts.check_pre_shared_key_last().is_ok());
    }

    #[test]
    fn test_truncated_extension_rejected() {
        let raw = [0x00, 0x05, 0x00, 0x00, 0x00, 0x04, 0x01];
        let mut reader = Reader::new(&raw);
        assert!(Extensions::decode(&mut reader).is_err());
    }
}
