//! Typed extension payloads with context-dependent decoding.
//!
//! A given extension type decodes differently depending on the message
//! that carries it (key_share is a list in ClientHello, a single entry
//! in ServerHello and a bare group in HelloRetryRequest; early_data is
//! empty except in NewSessionTicket). Decoding therefore always takes
//! an [`ExtensionContext`] tag; extensions are never decoded
//! generically.

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::extensions::Extension;
use crate::protocol::{ExtensionType, ProtocolVersion};
use crate::psk::PskKeyExchangeMode;
use ambertls_crypto::{KeyExchangeAlgorithm, SignatureScheme};

/// The message (and HelloRetryRequest disposition) an extension was
/// found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionContext {
    /// ClientHello
    ClientHello,
    /// ServerHello that is not a HelloRetryRequest
    ServerHello,
    /// ServerHello whose random is the HelloRetryRequest sentinel
    HelloRetryRequest,
    /// EncryptedExtensions
    EncryptedExtensions,
    /// NewSessionTicket
    NewSessionTicket,
}

/// One entry of a key_share extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    /// Key exchange group
    pub group: KeyExchangeAlgorithm,

    /// Wire-format public key
    pub key_exchange: Vec<u8>,
}

impl KeyShareEntry {
    /// Create a new entry, checking the share length for the group.
    pub fn new(group: KeyExchangeAlgorithm, key_exchange: Vec<u8>) -> Result<Self> {
        if key_exchange.len() != group.public_key_size() {
            return Err(Error::IllegalParameter(format!(
                "{} key share must be {} bytes, got {}",
                group.name(),
                group.public_key_size(),
                key_exchange.len()
            )));
        }
        Ok(Self { group, key_exchange })
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.group.to_u16().to_be_bytes());
        buf.extend_from_slice(&(self.key_exchange.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.key_exchange);
    }
}

// --- supported_versions (43) ---------------------------------------------

/// Build the ClientHello supported_versions extension offering TLS 1.3.
pub fn supported_versions_client() -> Extension {
    let mut data = Vec::with_capacity(3);
    data.push(2);
    data.extend_from_slice(&ProtocolVersion::Tls13.to_u16().to_be_bytes());
    Extension::new(ExtensionType::SupportedVersions, data)
}

/// Build the ServerHello / HelloRetryRequest selected-version extension.
pub fn supported_versions_server() -> Extension {
    Extension::new(
        ExtensionType::SupportedVersions,
        ProtocolVersion::Tls13.to_u16().to_be_bytes().to_vec(),
    )
}

/// Decode supported_versions in context. Returns the offered (client)
/// or selected (server) raw version codes.
pub fn decode_supported_versions(ext: &Extension, ctx: ExtensionContext) -> Result<Vec<u16>> {
    let mut reader = Reader::new(&ext.data);
    let versions = match ctx {
        ExtensionContext::ClientHello => {
            let mut list = Reader::new(reader.take_vec8()?);
            let mut versions = Vec::new();
            while !list.is_empty() {
                versions.push(list.take_u16()?);
            }
            if versions.is_empty() {
                return Err(Error::DecodeError("empty supported_versions".into()));
            }
            versions
        }
        ExtensionContext::ServerHello | ExtensionContext::HelloRetryRequest => {
            vec![reader.take_u16()?]
        }
        _ => {
            return Err(Error::DecodeError(
                "supported_versions not allowed in this message".into(),
            ))
        }
    };
    reader.expect_end("supported_versions")?;
    Ok(versions)
}

// --- supported_groups (10) -----------------------------------------------

/// Build a supported_groups extension.
pub fn supported_groups(groups: &[KeyExchangeAlgorithm]) -> Extension {
    let mut data = Vec::with_capacity(2 + groups.len() * 2);
    data.extend_from_slice(&((groups.len() * 2) as u16).to_be_bytes());
    for group in groups {
        data.extend_from_slice(&group.to_u16().to_be_bytes());
    }
    Extension::new(ExtensionType::SupportedGroups, data)
}

/// Decode supported_groups, skipping groups this implementation does
/// not speak.
pub fn decode_supported_groups(ext: &Extension) -> Result<Vec<KeyExchangeAlgorithm>> {
    let mut reader = Reader::new(&ext.data);
    let mut list = Reader::new(reader.take_vec16()?);
    reader.expect_end("supported_groups")?;

    let mut groups = Vec::new();
    while !list.is_empty() {
        if let Some(group) = KeyExchangeAlgorithm::from_u16(list.take_u16()?) {
            groups.push(group);
        }
    }
    Ok(groups)
}

// --- signature_algorithms (13) -------------------------------------------

/// Build a signature_algorithms extension.
pub fn signature_algorithms(schemes: &[SignatureScheme]) -> Extension {
    let mut data = Vec::with_capacity(2 + schemes.len() * 2);
    data.extend_from_slice(&((schemes.len() * 2) as u16).to_be_bytes());
    for scheme in schemes {
        data.extend_from_slice(&scheme.to_u16().to_be_bytes());
    }
    Extension::new(ExtensionType::SignatureAlgorithms, data)
}

/// Decode signature_algorithms, skipping unknown schemes.
pub fn decode_signature_algorithms(ext: &Extension) -> Result<Vec<SignatureScheme>> {
    let mut reader = Reader::new(&ext.data);
    let mut list = Reader::new(reader.take_vec16()?);
    reader.expect_end("signature_algorithms")?;

    let mut schemes = Vec::new();
    while !list.is_empty() {
        if let Some(scheme) = SignatureScheme::from_u16(list.take_u16()?) {
            schemes.push(scheme);
        }
    }
    Ok(schemes)
}

// --- key_share (51) ------------------------------------------------------

/// Build the ClientHello key_share extension (one share per offered
/// group).
pub fn key_share_client(entries: &[KeyShareEntry]) -> Extension {
    let mut body = Vec::new();
    for entry in entries {
        entry.encode(&mut body);
    }
    let mut data = Vec::with_capacity(2 + body.len());
    data.extend_from_slice(&(body.len() as u16).to_be_bytes());
    data.extend_from_slice(&body);
    Extension::new(ExtensionType::KeyShare, data)
}

/// Build the ServerHello key_share extension (the selected share).
pub fn key_share_server(entry: &KeyShareEntry) -> Extension {
    let mut data = Vec::new();
    entry.encode(&mut data);
    Extension::new(ExtensionType::KeyShare, data)
}

/// Build the HelloRetryRequest key_share extension (selected group
/// only).
pub fn key_share_hello_retry(group: KeyExchangeAlgorithm) -> Extension {
    Extension::new(ExtensionType::KeyShare, group.to_u16().to_be_bytes().to_vec())
}

/// Decoded key_share payload, by context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyShare {
    /// ClientHello: all offered shares (unknown groups skipped)
    ClientShares(Vec<KeyShareEntry>),
    /// ServerHello: the selected share
    ServerShare(KeyShareEntry),
    /// HelloRetryRequest: the group the client must retry with
    RetryGroup(KeyExchangeAlgorithm),
}

/// Decode key_share in context.
pub fn decode_key_share(ext: &Extension, ctx: ExtensionContext) -> Result<KeyShare> {
    let mut reader = Reader::new(&ext.data);
    let share = match ctx {
        ExtensionContext::ClientHello => {
            let mut list = Reader::new(reader.take_vec16()?);
            let mut entries = Vec::new();
            let mut seen = Vec::new();
            while !list.is_empty() {
                let group_code = list.take_u16()?;
                let key_exchange = list.take_vec16()?;
                if seen.contains(&group_code) {
                    return Err(Error::IllegalParameter(format!(
                        "duplicate key share for group {:#06x}",
                        group_code
                    )));
                }
                seen.push(group_code);
                if let Some(group) = KeyExchangeAlgorithm::from_u16(group_code) {
                    entries.push(KeyShareEntry::new(group, key_exchange.to_vec())?);
                }
            }
            KeyShare::ClientShares(entries)
        }
        ExtensionContext::ServerHello => {
            let group_code = reader.take_u16()?;
            let group = KeyExchangeAlgorithm::from_u16(group_code).ok_or_else(|| {
                Error::IllegalParameter(format!("server selected unknown group {:#06x}", group_code))
            })?;
            let key_exchange = reader.take_vec16()?.to_vec();
            KeyShare::ServerShare(KeyShareEntry::new(group, key_exchange)?)
        }
        ExtensionContext::HelloRetryRequest => {
            let group_code = reader.take_u16()?;
            let group = KeyExchangeAlgorithm::from_u16(group_code).ok_or_else(|| {
                Error::IllegalParameter(format!("retry names unknown group {:#06x}", group_code))
            })?;
            KeyShare::RetryGroup(group)
        }
        _ => {
            return Err(Error::DecodeError(
                "key_share not allowed in this message".into(),
            ))
        }
    };
    reader.expect_end("key_share")?;
    Ok(share)
}

// --- server_name (0) -----------------------------------------------------

/// Build the ClientHello server_name extension (host_name entry).
pub fn server_name(name: &str) -> Extension {
    let mut data = Vec::with_capacity(5 + name.len());
    data.extend_from_slice(&((3 + name.len()) as u16).to_be_bytes());
    data.push(0); // NameType host_name
    data.extend_from_slice(&(name.len() as u16).to_be_bytes());
    data.extend_from_slice(name.as_bytes());
    Extension::new(ExtensionType::ServerName, data)
}

/// Build the empty server_name acknowledgement for
/// EncryptedExtensions.
pub fn server_name_ack() -> Extension {
    Extension::new(ExtensionType::ServerName, Vec::new())
}

/// Decode server_name from a ClientHello; returns the host_name.
pub fn decode_server_name(ext: &Extension) -> Result<String> {
    let mut reader = Reader::new(&ext.data);
    let mut list = Reader::new(reader.take_vec16()?);
    reader.expect_end("server_name")?;

    while !list.is_empty() {
        let name_type = list.take_u8()?;
        let name = list.take_vec16()?;
        if name_type == 0 {
            return String::from_utf8(name.to_vec())
                .map_err(|_| Error::DecodeError("host_name is not UTF-8".into()));
        }
    }
    Err(Error::DecodeError("server_name without host_name entry".into()))
}

// --- record_size_limit (28) ----------------------------------------------

/// Build a record_size_limit extension.
pub fn record_size_limit(limit: u16) -> Extension {
    Extension::new(ExtensionType::RecordSizeLimit, limit.to_be_bytes().to_vec())
}

/// Decode record_size_limit. Limits below 64 are illegal (RFC 8449).
pub fn decode_record_size_limit(ext: &Extension) -> Result<u16> {
    let mut reader = Reader::new(&ext.data);
    let limit = reader.take_u16()?;
    reader.expect_end("record_size_limit")?;
    if limit < 64 {
        return Err(Error::IllegalParameter(format!(
            "record_size_limit {} below minimum",
            limit
        )));
    }
    Ok(limit)
}

// --- early_data (42) -----------------------------------------------------

/// Build the empty early_data indication (ClientHello,
/// EncryptedExtensions).
pub fn early_data() -> Extension {
    Extension::new(ExtensionType::EarlyData, Vec::new())
}

/// Build the NewSessionTicket early_data extension carrying
/// max_early_data_size.
pub fn early_data_ticket(max_early_data_size: u32) -> Extension {
    Extension::new(
        ExtensionType::EarlyData,
        max_early_data_size.to_be_bytes().to_vec(),
    )
}

/// Decode early_data in context. Returns max_early_data_size for
/// NewSessionTicket, `None` for the empty indications.
pub fn decode_early_data(ext: &Extension, ctx: ExtensionContext) -> Result<Option<u32>> {
    let mut reader = Reader::new(&ext.data);
    let result = match ctx {
        ExtensionContext::NewSessionTicket => Some(reader.take_u32()?),
        ExtensionContext::ClientHello | ExtensionContext::EncryptedExtensions => None,
        _ => {
            return Err(Error::DecodeError(
                "early_data not allowed in this message".into(),
            ))
        }
    };
    reader.expect_end("early_data")?;
    Ok(result)
}

// --- cookie (44) ---------------------------------------------------------

/// Build a cookie extension.
pub fn cookie(value: &[u8]) -> Extension {
    let mut data = Vec::with_capacity(2 + value.len());
    data.extend_from_slice(&(value.len() as u16).to_be_bytes());
    data.extend_from_slice(value);
    Extension::new(ExtensionType::Cookie, data)
}

/// Decode a cookie extension.
pub fn decode_cookie(ext: &Extension) -> Result<Vec<u8>> {
    let mut reader = Reader::new(&ext.data);
    let value = reader.take_vec16()?.to_vec();
    reader.expect_end("cookie")?;
    if value.is_empty() {
        return Err(Error::DecodeError("empty cookie".into()));
    }
    Ok(value)
}

// --- psk_key_exchange_modes (45) -----------------------------------------

/// Build a psk_key_exchange_modes extension.
pub fn psk_key_exchange_modes(modes: &[PskKeyExchangeMode]) -> Extension {
    let mut data = Vec::with_capacity(1 + modes.len());
    data.push(modes.len() as u8);
    for mode in modes {
        data.push(mode.to_u8());
    }
    Extension::new(ExtensionType::PskKeyExchangeModes, data)
}

/// Decode psk_key_exchange_modes, skipping unknown modes.
pub fn decode_psk_key_exchange_modes(ext: &Extension) -> Result<Vec<PskKeyExchangeMode>> {
    let mut reader = Reader::new(&ext.data);
    let list = reader.take_vec8()?;
    reader.expect_end("psk_key_exchange_modes")?;

    let modes: Vec<PskKeyExchangeMode> =
        list.iter().filter_map(|&b| PskKeyExchangeMode::from_u8(b)).collect();
    if modes.is_empty() {
        return Err(Error::DecodeError("no known psk_key_exchange_mode".into()));
    }
    Ok(modes)
}

// --- pre_shared_key (41), server form ------------------------------------

/// Build the ServerHello pre_shared_key extension (selected identity
/// index).
pub fn pre_shared_key_server(selected_identity: u16) -> Extension {
    Extension::new(
        ExtensionType::PreSharedKey,
        selected_identity.to_be_bytes().to_vec(),
    )
}

/// Decode the ServerHello pre_shared_key extension.
pub fn decode_pre_shared_key_server(ext: &Extension) -> Result<u16> {
    let mut reader = Reader::new(&ext.data);
    let selected = reader.take_u16()?;
    reader.expect_end("pre_shared_key")?;
    Ok(selected)
}

// --- application_layer_protocol_negotiation (16) -------------------------

/// Build an ALPN extension from protocol names.
pub fn alpn(protocols: &[String]) -> Extension {
    let mut body = Vec::new();
    for protocol in protocols {
        body.push(protocol.len() as u8);
        body.extend_from_slice(protocol.as_bytes());
    }
    let mut data = Vec::with_capacity(2 + body.len());
    data.extend_from_slice(&(body.len() as u16).to_be_bytes());
    data.extend_from_slice(&body);
    Extension::new(ExtensionType::ApplicationLayerProtocolNegotiation, data)
}

/// Decode an ALPN protocol name list.
pub fn decode_alpn(ext: &Extension) -> Result<Vec<String>> {
    let mut reader = Reader::new(&ext.data);
    let mut list = Reader::new(reader.take_vec16()?);
    reader.expect_end("application_layer_protocol_negotiation")?;

    let mut protocols = Vec::new();
    while !list.is_empty() {
        let name = list.take_vec8()?;
        if name.is_empty() {
            return Err(Error::DecodeError("empty ALPN protocol name".into()));
        }
        protocols.push(
            String::from_utf8(name.to_vec())
                .map_err(|_| Error::DecodeError("ALPN protocol name is not UTF-8".into()))?,
        );
    }
    if protocols.is_empty() {
        return Err(Error::DecodeError("empty ALPN protocol list".into()));
    }
    Ok(protocols)
}
