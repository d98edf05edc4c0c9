//! # ambertls Core
//!
//! TLS 1.3 (RFC 8446) protocol core: record layer, wire-format codecs,
//! key schedule and the client/server handshake state machines. This
//! crate is I/O-free; the `ambertls` crate drives it over a transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Public API (ambertls)           │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │      ambertls-core (this crate)         │
//! │  ┌──────────────────────────────────┐   │
//! │  │  Handshake State Machines        │   │
//! │  ├──────────────────────────────────┤   │
//! │  │  Message Codecs / Extensions     │   │
//! │  ├──────────────────────────────────┤   │
//! │  │  Record Layer / AEAD Protection  │   │
//! │  ├──────────────────────────────────┤   │
//! │  │  Key Schedule / Transcript       │   │
//! │  └──────────────────────────────────┘   │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │   ambertls-crypto (trait interface)     │
//! └─────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    unused_qualifications
)]

pub use ambertls_crypto;

pub mod alert;
pub mod cipher;
pub mod codec;
pub mod early_data;
pub mod error;
pub mod extension_types;
pub mod extensions;
pub mod handshake;
pub mod key_schedule;
pub mod keylog;
pub mod messages;
pub mod protocol;
pub mod psk;
pub mod record;
pub mod record_protection;
pub mod ticket_encryption;
pub mod transcript;
pub mod verifier;

pub use cipher::CipherSuite;
pub use error::{AlertDescription, Error, Result};
pub use protocol::{ContentType, HandshakeType, ProtocolVersion};
pub use verifier::CertificateVerifier;
