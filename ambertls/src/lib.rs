//! # ambertls
//!
//! A TLS 1.3 (RFC 8446) client and server over any blocking byte-stream
//! transport, with session resumption and 0-RTT early data.
//!
//! ## Client example
//!
//! ```rust,no_run
//! use ambertls::{ClientConfig, Connection, NoVerification};
//! use ambertls_crypto_rustcrypto::RustCryptoProvider;
//! use std::net::TcpStream;
//! use std::sync::Arc;
//!
//! # fn main() -> ambertls::Result<()> {
//! let config = ClientConfig::builder(
//!     Arc::new(RustCryptoProvider::new()),
//!     Arc::new(NoVerification), // pin a key in production
//! )
//! .build()?;
//!
//! let tcp = TcpStream::connect("example.com:443")
//!     .map_err(|e| ambertls::Error::IoError(e.to_string()))?;
//! let mut conn = Connection::connect(tcp, "example.com", config)?;
//! conn.handshake()?;
//! conn.write(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")?;
//! let mut buf = [0u8; 4096];
//! let n = conn.read(&mut buf)?;
//! # let _ = n;
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Server example
//!
//! ```rust,no_run
//! use ambertls::{Connection, ServerConfig};
//! use ambertls_crypto::SignatureScheme;
//! use ambertls_crypto_rustcrypto::RustCryptoProvider;
//! use std::net::TcpListener;
//! use std::sync::Arc;
//!
//! # fn main() -> ambertls::Result<()> {
//! # let (cert_der, key) = (vec![0u8], vec![0u8]);
//! let config = ServerConfig::builder(
//!     Arc::new(RustCryptoProvider::new()),
//!     vec![cert_der],
//!     SignatureScheme::EcdsaSecp256r1Sha256,
//!     key,
//! )
//! .with_session_resumption(true)
//! .build()?;
//!
//! let listener = TcpListener::bind("0.0.0.0:443")
//!     .map_err(|e| ambertls::Error::IoError(e.to_string()))?;
//! for stream in listener.incoming().flatten() {
//!     let mut conn = Connection::accept(stream, config.clone())?;
//!     conn.handshake()?;
//!     // serve the connection
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    unused_qualifications
)]

pub use ambertls_core::{self, cipher, AlertDescription, CipherSuite, Error, Result};
pub use ambertls_crypto;

pub mod client;
pub mod connection;
pub mod server;
pub mod transport;
pub mod verifier;

pub use client::{ClientConfig, ClientConfigBuilder};
pub use connection::Connection;
pub use server::{ServerConfig, ServerConfigBuilder};
pub use transport::{Pipe, Transport};
pub use verifier::{NoVerification, PinnedKeyVerifier};

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
