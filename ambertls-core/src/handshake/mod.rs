//! TLS 1.3 handshake state machines.

pub mod client;
pub mod server;

pub use client::{ClientFlight, ClientHandshake, ClientHandshakeParams, ClientState, ServerHelloOutcome};
pub use server::{ClientHelloOutcome, ServerHandshake, ServerHandshakeParams, ServerState};
