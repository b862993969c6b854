//! Transport abstraction layer for Crosswire.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! different network protocols, plus the [`ClientIdentifier`] handle that
//! adapters mint for every accepted peer.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{AcceptGate, WebSocketConnection, WebSocketTransport};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle identifying a connected peer.
///
/// Constructed by a transport adapter the moment a connection is accepted,
/// from whatever addressing the transport natively has (a numeric session
/// id, a relay identity, ...) rendered as a string. The core never builds
/// one itself — it only stores, compares, and displays identifiers it was
/// handed. Stable for the entire life of the connection.
///
/// Equality and hashing are by the underlying string, which makes the
/// identifier usable as a map key on both ends of the wire. Serde derives
/// let it travel inside roster control messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentifier(String);

impl ClientIdentifier {
    /// Wraps a transport-native key. Called by adapters only.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The 2-tier delivery contract every transport natively supports.
///
/// Richer reliability enumerations (ordered vs sequenced) are collapsed to
/// this pair before a send reaches the transport; adapters that support
/// finer-grained modes may preserve the distinction internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendMode {
    /// Delivered, eventually. Like TCP.
    Reliable,
    /// May be lost. Like UDP.
    Unreliable,
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive bytes.
///
/// Sends and closes may race with the transport tearing the link down on
/// its own; implementations must treat a send or close after teardown as a
/// harmless error surfaced through the error type, never a panic.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer with the requested delivery mode.
    ///
    /// Transports without an unreliable path (e.g., WebSocket) deliver
    /// both modes reliably.
    async fn send(
        &self,
        data: &[u8],
        mode: SendMode,
    ) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the identifier minted for this connection at accept time.
    fn identifier(&self) -> &ClientIdentifier;
}
