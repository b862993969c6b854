//! # Crosswire
//!
//! Transport-agnostic real-time messaging for multiplayer apps.
//!
//! Crosswire frames typed messages as `name || '*' || payload` on the
//! wire, routes them through a registry of message types, and manages
//! the full client lifecycle on the server: pending admission, optional
//! first-message authentication, roster tracking, and classified
//! disconnects. Roster changes are broadcast to every client
//! automatically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crosswire::prelude::*;
//!
//! # async fn run() -> Result<(), CrosswireError> {
//! let mut server = CrosswireServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//!
//! while let Some(event) = server.next_event().await {
//!     match event {
//!         ServerEvent::ClientConnected { id } => {
//!             tracing::info!(%id, "joined");
//!         }
//!         ServerEvent::Message { id, message, .. } => {
//!             tracing::info!(%id, name = message.type_name(), "message");
//!         }
//!         ServerEvent::ClientRemoved { id, .. } => {
//!             tracing::info!(%id, "left");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod event;
mod handler;
mod server;

pub use client::CrosswireClient;
pub use error::CrosswireError;
pub use event::{ClientEvent, ServerEvent};
pub use server::{CrosswireServer, CrosswireServerBuilder};

/// Installs a process-wide `tracing` subscriber that honors `RUST_LOG`.
///
/// Convenience for binaries and examples; returns quietly if a
/// subscriber is already installed (tests set their own).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::{
        ClientEvent, CrosswireClient, CrosswireError, CrosswireServer,
        CrosswireServerBuilder, ServerEvent,
    };
    pub use crosswire_protocol::{
        Codec, DecodedMessage, JsonCodec, MessageChannel, MessageCodec,
        MessageDescriptor, ServerClientChange, TypeRegistry,
    };
    pub use crosswire_session::{
        Authenticator, SessionConfig, SessionError,
    };
    pub use crosswire_transport::{ClientIdentifier, SendMode};
}
