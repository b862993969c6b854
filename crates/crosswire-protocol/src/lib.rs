//! Wire protocol for Crosswire.
//!
//! This crate defines how typed messages become bytes and come back:
//!
//! - **Framing** ([`MessageCodec`], [`DecodedMessage`], [`SEPARATOR`]) —
//!   `UTF8(type-name) || b'*' || payload`, with the name routing the
//!   payload back to a registered type.
//! - **Registry** ([`TypeRegistry`], [`MessageDescriptor`]) — the
//!   process-wide name → descriptor map, populated by explicit
//!   registration.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — the pluggable body
//!   serializer the framing delegates to.
//! - **Compression** ([`compress`]) — per-type zlib payload compression.
//! - **Channels** ([`MessageChannel`]) — the rich reliability model and
//!   its collapse onto the transport's 2-tier send modes.
//! - **Built-ins** ([`ServerClientChange`]) — control messages the
//!   facade sends on the application's behalf.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (peer lifecycle). It doesn't know about connections or rosters — it
//! only knows how to frame and rehydrate messages.
//!
//! ```text
//! Transport (bytes) → Protocol (DecodedMessage) → Session (peer context)
//! ```

mod builtin;
mod channel;
mod codec;
pub mod compress;
mod error;
mod message;
mod registry;

pub use builtin::{ServerClientChange, builtin_messages};
// The identifier and send-mode types originate in the transport layer;
// re-exported here so protocol users need not depend on it directly.
pub use crosswire_transport::{ClientIdentifier, SendMode};
pub use channel::MessageChannel;
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{DecodedMessage, MessageCodec, SEPARATOR};
pub use registry::{
    DynMessage, MessageDescriptor, RegistrationSource, TypeRegistry,
};
