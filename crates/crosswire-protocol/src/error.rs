//! Error types for the protocol layer.
//!
//! Each crate in Crosswire defines its own error enum. A `ProtocolError`
//! always means the problem is in framing, serialization, or compression,
//! not in networking or connection lifecycle.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed input, missing required fields, wrong
    /// data types, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Compressing a payload failed.
    #[error("compress failed: {0}")]
    Compress(#[source] std::io::Error),

    /// Decompressing a payload failed — typically corrupt or truncated
    /// input, or a payload that was never compressed in the first place.
    #[error("decompress failed: {0}")]
    Decompress(#[source] std::io::Error),

    /// The named message type has no descriptor in the registry.
    #[error("unknown message type: {0:?}")]
    UnknownType(String),

    /// The message is invalid at the protocol level even though it
    /// deserialized — e.g., a decoded value of an unexpected type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
