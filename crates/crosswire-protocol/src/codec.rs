//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The framing layer doesn't care HOW a message body is serialized — it
//! just needs something that implements the [`Codec`] trait, and a
//! descriptor telling it which registered type the bytes belong to.
//!
//! Currently we provide [`JsonCodec`] (human-readable, great for
//! debugging). A compact binary codec can be added later without touching
//! the framing or registry code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → safe to share between threads (Tokio may run our
///   code on any thread in its pool).
/// - `'static` → the codec owns everything it needs; required for types
///   captured by registry decode hooks and long-lived tasks.
///
/// `DeserializeOwned` (vs plain `Deserialize`) means the decoded value
/// doesn't borrow from the input bytes — important because the input
/// buffer is transient wire data.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is human-readable, which makes it the right default for
/// development: you can log message payloads and inspect them directly.
/// The tradeoff is size. Behind the `json` feature flag (enabled by
/// default).
///
/// ## Example
///
/// ```rust
/// use crosswire_protocol::{Codec, JsonCodec};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct Auth { password: String }
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Auth { password: "1234".into() }).unwrap();
/// let decoded: Auth = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Auth { password: "1234".into() });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
