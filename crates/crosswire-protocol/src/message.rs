//! Message framing: typed value ⇄ `<type-name> '*' <payload>` bytes.
//!
//! Every message on the wire is the UTF-8 type name, one separator byte,
//! and the body serialized by the external [`Codec`] (compressed first if
//! the type's descriptor says so). The name is what routes the payload
//! back to a registered type on the receiving side.
//!
//! Decoding is deliberately forgiving: anything that cannot be matched
//! and rehydrated — unknown name, corrupt payload, failed decompression —
//! comes back as `None`, never as an error or a panic. Foreign or
//! malformed traffic must not be able to take a connection down.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::registry::DynMessage;
use crate::{
    Codec, MessageDescriptor, ProtocolError, TypeRegistry, compress,
};

/// The reserved byte separating the type name from the payload.
///
/// By convention type names must not contain this byte; the framing does
/// not enforce that structurally. A name that does contain it encodes
/// fine but decodes under a shorter name and misses the registry.
pub const SEPARATOR: u8 = b'*';

/// A successfully decoded inbound message plus its metadata.
///
/// Carries the raw frame it was parsed from, the matched type name, and
/// the rehydrated value with its concrete type erased.
#[derive(Clone)]
pub struct DecodedMessage {
    raw: Vec<u8>,
    type_name: String,
    value: DynMessage,
}

impl DecodedMessage {
    /// The complete frame as received, name and separator included.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The registered type name this message matched.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Downcasts the decoded value to its concrete type.
    ///
    /// Returns `None` if `T` is not the type registered under this
    /// message's name.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedMessage")
            .field("type_name", &self.type_name)
            .field("raw_len", &self.raw.len())
            .finish_non_exhaustive()
    }
}

/// Frames typed messages into bytes and parses bytes back.
///
/// Pure per call: encoding and decoding hold no mutable state, so one
/// `MessageCodec` can be shared freely across tasks without locking.
#[derive(Debug, Clone)]
pub struct MessageCodec<C: Codec> {
    registry: Arc<TypeRegistry>,
    codec: C,
}

impl<C: Codec + Clone> MessageCodec<C> {
    /// Creates a codec over the given registry and body serializer.
    pub fn new(registry: Arc<TypeRegistry>, codec: C) -> Self {
        Self { registry, codec }
    }

    /// The registry this codec resolves type names against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Encodes `value` under the registered type `name`.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownType`] if `name` has no descriptor, plus
    /// any serialization or compression failure.
    pub fn encode<T: Serialize>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        let descriptor = self
            .registry
            .lookup(name)
            .ok_or_else(|| ProtocolError::UnknownType(name.to_string()))?;
        self.encode_with(&descriptor, value)
    }

    /// Encodes `value` using an explicit descriptor.
    pub fn encode_with<T: Serialize>(
        &self,
        descriptor: &MessageDescriptor,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = self.codec.encode(value)?;
        if let Some(level) = descriptor.compression() {
            payload = compress::compress(&payload, level)
                .map_err(ProtocolError::Compress)?;
        }

        let name = descriptor.name().as_bytes();
        let mut frame = Vec::with_capacity(name.len() + 1 + payload.len());
        frame.extend_from_slice(name);
        frame.push(SEPARATOR);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Parses an inbound frame back into a typed message.
    ///
    /// Splits on the FIRST separator byte. A frame with no separator is
    /// treated as an empty type name with the whole buffer as payload —
    /// a degenerate fallback that fails the registry lookup unless
    /// something is registered under the empty name.
    ///
    /// Returns `None` for anything unroutable or malformed: unknown type
    /// name, non-UTF-8 name bytes, decompression failure, or a body the
    /// codec rejects. Each drop is logged at debug level.
    pub fn decode(&self, bytes: &[u8]) -> Option<DecodedMessage> {
        let (name_bytes, payload) =
            match bytes.iter().position(|&b| b == SEPARATOR) {
                Some(at) => (&bytes[..at], &bytes[at + 1..]),
                None => (&bytes[..0], bytes),
            };

        let Ok(name) = std::str::from_utf8(name_bytes) else {
            tracing::debug!("dropping frame with non-UTF-8 type name");
            return None;
        };

        let Some(descriptor) = self.registry.lookup(name) else {
            tracing::debug!(name, "dropping frame with unregistered type");
            return None;
        };

        let body;
        let body = if descriptor.compression().is_some() {
            match compress::decompress(payload) {
                Ok(decompressed) => {
                    body = decompressed;
                    body.as_slice()
                }
                Err(e) => {
                    tracing::debug!(
                        name,
                        error = %e,
                        "dropping frame that failed decompression"
                    );
                    return None;
                }
            }
        } else {
            payload
        };

        match descriptor.decode_value(body) {
            Ok(value) => Some(DecodedMessage {
                raw: bytes.to_vec(),
                type_name: name.to_string(),
                value,
            }),
            Err(e) => {
                tracing::debug!(
                    name,
                    error = %e,
                    "dropping frame that failed deserialization"
                );
                None
            }
        }
    }
}

#[cfg(test)]
#[cfg(feature = "json")]
mod tests {
    use super::*;
    use crate::JsonCodec;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Auth {
        password: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Update {
        values: Vec<f32>,
    }

    fn codec_with(descriptors: Vec<MessageDescriptor>) -> MessageCodec<JsonCodec> {
        let registry = Arc::new(TypeRegistry::new());
        for d in descriptors {
            registry.register(d);
        }
        MessageCodec::new(registry, JsonCodec)
    }

    fn auth_codec() -> MessageCodec<JsonCodec> {
        codec_with(vec![MessageDescriptor::new::<Auth, _>("Auth", JsonCodec)])
    }

    // =====================================================================
    // encode()
    // =====================================================================

    #[test]
    fn test_encode_produces_name_separator_payload() {
        // The exact wire layout:
        //   b"Auth" || 0x2A || <serialized {password:"1234"}>
        let codec = auth_codec();
        let frame = codec
            .encode("Auth", &Auth { password: "1234".into() })
            .expect("should encode");

        assert!(frame.starts_with(b"Auth"));
        assert_eq!(frame[4], 0x2A);
        let payload: Auth = serde_json::from_slice(&frame[5..]).unwrap();
        assert_eq!(payload.password, "1234");
    }

    #[test]
    fn test_encode_unregistered_name_returns_error() {
        let codec = auth_codec();
        let result = codec.encode("Bogus.Type", &Auth {
            password: "x".into(),
        });
        assert!(matches!(result, Err(ProtocolError::UnknownType(_))));
    }

    #[test]
    fn test_encode_compressed_type_shrinks_payload() {
        let codec = codec_with(vec![
            MessageDescriptor::new::<Update, _>("Update", JsonCodec)
                .with_compression(6),
        ]);
        let update = Update {
            values: vec![1.0; 500],
        };

        let frame = codec.encode("Update", &update).expect("should encode");
        let plain = serde_json::to_vec(&update).unwrap();

        assert!(frame.starts_with(b"Update"));
        // name + separator + compressed body, well under the plain body.
        assert!(frame.len() < plain.len());
    }

    // =====================================================================
    // decode()
    // =====================================================================

    #[test]
    fn test_decode_round_trip_uncompressed() {
        let codec = auth_codec();
        let original = Auth {
            password: "1234".into(),
        };

        let frame = codec.encode("Auth", &original).unwrap();
        let decoded = codec.decode(&frame).expect("should decode");

        assert_eq!(decoded.type_name(), "Auth");
        assert_eq!(decoded.raw(), frame.as_slice());
        assert_eq!(decoded.get::<Auth>(), Some(&original));
    }

    #[test]
    fn test_decode_round_trip_compressed() {
        let codec = codec_with(vec![
            MessageDescriptor::new::<Update, _>("Update", JsonCodec)
                .with_compression(9),
        ]);
        let original = Update {
            values: vec![2.5; 300],
        };

        let frame = codec.encode("Update", &original).unwrap();
        let decoded = codec.decode(&frame).expect("should decode");

        assert_eq!(decoded.get::<Update>(), Some(&original));
    }

    #[test]
    fn test_decode_unknown_type_returns_none() {
        // A frame carrying a name this process never registered is
        // silently unroutable, not an error.
        let sender = codec_with(vec![
            MessageDescriptor::new::<Auth, _>("Bogus.Type", JsonCodec),
        ]);
        let frame = sender
            .encode("Bogus.Type", &Auth { password: "x".into() })
            .unwrap();

        let receiver = auth_codec();
        assert!(receiver.decode(&frame).is_none());
    }

    #[test]
    fn test_decode_no_separator_returns_none() {
        // No separator ⇒ empty name + whole buffer as payload; nothing
        // is registered under the empty name, so this is unroutable.
        let codec = auth_codec();
        assert!(codec.decode(b"just some bytes with no marker").is_none());
    }

    #[test]
    fn test_decode_empty_name_routes_when_registered() {
        // The degenerate fallback DOES route if someone registered the
        // empty name.
        let codec = codec_with(vec![
            MessageDescriptor::new::<Auth, _>("", JsonCodec),
        ]);
        let decoded = codec
            .decode(br#"{"password":"p"}"#)
            .expect("empty-name registration should route");
        assert_eq!(decoded.type_name(), "");
        assert_eq!(decoded.get::<Auth>().unwrap().password, "p");
    }

    #[test]
    fn test_decode_corrupt_payload_returns_none() {
        let codec = auth_codec();
        assert!(codec.decode(b"Auth*{not json").is_none());
    }

    #[test]
    fn test_decode_truncated_compressed_payload_returns_none() {
        let codec = codec_with(vec![
            MessageDescriptor::new::<Update, _>("Update", JsonCodec)
                .with_compression(6),
        ]);
        let frame = codec
            .encode("Update", &Update { values: vec![1.0; 100] })
            .unwrap();

        let truncated = &frame[..frame.len() - 10];
        assert!(codec.decode(truncated).is_none());
    }

    #[test]
    fn test_decode_non_utf8_name_returns_none() {
        let codec = auth_codec();
        let mut frame = vec![0xFF, 0xFE, SEPARATOR];
        frame.extend_from_slice(br#"{"password":"x"}"#);
        assert!(codec.decode(&frame).is_none());
    }

    #[test]
    fn test_decode_wrong_downcast_returns_none() {
        let codec = auth_codec();
        let frame = codec
            .encode("Auth", &Auth { password: "x".into() })
            .unwrap();
        let decoded = codec.decode(&frame).unwrap();
        assert!(decoded.get::<Update>().is_none());
    }

    #[test]
    fn test_decode_splits_on_first_separator_only() {
        // Payload bytes may legitimately contain the separator; only the
        // first occurrence delimits the name.
        let codec = auth_codec();
        let frame = codec
            .encode("Auth", &Auth { password: "a*b*c".into() })
            .unwrap();
        let decoded = codec.decode(&frame).expect("should decode");
        assert_eq!(decoded.get::<Auth>().unwrap().password, "a*b*c");
    }
}
