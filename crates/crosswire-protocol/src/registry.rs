//! The message type registry: name → descriptor.
//!
//! Every message type that can appear on the wire is registered under a
//! process-unique name. The descriptor carries the type's optional
//! compression level and a type-erased deserialization hook, so the
//! framing layer can rehydrate a payload without knowing the concrete
//! type at compile time.
//!
//! Registration is explicit: a startup-time call (or a registration
//! source that [`TypeRegistry::refresh`] can re-run after more modules
//! are loaded) — never runtime introspection. This keeps registration
//! order and identity deterministic and testable.
//!
//! # Concurrency note
//!
//! The registry is populated before traffic starts and is read-mostly
//! afterward. Lookups take a read lock; `refresh` builds a complete
//! replacement map and swaps it in under the write lock rather than
//! mutating in place, so readers never observe a half-rebuilt registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use crate::{Codec, ProtocolError};

/// A decoded message body with its concrete type erased.
///
/// Downcast with [`DecodedMessage::get`](crate::DecodedMessage::get).
pub type DynMessage = Arc<dyn Any + Send + Sync>;

/// A closure producing descriptors, re-runnable by [`TypeRegistry::refresh`].
pub type RegistrationSource =
    Arc<dyn Fn() -> Vec<MessageDescriptor> + Send + Sync>;

/// The registered metadata for one message type.
///
/// Immutable after registration. The name must be globally unique within
/// a process; by convention it must not contain the wire separator byte
/// `b'*'` (not enforced structurally — a name containing it would simply
/// decode under a shorter name and miss the registry).
#[derive(Clone)]
pub struct MessageDescriptor {
    name: String,
    compression: Option<u32>,
    decode: Arc<dyn Fn(&[u8]) -> Result<DynMessage, ProtocolError> + Send + Sync>,
}

impl MessageDescriptor {
    /// Builds a descriptor for `T`, decoding payloads with `codec`.
    ///
    /// The codec is captured by the deserialization hook, so the codec
    /// choice is fixed at registration time — which matches how a
    /// process speaks exactly one body format on the wire.
    pub fn new<T, C>(name: impl Into<String>, codec: C) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
        C: Codec + Clone,
    {
        Self {
            name: name.into(),
            compression: None,
            decode: Arc::new(move |payload| {
                codec
                    .decode::<T>(payload)
                    .map(|value| Arc::new(value) as DynMessage)
            }),
        }
    }

    /// Opts this type into payload compression at the given level.
    ///
    /// Levels above [`crate::compress::MAX_LEVEL`] are clamped at
    /// compression time.
    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Some(level);
        self
    }

    /// The type's process-unique wire name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compression level, if this type opted in.
    pub fn compression(&self) -> Option<u32> {
        self.compression
    }

    /// Runs the deserialization hook on an (already decompressed) payload.
    pub fn decode_value(
        &self,
        payload: &[u8],
    ) -> Result<DynMessage, ProtocolError> {
        (self.decode)(payload)
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDescriptor")
            .field("name", &self.name)
            .field("compression", &self.compression)
            .finish_non_exhaustive()
    }
}

/// Process-wide mapping from message type names to descriptors.
///
/// Constructed once at startup and passed by `Arc` to every component
/// that needs lookups — deliberately not ambient global state.
pub struct TypeRegistry {
    descriptors: RwLock<HashMap<String, MessageDescriptor>>,
    sources: RwLock<Vec<RegistrationSource>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Registers a descriptor. First registration for a name wins;
    /// later duplicates are silent no-ops (logged at debug, since a real
    /// collision would otherwise be invisible).
    ///
    /// Returns `true` if the descriptor was inserted.
    pub fn register(&self, descriptor: MessageDescriptor) -> bool {
        let mut map = self
            .descriptors
            .write()
            .expect("type registry lock poisoned");
        if map.contains_key(descriptor.name()) {
            tracing::debug!(
                name = descriptor.name(),
                "duplicate message type registration ignored"
            );
            return false;
        }
        map.insert(descriptor.name().to_string(), descriptor);
        true
    }

    /// Adds a registration source and registers its descriptors now.
    ///
    /// Sources are the re-runnable unit of registration: [`refresh`]
    /// rebuilds the registry from all sources, so anything that must
    /// survive a refresh belongs in one.
    ///
    /// [`refresh`]: TypeRegistry::refresh
    pub fn register_source(&self, source: RegistrationSource) {
        for descriptor in source() {
            self.register(descriptor);
        }
        self.sources
            .write()
            .expect("type registry lock poisoned")
            .push(source);
    }

    /// Rebuilds the registry from all registration sources.
    ///
    /// Intended to be called once at startup and optionally again after
    /// dynamically loading additional modules (register their source
    /// first). A complete replacement map is built and then swapped in
    /// atomically, so concurrent lookups see either the old or the new
    /// registry, never an intermediate state.
    ///
    /// Descriptors added via [`register`](TypeRegistry::register) alone,
    /// without a backing source, do not survive a refresh.
    pub fn refresh(&self) {
        let sources = self
            .sources
            .read()
            .expect("type registry lock poisoned")
            .clone();

        let mut rebuilt = HashMap::new();
        for source in &sources {
            for descriptor in source() {
                // First wins, in source registration order.
                rebuilt
                    .entry(descriptor.name().to_string())
                    .or_insert(descriptor);
            }
        }

        let count = rebuilt.len();
        *self
            .descriptors
            .write()
            .expect("type registry lock poisoned") = rebuilt;
        tracing::debug!(count, "type registry refreshed");
    }

    /// Looks up a descriptor by name. O(1).
    pub fn lookup(&self, name: &str) -> Option<MessageDescriptor> {
        self.descriptors
            .read()
            .expect("type registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .expect("type registry lock poisoned")
            .len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
