//! Built-in control messages.
//!
//! These are framed and sent by the server facade itself; applications
//! observe them but never construct them.

use crosswire_transport::ClientIdentifier;
use serde::{Deserialize, Serialize};

use crate::{Codec, MessageDescriptor};

/// Roster-change control message.
///
/// Broadcast automatically whenever the server's roster changes. A
/// just-joined client additionally receives a personalized copy with
/// [`local_client`](Self::local_client) set to its own identifier —
/// that is how a client learns who it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerClientChange {
    /// The full roster, in connection order.
    pub connected_clients: Vec<ClientIdentifier>,
    /// Set only on the personalized copy sent to a new client.
    pub local_client: Option<ClientIdentifier>,
}

impl ServerClientChange {
    /// The wire name this control message is registered under.
    pub const NAME: &'static str = "Crosswire.ServerClientChange";

    /// A broadcast copy carrying the current roster.
    pub fn new(connected_clients: Vec<ClientIdentifier>) -> Self {
        Self {
            connected_clients,
            local_client: None,
        }
    }

    /// A personalized copy telling `local` which roster entry it is.
    pub fn personalized(
        connected_clients: Vec<ClientIdentifier>,
        local: ClientIdentifier,
    ) -> Self {
        Self {
            connected_clients,
            local_client: Some(local),
        }
    }
}

/// Descriptors for every built-in message, as a registration source body.
///
/// Both server and client facades register this so control traffic is
/// routable on either end.
pub fn builtin_messages<C: Codec + Clone>(codec: C) -> Vec<MessageDescriptor> {
    vec![MessageDescriptor::new::<ServerClientChange, _>(
        ServerClientChange::NAME,
        codec,
    )]
}

#[cfg(test)]
#[cfg(feature = "json")]
mod tests {
    use super::*;
    use crate::{JsonCodec, MessageCodec, TypeRegistry};
    use std::sync::Arc;

    fn ids(names: &[&str]) -> Vec<ClientIdentifier> {
        names.iter().copied().map(ClientIdentifier::new).collect()
    }

    #[test]
    fn test_server_client_change_round_trip() {
        let registry = Arc::new(TypeRegistry::new());
        registry.register_source(Arc::new(|| builtin_messages(JsonCodec)));
        let codec = MessageCodec::new(registry, JsonCodec);

        let change =
            ServerClientChange::personalized(ids(&["1", "2"]), ClientIdentifier::new("2"));
        let frame = codec
            .encode(ServerClientChange::NAME, &change)
            .expect("should encode");
        let decoded = codec.decode(&frame).expect("should decode");

        assert_eq!(decoded.type_name(), ServerClientChange::NAME);
        assert_eq!(decoded.get::<ServerClientChange>(), Some(&change));
    }

    #[test]
    fn test_broadcast_copy_has_no_local_client() {
        let change = ServerClientChange::new(ids(&["1"]));
        assert!(change.local_client.is_none());
    }
}
