//! Events surfaced by the server and client facades.
//!
//! Both facades deliver their events through an unbounded
//! `tokio::sync::mpsc` channel the application polls (via
//! `next_event()`), so application code reacts on its own task at its
//! own pace rather than inside transport callbacks.

use crosswire_protocol::{DecodedMessage, MessageChannel};
use crosswire_transport::ClientIdentifier;

/// Something that happened on a server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A client passed admission and joined the roster.
    ClientConnected { id: ClientIdentifier },

    /// A client left the roster.
    ClientRemoved {
        id: ClientIdentifier,
        /// This is a duplicate notification for a removal that was
        /// already reported.
        was_waited: bool,
        /// The server initiated the close (a kick or shutdown).
        was_manual: bool,
    },

    /// An admitted client sent an application message.
    Message {
        id: ClientIdentifier,
        message: DecodedMessage,
        /// The channel the message arrived on. Transports that carry
        /// no per-message channel metadata (WebSocket) report
        /// [`MessageChannel::Unknown`].
        channel: MessageChannel,
    },
}

/// Something that happened on a client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The server admitted us. Carries our own identifier and the
    /// peers already connected (ourselves excluded).
    JoinedServer {
        local: ClientIdentifier,
        peers: Vec<ClientIdentifier>,
    },

    /// Another client joined the server.
    PeerConnected { id: ClientIdentifier },

    /// Another client left the server.
    PeerDisconnected { id: ClientIdentifier },

    /// The server sent an application message.
    Message {
        message: DecodedMessage,
        channel: MessageChannel,
    },

    /// The connection to the server ended.
    Disconnected,
}
