//! `CrosswireClient`: the connecting side of the wire.
//!
//! A client owns one connection to a server, decodes everything that
//! arrives, and surfaces it through a polled event channel. Roster
//! control messages are consumed internally: the client keeps its own
//! copy of the server roster and turns changes into
//! [`ClientEvent::JoinedServer`] / [`ClientEvent::PeerConnected`] /
//! [`ClientEvent::PeerDisconnected`] instead of raw messages.

use std::sync::{Arc, Mutex};

use crosswire_protocol::{
    Codec, JsonCodec, MessageChannel, MessageCodec, ServerClientChange,
    TypeRegistry, builtin_messages,
};
use crosswire_transport::{
    ClientIdentifier, Connection, WebSocketConnection,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ClientEvent, CrosswireError};

/// What the client knows about the server's roster, updated by the
/// receive task and readable from the application's task.
#[derive(Default)]
struct RosterView {
    local: Option<ClientIdentifier>,
    peers: Vec<ClientIdentifier>,
}

/// A connection to a Crosswire server.
///
/// Poll [`next_event()`](Self::next_event) for inbound traffic and
/// roster changes; [`send_message()`](Self::send_message) to talk to
/// the server. Dropping the client tears the connection down.
pub struct CrosswireClient<C: Codec + Clone> {
    conn: WebSocketConnection,
    codec: MessageCodec<C>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    roster: Arc<Mutex<RosterView>>,
    recv_task: JoinHandle<()>,
}

impl CrosswireClient<JsonCodec> {
    /// Connects with the default JSON codec and a fresh registry.
    ///
    /// Application message types go on [`registry()`](Self::registry)
    /// after connecting (inbound frames for unregistered types are
    /// dropped, so register before the server starts sending them).
    pub async fn connect(url: &str) -> Result<Self, CrosswireError> {
        Self::connect_with(url, Arc::new(TypeRegistry::new()), JsonCodec)
            .await
    }
}

impl<C: Codec + Clone> CrosswireClient<C> {
    /// Connects with an explicit registry and body codec.
    pub async fn connect_with(
        url: &str,
        registry: Arc<TypeRegistry>,
        codec: C,
    ) -> Result<Self, CrosswireError> {
        let body_codec = codec.clone();
        registry.register_source(Arc::new(move || {
            builtin_messages(body_codec.clone())
        }));
        let codec = MessageCodec::new(registry, codec);

        let conn = WebSocketConnection::connect(url).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let roster = Arc::new(Mutex::new(RosterView::default()));

        let recv_task = tokio::spawn(run_recv_loop(
            conn.clone(),
            codec.clone(),
            events_tx,
            Arc::clone(&roster),
        ));

        Ok(Self {
            conn,
            codec,
            events: events_rx,
            roster,
            recv_task,
        })
    }

    /// The registry application message types are registered on.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.codec.registry()
    }

    /// Waits for the next client event.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Our own identifier, known once the server has admitted us.
    pub fn local_identifier(&self) -> Option<ClientIdentifier> {
        self.roster.lock().expect("roster lock").local.clone()
    }

    /// The other clients currently on the server, as last reported.
    pub fn peers(&self) -> Vec<ClientIdentifier> {
        self.roster.lock().expect("roster lock").peers.clone()
    }

    /// Sends a typed message to the server.
    ///
    /// # Panics
    /// If `channel` is [`MessageChannel::Unknown`], which is never
    /// sendable.
    pub async fn send_message<T: Serialize>(
        &self,
        type_name: &str,
        value: &T,
        channel: MessageChannel,
    ) -> Result<(), CrosswireError> {
        let mode = channel.send_mode();
        let frame = self.codec.encode(type_name, value)?;
        self.conn.send(&frame, mode).await?;
        Ok(())
    }

    /// Closes the connection.
    pub async fn close(self) -> Result<(), CrosswireError> {
        self.conn.close().await?;
        self.recv_task.abort();
        Ok(())
    }
}

impl<C: Codec + Clone> Drop for CrosswireClient<C> {
    fn drop(&mut self) {
        // The receive task holds its own handle to the connection;
        // stopping it releases the stream.
        self.recv_task.abort();
    }
}

/// Receives frames until the connection ends, translating roster
/// control messages into lifecycle events and everything else into
/// [`ClientEvent::Message`]s.
async fn run_recv_loop<C: Codec + Clone>(
    conn: WebSocketConnection,
    codec: MessageCodec<C>,
    events: mpsc::UnboundedSender<ClientEvent>,
    roster: Arc<Mutex<RosterView>>,
) {
    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "recv error");
                break;
            }
        };

        let Some(message) = codec.decode(&data) else {
            tracing::debug!("dropping undecodable frame");
            continue;
        };

        if message.type_name() == ServerClientChange::NAME {
            if let Some(change) = message.get::<ServerClientChange>() {
                apply_roster_change(change, &roster, &events);
            }
            continue;
        }

        let _ = events.send(ClientEvent::Message {
            message,
            channel: MessageChannel::Unknown,
        });
    }

    let _ = events.send(ClientEvent::Disconnected);
}

/// Folds one roster-change message into the local view and emits the
/// corresponding lifecycle events.
fn apply_roster_change(
    change: &ServerClientChange,
    roster: &Arc<Mutex<RosterView>>,
    events: &mpsc::UnboundedSender<ClientEvent>,
) {
    let mut view = roster.lock().expect("roster lock");

    // The personalized copy that first names us is the admission
    // signal; the peers it lists were already there, so they are
    // reported in JoinedServer rather than as individual connects.
    if view.local.is_none() {
        let Some(local) = change.local_client.clone() else {
            // Roster traffic before we know who we are has nothing to
            // diff against; just record it.
            view.peers = change.connected_clients.clone();
            return;
        };
        view.peers = change
            .connected_clients
            .iter()
            .filter(|id| **id != local)
            .cloned()
            .collect();
        view.local = Some(local.clone());
        let peers = view.peers.clone();
        drop(view);
        let _ = events.send(ClientEvent::JoinedServer { local, peers });
        return;
    }

    let local = view.local.clone();
    let new_peers: Vec<ClientIdentifier> = change
        .connected_clients
        .iter()
        .filter(|id| Some(*id) != local.as_ref())
        .cloned()
        .collect();

    for id in &new_peers {
        if !view.peers.contains(id) {
            let _ = events.send(ClientEvent::PeerConnected { id: id.clone() });
        }
    }
    for id in &view.peers {
        if !new_peers.contains(id) {
            let _ =
                events.send(ClientEvent::PeerDisconnected { id: id.clone() });
        }
    }
    view.peers = new_peers;
}
