//! `CrosswireServer` builder and server operations.
//!
//! This is the entry point for hosting. It ties together all the
//! layers: transport → protocol → session. `build()` binds the
//! listener and spawns the accept loop; the returned server is the
//! application's handle for polling events and sending messages.

use std::net::SocketAddr;
use std::sync::Arc;

use crosswire_protocol::{
    Codec, JsonCodec, MessageChannel, MessageCodec, TypeRegistry,
    builtin_messages,
};
use crosswire_session::{Authenticator, ClientManager, SessionConfig};
use crosswire_transport::{
    AcceptGate, ClientIdentifier, Connection, SendMode, Transport,
    WebSocketConnection, WebSocketTransport,
};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::handler::handle_connection;
use crate::{CrosswireError, ServerEvent};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
/// Interior mutability via `Mutex` where needed.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) codec: MessageCodec<C>,
    pub(crate) clients:
        Mutex<ClientManager<ClientIdentifier, WebSocketConnection>>,
    pub(crate) events: mpsc::UnboundedSender<ServerEvent>,
}

/// Builder for configuring and starting a Crosswire server.
///
/// # Example
///
/// ```rust,ignore
/// let mut server = CrosswireServer::builder()
///     .bind("0.0.0.0:8080")
///     .session_config(SessionConfig { require_auth: true })
///     .authenticator(my_validator)
///     .build()
///     .await?;
/// while let Some(event) = server.next_event().await { /* ... */ }
/// ```
pub struct CrosswireServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    authenticator: Option<Arc<dyn Authenticator<ClientIdentifier>>>,
    accept_gate: Option<AcceptGate>,
    registry: Option<Arc<TypeRegistry>>,
}

impl CrosswireServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            authenticator: None,
            accept_gate: None,
            registry: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Installs the first-message validator used when
    /// [`SessionConfig::require_auth`] is set.
    pub fn authenticator(
        mut self,
        authenticator: impl Authenticator<ClientIdentifier>,
    ) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Installs a predicate consulted for every incoming socket before
    /// the handshake. Rejected peers are dropped silently.
    pub fn accept_gate(
        mut self,
        gate: impl Fn(&SocketAddr) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.accept_gate = Some(Arc::new(gate));
        self
    }

    /// Uses an existing type registry instead of a fresh one.
    ///
    /// Handy when server and client in the same process should share
    /// registrations.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Binds the listener, spawns the accept loop, and returns the
    /// running server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport` as defaults. Built-in
    /// control messages are registered on the registry automatically.
    pub async fn build(
        self,
    ) -> Result<CrosswireServer<JsonCodec>, CrosswireError> {
        let registry =
            self.registry.unwrap_or_else(|| Arc::new(TypeRegistry::new()));
        registry.register_source(Arc::new(|| builtin_messages(JsonCodec)));

        let mut transport = WebSocketTransport::bind(&self.bind_addr).await?;
        if let Some(gate) = self.accept_gate {
            transport = transport.with_accept_gate(gate);
        }
        let local_addr = transport.local_addr().map_err(|e| {
            CrosswireError::Transport(
                crosswire_transport::TransportError::AcceptFailed(e),
            )
        })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // The manager closes connections from synchronous state-machine
        // code; `close()` is async, so the closer fires and forgets.
        let mut clients = ClientManager::new(self.session_config)
            .with_closer(|conn: &WebSocketConnection| {
                let conn = conn.clone();
                tokio::spawn(async move {
                    let _ = conn.close().await;
                });
            });
        if let Some(authenticator) = self.authenticator {
            clients = clients.with_authenticator(authenticator);
        }

        let state = Arc::new(ServerState {
            codec: MessageCodec::new(registry, JsonCodec),
            clients: Mutex::new(clients),
            events: events_tx,
        });

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            run_accept_loop(transport, accept_state).await;
        });

        tracing::info!(%local_addr, "Crosswire server running");
        Ok(CrosswireServer {
            state,
            events: events_rx,
            local_addr,
            accept_task,
        })
    }
}

impl Default for CrosswireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts incoming connections and spawns a handler task for each.
async fn run_accept_loop<C: Codec + Clone>(
    mut transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                let state = Arc::clone(&state);
                tokio::spawn(handle_connection(conn, state));
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

/// A running Crosswire server.
///
/// Poll [`next_event()`](Self::next_event) to observe connects,
/// removals, and inbound messages; use the send/broadcast/kick
/// operations to talk back. Dropping the server stops the accept loop
/// but leaves established connections to wind down on their own; call
/// [`close()`](Self::close) for an orderly shutdown.
pub struct CrosswireServer<C: Codec + Clone> {
    state: Arc<ServerState<C>>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl CrosswireServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> CrosswireServerBuilder {
        CrosswireServerBuilder::new()
    }
}

impl<C: Codec + Clone> CrosswireServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The registry application message types are registered on.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.state.codec.registry()
    }

    /// Waits for the next server event.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// The identifiers of every admitted client, in connection order.
    pub async fn connected_clients(&self) -> Vec<ClientIdentifier> {
        self.state.clients.lock().await.roster().to_vec()
    }

    /// Sends a typed message to one client.
    ///
    /// An identifier with no admitted connection is a no-op, not an
    /// error — the client may have just disconnected.
    ///
    /// # Panics
    /// If `channel` is [`MessageChannel::Unknown`], which is never
    /// sendable.
    pub async fn send_message<T: Serialize>(
        &self,
        id: &ClientIdentifier,
        type_name: &str,
        value: &T,
        channel: MessageChannel,
    ) -> Result<(), CrosswireError> {
        let mode = channel.send_mode();
        let conn = {
            let clients = self.state.clients.lock().await;
            clients.connection_for(id).cloned()
        };
        let Some(conn) = conn else {
            tracing::debug!(%id, "send to unknown client ignored");
            return Ok(());
        };

        let frame = self.state.codec.encode(type_name, value)?;
        conn.send(&frame, mode).await?;
        Ok(())
    }

    /// Sends a typed message to every admitted client, best-effort.
    ///
    /// A failed send is logged and skipped; the remaining recipients
    /// still get the message. `exclude` omits one recipient (typically
    /// the original sender of whatever is being relayed).
    ///
    /// # Panics
    /// If `channel` is [`MessageChannel::Unknown`].
    pub async fn broadcast_message<T: Serialize>(
        &self,
        type_name: &str,
        value: &T,
        channel: MessageChannel,
        exclude: Option<&ClientIdentifier>,
    ) -> Result<(), CrosswireError> {
        let mode = channel.send_mode();
        let frame = self.state.codec.encode(type_name, value)?;
        let recipients =
            self.state.clients.lock().await.roster_connections();

        for (id, conn) in recipients {
            if Some(&id) == exclude {
                continue;
            }
            if let Err(e) = conn.send(&frame, mode).await {
                tracing::debug!(%id, error = %e, "broadcast send failed");
            }
        }
        Ok(())
    }

    /// Disconnects a client.
    ///
    /// The eventual [`ServerEvent::ClientRemoved`] carries
    /// `was_manual = true`. Unknown identifiers are a no-op.
    pub async fn kick_client(
        &self,
        id: &ClientIdentifier,
    ) -> Result<(), CrosswireError> {
        self.kick_inner(id, None).await
    }

    /// Disconnects a client, sending it a final message first.
    ///
    /// The send is best-effort; the kick proceeds even if it fails.
    pub async fn kick_client_with<T: Serialize>(
        &self,
        id: &ClientIdentifier,
        type_name: &str,
        value: &T,
    ) -> Result<(), CrosswireError> {
        let frame = self.state.codec.encode(type_name, value)?;
        self.kick_inner(id, Some(frame)).await
    }

    async fn kick_inner(
        &self,
        id: &ClientIdentifier,
        farewell: Option<Vec<u8>>,
    ) -> Result<(), CrosswireError> {
        let conn = {
            let mut clients = self.state.clients.lock().await;
            let Some(conn) = clients.connection_for(id).cloned() else {
                tracing::debug!(%id, "kick of unknown client ignored");
                return Ok(());
            };
            clients.mark_manual_close(&conn);
            conn
        };

        if let Some(frame) = &farewell {
            if let Err(e) = conn.send(frame, SendMode::Reliable).await {
                tracing::debug!(%id, error = %e, "kick message send failed");
            }
        }

        tracing::info!(%id, "kicking client");
        let _ = conn.close().await;
        Ok(())
    }

    /// Shuts the server down: stops accepting and closes every
    /// connection.
    pub async fn close(self) -> Result<(), CrosswireError> {
        self.close_inner(None).await
    }

    /// Shuts down after broadcasting a final message, best-effort.
    pub async fn close_with<T: Serialize>(
        self,
        type_name: &str,
        value: &T,
    ) -> Result<(), CrosswireError> {
        let frame = self.state.codec.encode(type_name, value)?;
        self.close_inner(Some(frame)).await
    }

    async fn close_inner(
        self,
        farewell: Option<Vec<u8>>,
    ) -> Result<(), CrosswireError> {
        self.accept_task.abort();

        let connections = {
            let mut clients = self.state.clients.lock().await;
            let connections = clients.roster_connections();
            for (_, conn) in &connections {
                clients.mark_manual_close(conn);
            }
            connections
        };

        for (id, conn) in connections {
            if let Some(frame) = &farewell {
                if let Err(e) = conn.send(frame, SendMode::Reliable).await {
                    tracing::debug!(
                        %id, error = %e, "closing message send failed"
                    );
                }
            }
            let _ = conn.close().await;
        }

        tracing::info!("Crosswire server closed");
        Ok(())
    }
}

impl<C: Codec + Clone> Drop for CrosswireServer<C> {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
