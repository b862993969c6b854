//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! WebSocket has no unreliable delivery path, so both [`SendMode`]s are
//! delivered reliably — the 2-tier contract permits that collapse.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    ClientIdentifier, Connection, SendMode, Transport, TransportError,
};

/// Counter for generating unique per-process session ids.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Predicate consulted before an incoming connection is admitted.
///
/// Returning `false` drops the socket before the WebSocket handshake —
/// the peer never becomes a pending client. Analogous to gating acceptance
/// by peer identity on relay transports.
pub type AcceptGate = Arc<dyn Fn(&SocketAddr) -> bool + Send + Sync>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    accept_gate: Option<AcceptGate>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            accept_gate: None,
        })
    }

    /// Installs an accept gate consulted for every incoming socket.
    pub fn with_accept_gate(mut self, gate: AcceptGate) -> Self {
        self.accept_gate = Some(gate);
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;

            if let Some(gate) = &self.accept_gate {
                if !gate(&addr) {
                    tracing::debug!(%addr, "connection rejected by accept gate");
                    drop(stream);
                    continue;
                }
            }

            // Wrap in MaybeTlsStream so server- and client-side handles
            // share one stream type.
            let stream = tokio_tungstenite::MaybeTlsStream::Plain(stream);
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .map_err(|e| {
                    TransportError::AcceptFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        e,
                    ))
                })?;

            let identifier = ClientIdentifier::new(
                NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed).to_string(),
            );
            tracing::debug!(%identifier, %addr, "accepted WebSocket connection");

            return Ok(WebSocketConnection::from_stream(identifier, ws));
        }
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection, server- or client-side.
///
/// Cheaply cloneable; clones share the underlying stream, split into
/// independently locked send and receive halves so a task blocked in
/// `recv()` never stalls sends from other tasks. Equality and hashing
/// are identity — two handles are equal when they wrap the same
/// accepted connection — which is what the lifecycle maps key on.
#[derive(Clone)]
pub struct WebSocketConnection {
    identifier: ClientIdentifier,
    sender: Arc<Mutex<SplitSink<WsStream, Message>>>,
    receiver: Arc<Mutex<SplitStream<WsStream>>>,
}

impl WebSocketConnection {
    fn from_stream(identifier: ClientIdentifier, ws: WsStream) -> Self {
        let (sender, receiver) = ws.split();
        Self {
            identifier,
            sender: Arc::new(Mutex::new(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Connects to a remote WebSocket server (client side).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _resp) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let identifier = ClientIdentifier::new(
            NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed).to_string(),
        );
        tracing::debug!(%identifier, url, "connected to WebSocket server");

        Ok(Self::from_stream(identifier, ws))
    }
}

impl PartialEq for WebSocketConnection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sender, &other.sender)
    }
}

impl Eq for WebSocketConnection {}

impl std::hash::Hash for WebSocketConnection {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.sender) as usize).hash(state);
    }
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(
        &self,
        data: &[u8],
        _mode: SendMode,
    ) -> Result<(), Self::Error> {
        use futures_util::SinkExt;
        // WebSocket is reliable-only; Unreliable degrades to Reliable.
        let msg = Message::Binary(data.to_vec().into());
        self.sender.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = self.receiver.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        use futures_util::SinkExt;
        self.sender.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn identifier(&self) -> &ClientIdentifier {
        &self.identifier
    }
}
