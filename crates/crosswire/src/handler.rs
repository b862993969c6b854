//! Per-connection handler: admission, message routing, and removal.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the peer as pending (immediate admission when auth is
//!      not required)
//!   2. Loop: receive frames → decode → route
//!      - undecodable frames are logged and dropped
//!      - a pending peer's first decoded message goes to the validator
//!      - an admitted peer's messages become [`ServerEvent::Message`]s
//!   3. On exit: report the disconnect to the lifecycle manager and
//!      rebroadcast the roster if it changed

use std::sync::Arc;

use crosswire_protocol::{
    Codec, MessageChannel, ServerClientChange,
};
use crosswire_session::VerifyOutcome;
use crosswire_transport::{
    ClientIdentifier, Connection, SendMode, WebSocketConnection,
};

use crate::ServerEvent;
use crate::server::ServerState;

/// Handles a single connection from accept to removal.
pub(crate) async fn handle_connection<C: Codec + Clone>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) {
    let identifier = conn.identifier().clone();
    tracing::debug!(%identifier, "handling new connection");

    // The admission callback fires exactly once per pending phase, on
    // both the immediate-promotion and the verified path.
    let events = state.events.clone();
    let event_id = identifier.clone();
    let promoted = {
        let mut clients = state.clients.lock().await;
        clients.add_pending(identifier.clone(), conn.clone(), move |admitted| {
            if admitted {
                let _ = events
                    .send(ServerEvent::ClientConnected { id: event_id });
            }
        })
    };
    if promoted {
        announce_join(&state, &identifier, &conn).await;
    }

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%identifier, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%identifier, error = %e, "recv error");
                break;
            }
        };

        // Unroutable or malformed frames never take the connection
        // down; they are dropped and the loop continues.
        let Some(message) = state.codec.decode(&data) else {
            tracing::debug!(%identifier, "dropping undecodable frame");
            continue;
        };

        let mut clients = state.clients.lock().await;
        if clients.is_waiting(&conn) {
            match clients.verify_first_message(&conn, &message) {
                VerifyOutcome::Promoted(id) => {
                    drop(clients);
                    announce_join(&state, &id, &conn).await;
                }
                VerifyOutcome::Rejected(id) => {
                    // The manager already closed the connection.
                    tracing::debug!(%id, "client rejected");
                    break;
                }
                VerifyOutcome::NotWaiting => {}
            }
        } else if clients.is_present(&conn) {
            drop(clients);
            // WebSocket frames carry no channel metadata.
            let _ = state.events.send(ServerEvent::Message {
                id: identifier.clone(),
                message,
                channel: MessageChannel::Unknown,
            });
        } else {
            drop(clients);
            // Neither pending nor admitted: a stale handle that was
            // already removed. Nothing left to route.
            let _ = conn.close().await;
            break;
        }
    }

    let outcome = state.clients.lock().await.client_disconnected(&conn);
    if let crosswire_session::Disconnection::Removed {
        identifier,
        was_waited,
        was_manual,
    } = outcome
    {
        let _ = state.events.send(ServerEvent::ClientRemoved {
            id: identifier.clone(),
            was_waited,
            was_manual,
        });
        // A duplicate notification did not change the roster.
        if !was_waited {
            broadcast_roster(&state).await;
        }
    }
}

/// Announces a just-admitted client: the new roster goes to everyone
/// else, and the joiner gets a personalized copy naming itself.
async fn announce_join<C: Codec + Clone>(
    state: &Arc<ServerState<C>>,
    joiner_id: &ClientIdentifier,
    joiner_conn: &WebSocketConnection,
) {
    let (roster, others) = {
        let clients = state.clients.lock().await;
        let roster = clients.roster().to_vec();
        let others: Vec<_> = clients
            .roster_connections()
            .into_iter()
            .filter(|(id, _)| id != joiner_id)
            .collect();
        (roster, others)
    };

    let change = ServerClientChange::new(roster.clone());
    send_change(state, &change, others).await;

    let personalized =
        ServerClientChange::personalized(roster, joiner_id.clone());
    send_change(
        state,
        &personalized,
        vec![(joiner_id.clone(), joiner_conn.clone())],
    )
    .await;
}

/// Rebroadcasts the current roster to every admitted client.
async fn broadcast_roster<C: Codec + Clone>(state: &Arc<ServerState<C>>) {
    let (roster, recipients) = {
        let clients = state.clients.lock().await;
        (clients.roster().to_vec(), clients.roster_connections())
    };
    let change = ServerClientChange::new(roster);
    send_change(state, &change, recipients).await;
}

/// Encodes one roster-change message and sends it to each recipient,
/// best-effort.
async fn send_change<C: Codec + Clone>(
    state: &Arc<ServerState<C>>,
    change: &ServerClientChange,
    recipients: Vec<(ClientIdentifier, WebSocketConnection)>,
) {
    let frame = match state.codec.encode(ServerClientChange::NAME, change) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode roster change");
            return;
        }
    };

    for (id, conn) in recipients {
        if let Err(e) = conn.send(&frame, SendMode::Reliable).await {
            tracing::debug!(%id, error = %e, "roster send failed");
        }
    }
}
