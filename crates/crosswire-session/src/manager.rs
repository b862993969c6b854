//! The client manager: the per-server connection lifecycle state machine.
//!
//! Every peer a transport accepts moves through three states:
//!
//! ```text
//!   PendingAuth ──(first message passes validation)──→ Connected
//!        │                                                 │
//!        │ (drop / rejection)                              │ (disconnect,
//!        ▼                                                 ▼  either side)
//!    discarded                                          Removed (terminal)
//! ```
//!
//! The manager owns the pending and connected sets, the ordered roster,
//! and the bidirectional identifier ↔ connection maps, and it classifies
//! every disconnect with two flags:
//!
//! - `was_manual` — the server side initiated the close (a kick) before
//!   the transport reported the drop.
//! - `was_waited` — this removal was already processed; a duplicate
//!   notification must not touch the roster again, or it could evict a
//!   newer connection that reused the same identifier value.
//!
//! # Concurrency note
//!
//! `ClientManager` is NOT thread-safe by itself — plain `HashMap`s, no
//! interior locking. Transports deliver connect/message/disconnect
//! callbacks from their own threads with no ordering guarantees, so ALL
//! access must be serialized through one mutex (the facade wraps the
//! manager in a single `Mutex`). Keeping the locking outside makes the
//! state machine itself deterministic and directly testable.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crosswire_protocol::DecodedMessage;

use crate::{Authenticator, SessionConfig, SessionError};

/// Invoked exactly once with the outcome of a peer's pending phase.
pub type AdmissionCallback = Box<dyn FnOnce(bool) + Send>;

/// How many processed-removal tombstones to retain.
///
/// Tombstones let a duplicate disconnect notification be recognized (and
/// reported with `was_waited = true`) instead of mistaken for a newer
/// connection. Recycled FIFO so the set stays bounded on long-running
/// servers.
const REMOVAL_TOMBSTONES: usize = 256;

/// A peer accepted by the transport but not yet admitted.
struct PendingClient<I> {
    identifier: I,
    on_result: AdmissionCallback,
}

/// Outcome of [`ClientManager::verify_first_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome<I> {
    /// Validation passed; the peer is now on the roster.
    Promoted(I),
    /// Validation failed; the connection was closed and the pending
    /// entry discarded.
    Rejected(I),
    /// The connection was not in the pending set.
    NotWaiting,
}

/// Outcome of [`ClientManager::client_disconnected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnection<I> {
    /// A pending peer dropped before authenticating. From the
    /// application's perspective it never existed; no event fires.
    PendingDropped(I),
    /// A connected peer left the roster (or a duplicate notification
    /// for one that already had).
    Removed {
        identifier: I,
        was_waited: bool,
        was_manual: bool,
    },
    /// The connection was never pending, connected, or recently removed.
    Unknown,
}

/// Tracks every peer's lifecycle on one server.
///
/// Generic over the identifier type `I` (needs equality and hashing) and
/// the connection-handle type `C` (needs only identity comparison, which
/// its `Eq`/`Hash` impls are expected to provide). The manager never
/// owns transport state — `C` is an opaque handle it stores, compares,
/// and hands to the injected closer.
pub struct ClientManager<I, C> {
    config: SessionConfig,
    authenticator: Option<Arc<dyn Authenticator<I>>>,

    /// Called when the manager itself must tear a connection down
    /// (rejection, or a transport-reported drop the server didn't
    /// initiate). Closing an already-dead connection must be harmless.
    closer: Box<dyn Fn(&C) + Send + Sync>,

    /// Peers awaiting their first (auth) message, keyed by connection.
    ///
    /// There is deliberately no deadline here: a peer that never sends
    /// its first message stays pending until its transport link dies.
    pending: HashMap<C, PendingClient<I>>,

    /// Admitted peers, with the reverse map kept in sync.
    connected: HashMap<C, I>,
    connections: HashMap<I, C>,

    /// Connection order of every admitted peer. Never contains
    /// duplicates.
    roster: Vec<I>,

    /// Tombstones for already-processed removals (see
    /// [`REMOVAL_TOMBSTONES`]).
    waited: HashMap<C, I>,
    waited_order: VecDeque<C>,

    /// Connections whose close was server-initiated (kick).
    manual: HashSet<C>,

    /// Subscribers, notified synchronously in registration order on the
    /// thread that detected the event.
    on_connected: Vec<Box<dyn Fn(&I, &C) + Send + Sync>>,
    on_removed: Vec<Box<dyn Fn(&I, &C, bool, bool) + Send + Sync>>,
}

impl<I, C> ClientManager<I, C>
where
    I: Clone + Eq + Hash + fmt::Debug + 'static,
    C: Clone + Eq + Hash,
{
    /// Creates an empty manager with a no-op closer.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            authenticator: None,
            closer: Box::new(|_| {}),
            pending: HashMap::new(),
            connected: HashMap::new(),
            connections: HashMap::new(),
            roster: Vec::new(),
            waited: HashMap::new(),
            waited_order: VecDeque::new(),
            manual: HashSet::new(),
            on_connected: Vec::new(),
            on_removed: Vec::new(),
        }
    }

    /// Installs the first-message validator.
    pub fn with_authenticator(
        mut self,
        authenticator: Arc<dyn Authenticator<I>>,
    ) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Installs the connection closer.
    pub fn with_closer(
        mut self,
        closer: impl Fn(&C) + Send + Sync + 'static,
    ) -> Self {
        self.closer = Box::new(closer);
        self
    }

    /// Subscribes to promotions. Subscribers run synchronously, in
    /// registration order, while the manager's lock is held.
    pub fn on_client_connected(
        &mut self,
        subscriber: impl Fn(&I, &C) + Send + Sync + 'static,
    ) {
        self.on_connected.push(Box::new(subscriber));
    }

    /// Subscribes to removals. Arguments: identifier, connection,
    /// `was_waited`, `was_manual`.
    pub fn on_client_removed(
        &mut self,
        subscriber: impl Fn(&I, &C, bool, bool) + Send + Sync + 'static,
    ) {
        self.on_removed.push(Box::new(subscriber));
    }

    /// Registers a peer the transport just accepted.
    ///
    /// When authentication is not required it is promoted immediately
    /// and this returns `true`. Otherwise the peer sits in the pending
    /// set until [`verify_first_message`](Self::verify_first_message).
    ///
    /// `on_result` fires exactly once for this peer's pending phase —
    /// on promotion (`true`) or rejection (`false`). A pending peer
    /// whose link drops before any verdict never has it invoked; the
    /// connection is already gone.
    pub fn add_pending(
        &mut self,
        identifier: I,
        conn: C,
        on_result: impl FnOnce(bool) + Send + 'static,
    ) -> bool {
        let on_result: AdmissionCallback = Box::new(on_result);

        if self.connected.contains_key(&conn) {
            tracing::warn!(
                ?identifier,
                "add_pending for an already-connected handle ignored"
            );
            on_result(false);
            return false;
        }

        if !self.config.require_auth {
            self.promote(identifier, conn, on_result);
            return true;
        }

        tracing::debug!(?identifier, "client pending authentication");
        if let Some(superseded) = self.pending.insert(
            conn,
            PendingClient {
                identifier,
                on_result,
            },
        ) {
            // The handle was re-registered before its first message;
            // the earlier admission can no longer succeed.
            (superseded.on_result)(false);
        }
        false
    }

    /// Is this connection awaiting its first (auth) message?
    pub fn is_waiting(&self, conn: &C) -> bool {
        self.pending.contains_key(conn)
    }

    /// Is this connection an admitted roster member?
    pub fn is_present(&self, conn: &C) -> bool {
        self.connected.contains_key(conn)
    }

    /// Runs the injected validator against a pending peer's first
    /// decoded message and promotes or rejects accordingly.
    ///
    /// Only meaningful while the peer is pending; otherwise returns
    /// [`VerifyOutcome::NotWaiting`]. A validator error is treated
    /// exactly like a `false` verdict: the connection is closed, the
    /// pending entry discarded, and no connect event fires.
    pub fn verify_first_message(
        &mut self,
        conn: &C,
        message: &DecodedMessage,
    ) -> VerifyOutcome<I> {
        let Some(pending) = self.pending.remove(conn) else {
            return VerifyOutcome::NotWaiting;
        };

        let verdict = self
            .authenticator
            .as_ref()
            .ok_or(SessionError::MissingAuthenticator)
            .and_then(|auth| auth.validate(&pending.identifier, message));

        let admitted = match verdict {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::warn!(
                    identifier = ?pending.identifier,
                    error = %e,
                    "validator failed; rejecting client"
                );
                false
            }
        };

        if admitted {
            let identifier = pending.identifier.clone();
            self.promote(pending.identifier, conn.clone(), pending.on_result);
            VerifyOutcome::Promoted(identifier)
        } else {
            tracing::info!(
                identifier = ?pending.identifier,
                "client failed authentication"
            );
            (self.closer)(conn);
            (pending.on_result)(false);
            VerifyOutcome::Rejected(pending.identifier)
        }
    }

    /// Handles a transport disconnect notification.
    ///
    /// - Still pending: discarded silently — a client that disconnects
    ///   before completing auth never existed for the application.
    /// - Connected: transitions to Removed. The manager closes the
    ///   connection itself unless the close was server-initiated
    ///   ([`mark_manual_close`](Self::mark_manual_close)), and removes
    ///   the identifier from the roster unless this is a duplicate
    ///   notification (`was_waited`).
    ///
    /// Removal subscribers are notified on every `Removed` outcome,
    /// duplicates included.
    pub fn client_disconnected(&mut self, conn: &C) -> Disconnection<I> {
        if let Some(pending) = self.pending.remove(conn) {
            tracing::debug!(
                identifier = ?pending.identifier,
                "pending client dropped before authenticating"
            );
            return Disconnection::PendingDropped(pending.identifier);
        }

        if let Some(identifier) = self.connected.remove(conn) {
            let was_manual = self.manual.remove(conn);
            if !was_manual {
                // The transport only told us the link is dead, not that
                // it was torn down; finish the job.
                (self.closer)(conn);
            }

            self.roster.retain(|id| id != &identifier);
            if self.connections.get(&identifier) == Some(conn) {
                self.connections.remove(&identifier);
            }
            self.remember_removal(conn.clone(), identifier.clone());

            tracing::info!(?identifier, was_manual, "client removed");
            for subscriber in &self.on_removed {
                subscriber(&identifier, conn, false, was_manual);
            }
            return Disconnection::Removed {
                identifier,
                was_waited: false,
                was_manual,
            };
        }

        if let Some(identifier) = self.waited.remove(conn) {
            // Duplicate notification for a removal we already processed.
            // The roster must not be touched: the identifier value may
            // by now belong to a newer connection.
            self.waited_order.retain(|c| c != conn);
            let was_manual = self.manual.remove(conn);
            tracing::debug!(
                ?identifier,
                "duplicate disconnect notification for removed client"
            );
            for subscriber in &self.on_removed {
                subscriber(&identifier, conn, true, was_manual);
            }
            return Disconnection::Removed {
                identifier,
                was_waited: true,
                was_manual,
            };
        }

        Disconnection::Unknown
    }

    /// Flags a connection whose close the server is about to initiate,
    /// so the eventual disconnect notification reports
    /// `was_manual = true`. Called by the kick path before closing.
    pub fn mark_manual_close(&mut self, conn: &C) {
        self.manual.insert(conn.clone());
    }

    /// Resolves a connection to its identifier (connected or pending).
    pub fn identifier_for(&self, conn: &C) -> Option<&I> {
        self.connected
            .get(conn)
            .or_else(|| self.pending.get(conn).map(|p| &p.identifier))
    }

    /// Resolves an identifier to its connection (connected peers only).
    pub fn connection_for(&self, identifier: &I) -> Option<&C> {
        self.connections.get(identifier)
    }

    /// The current roster, in connection order.
    pub fn roster(&self) -> &[I] {
        &self.roster
    }

    /// Connection handles for every roster member, in roster order.
    pub fn roster_connections(&self) -> Vec<(I, C)> {
        self.roster
            .iter()
            .filter_map(|id| {
                self.connections
                    .get(id)
                    .map(|conn| (id.clone(), conn.clone()))
            })
            .collect()
    }

    /// Number of admitted peers.
    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Number of peers awaiting authentication.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn promote(&mut self, identifier: I, conn: C, on_result: AdmissionCallback) {
        self.connected.insert(conn.clone(), identifier.clone());
        self.connections.insert(identifier.clone(), conn.clone());
        if !self.roster.contains(&identifier) {
            self.roster.push(identifier.clone());
        }

        tracing::info!(?identifier, "client connected");
        for subscriber in &self.on_connected {
            subscriber(&identifier, &conn);
        }
        on_result(true);
    }

    fn remember_removal(&mut self, conn: C, identifier: I) {
        if self.waited_order.len() >= REMOVAL_TOMBSTONES {
            if let Some(evicted) = self.waited_order.pop_front() {
                self.waited.remove(&evicted);
            }
        }
        self.waited_order.push_back(conn.clone());
        self.waited.insert(conn, identifier);
    }
}

impl<I, C> fmt::Debug for ClientManager<I, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManager")
            .field("pending", &self.pending.len())
            .field("connected", &self.connected.len())
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `ClientManager`.
    //!
    //! Identifiers are `&'static str` and connection handles are `u64`,
    //! which keeps the lifecycle state machine under test without any
    //! transport. Closer and admission callbacks record into shared
    //! vectors so the tests can assert on exactly what fired, and in
    //! what order.

    use super::*;
    use crosswire_protocol::{
        JsonCodec, MessageCodec, MessageDescriptor, TypeRegistry,
    };
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Auth {
        password: String,
    }

    // -- Helpers ----------------------------------------------------------

    /// Builds a real `DecodedMessage` carrying an `Auth` body.
    fn auth_message(password: &str) -> DecodedMessage {
        let registry = std::sync::Arc::new(TypeRegistry::new());
        registry
            .register(MessageDescriptor::new::<Auth, _>("Auth", JsonCodec));
        let codec = MessageCodec::new(registry, JsonCodec);
        let frame = codec
            .encode("Auth", &Auth {
                password: password.into(),
            })
            .unwrap();
        codec.decode(&frame).unwrap()
    }

    /// A validator that admits exactly the password "1234".
    fn password_validator()
    -> Arc<dyn Authenticator<&'static str>> {
        Arc::new(
            |_id: &&'static str, msg: &DecodedMessage| -> Result<bool, SessionError> {
                let auth = msg
                    .get::<Auth>()
                    .ok_or_else(|| {
                        SessionError::AuthFailed("not an Auth message".into())
                    })?;
                Ok(auth.password == "1234")
            },
        )
    }

    /// Shared log of closed connections.
    type CloseLog = std::sync::Arc<Mutex<Vec<u64>>>;

    fn manager_requiring_auth()
    -> (ClientManager<&'static str, u64>, CloseLog) {
        let closed: CloseLog = Default::default();
        let log = std::sync::Arc::clone(&closed);
        let mgr = ClientManager::new(SessionConfig { require_auth: true })
            .with_authenticator(password_validator())
            .with_closer(move |conn: &u64| log.lock().unwrap().push(*conn));
        (mgr, closed)
    }

    fn manager_without_auth()
    -> (ClientManager<&'static str, u64>, CloseLog) {
        let closed: CloseLog = Default::default();
        let log = std::sync::Arc::clone(&closed);
        let mgr = ClientManager::new(SessionConfig {
            require_auth: false,
        })
        .with_closer(move |conn: &u64| log.lock().unwrap().push(*conn));
        (mgr, closed)
    }

    /// Shared log of admission verdicts.
    type ResultLog = std::sync::Arc<Mutex<Vec<bool>>>;

    fn record_into(log: &ResultLog) -> impl FnOnce(bool) + Send + 'static {
        let log = std::sync::Arc::clone(log);
        move |admitted| log.lock().unwrap().push(admitted)
    }

    // =====================================================================
    // add_pending()
    // =====================================================================

    #[test]
    fn test_add_pending_without_auth_promotes_immediately() {
        let (mut mgr, _closed) = manager_without_auth();
        let results: ResultLog = Default::default();

        let promoted = mgr.add_pending("alice", 1, record_into(&results));

        assert!(promoted);
        assert!(mgr.is_present(&1));
        assert!(!mgr.is_waiting(&1));
        assert_eq!(mgr.roster(), &["alice"]);
        assert_eq!(*results.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_add_pending_with_auth_stays_pending() {
        let (mut mgr, _closed) = manager_requiring_auth();
        let results: ResultLog = Default::default();

        let promoted = mgr.add_pending("alice", 1, record_into(&results));

        assert!(!promoted);
        assert!(mgr.is_waiting(&1));
        assert!(!mgr.is_present(&1));
        assert!(mgr.roster().is_empty());
        assert!(
            results.lock().unwrap().is_empty(),
            "no verdict before the first message"
        );
    }

    #[test]
    fn test_add_pending_fires_connected_subscriber_on_promotion() {
        let (mut mgr, _closed) = manager_without_auth();
        let seen: std::sync::Arc<Mutex<Vec<&'static str>>> =
            Default::default();
        let log = std::sync::Arc::clone(&seen);
        mgr.on_client_connected(move |id, _conn| {
            log.lock().unwrap().push(id)
        });

        mgr.add_pending("alice", 1, |_| {});

        assert_eq!(*seen.lock().unwrap(), vec!["alice"]);
    }

    // =====================================================================
    // verify_first_message()
    // =====================================================================

    #[test]
    fn test_verify_correct_password_promotes() {
        let (mut mgr, closed) = manager_requiring_auth();
        let results: ResultLog = Default::default();
        let connects: std::sync::Arc<Mutex<Vec<&'static str>>> =
            Default::default();
        let log = std::sync::Arc::clone(&connects);
        mgr.on_client_connected(move |id, _| log.lock().unwrap().push(id));
        mgr.add_pending("alice", 1, record_into(&results));

        let outcome = mgr.verify_first_message(&1, &auth_message("1234"));

        assert_eq!(outcome, VerifyOutcome::Promoted("alice"));
        assert!(mgr.is_present(&1));
        assert_eq!(mgr.roster(), &["alice"]);
        // Exactly one ClientConnected, exactly one on_result(true).
        assert_eq!(*connects.lock().unwrap(), vec!["alice"]);
        assert_eq!(*results.lock().unwrap(), vec![true]);
        assert!(closed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_verify_wrong_password_rejects_and_closes() {
        let (mut mgr, closed) = manager_requiring_auth();
        let results: ResultLog = Default::default();
        let connects: std::sync::Arc<Mutex<Vec<&'static str>>> =
            Default::default();
        let log = std::sync::Arc::clone(&connects);
        mgr.on_client_connected(move |id, _| log.lock().unwrap().push(id));
        mgr.add_pending("mallory", 1, record_into(&results));

        let outcome = mgr.verify_first_message(&1, &auth_message("wrong"));

        assert_eq!(outcome, VerifyOutcome::Rejected("mallory"));
        assert!(!mgr.is_present(&1));
        assert!(!mgr.is_waiting(&1));
        assert!(mgr.roster().is_empty(), "roster unchanged on rejection");
        assert!(connects.lock().unwrap().is_empty(), "no ClientConnected");
        assert_eq!(*results.lock().unwrap(), vec![false]);
        assert_eq!(*closed.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_verify_validator_error_treated_as_rejection() {
        // The password validator errors on a non-Auth message; that must
        // behave exactly like a `false` verdict.
        let (mut mgr, closed) = manager_requiring_auth();

        // Register a second type so we can decode a non-Auth message.
        #[derive(Serialize, Deserialize)]
        struct Chat {
            text: String,
        }
        let registry = std::sync::Arc::new(TypeRegistry::new());
        registry
            .register(MessageDescriptor::new::<Chat, _>("Chat", JsonCodec));
        let codec = MessageCodec::new(registry, JsonCodec);
        let frame = codec
            .encode("Chat", &Chat { text: "hi".into() })
            .unwrap();
        let not_auth = codec.decode(&frame).unwrap();

        mgr.add_pending("eve", 1, |_| {});
        let outcome = mgr.verify_first_message(&1, &not_auth);

        assert_eq!(outcome, VerifyOutcome::Rejected("eve"));
        assert_eq!(*closed.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_verify_without_authenticator_rejects() {
        let closed: CloseLog = Default::default();
        let log = std::sync::Arc::clone(&closed);
        let mut mgr: ClientManager<&'static str, u64> =
            ClientManager::new(SessionConfig { require_auth: true })
                .with_closer(move |conn: &u64| {
                    log.lock().unwrap().push(*conn)
                });
        mgr.add_pending("alice", 1, |_| {});

        let outcome = mgr.verify_first_message(&1, &auth_message("1234"));

        assert_eq!(outcome, VerifyOutcome::Rejected("alice"));
        assert_eq!(*closed.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_verify_unknown_connection_returns_not_waiting() {
        let (mut mgr, _closed) = manager_requiring_auth();

        let outcome = mgr.verify_first_message(&99, &auth_message("1234"));

        assert_eq!(outcome, VerifyOutcome::NotWaiting);
    }

    // =====================================================================
    // client_disconnected()
    // =====================================================================

    #[test]
    fn test_disconnect_pending_client_is_silent() {
        let (mut mgr, closed) = manager_requiring_auth();
        let removals: std::sync::Arc<Mutex<Vec<&'static str>>> =
            Default::default();
        let log = std::sync::Arc::clone(&removals);
        mgr.on_client_removed(move |id, _, _, _| {
            log.lock().unwrap().push(id)
        });
        mgr.add_pending("alice", 1, |_| {});

        let outcome = mgr.client_disconnected(&1);

        assert_eq!(outcome, Disconnection::PendingDropped("alice"));
        assert!(removals.lock().unwrap().is_empty(), "no removal event");
        assert!(closed.lock().unwrap().is_empty());
        assert!(!mgr.is_waiting(&1));
    }

    #[test]
    fn test_disconnect_connected_client_removes_and_closes() {
        let (mut mgr, closed) = manager_without_auth();
        mgr.add_pending("alice", 1, |_| {});

        let outcome = mgr.client_disconnected(&1);

        assert_eq!(outcome, Disconnection::Removed {
            identifier: "alice",
            was_waited: false,
            was_manual: false,
        });
        assert!(mgr.roster().is_empty());
        // Transport reported the drop; the manager finishes the close.
        assert_eq!(*closed.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_disconnect_after_kick_reports_manual_and_skips_close() {
        let (mut mgr, closed) = manager_without_auth();
        mgr.add_pending("alice", 1, |_| {});

        // The kick path closes the connection itself, after flagging it.
        mgr.mark_manual_close(&1);
        let outcome = mgr.client_disconnected(&1);

        assert_eq!(outcome, Disconnection::Removed {
            identifier: "alice",
            was_waited: false,
            was_manual: true,
        });
        assert!(
            closed.lock().unwrap().is_empty(),
            "server already closed it; the manager must not close again"
        );
    }

    #[test]
    fn test_duplicate_disconnect_reports_waited_and_preserves_roster() {
        // The scenario the `was_waited` flag exists for: the identifier
        // value is reused by a newer connection, then a late duplicate
        // notification arrives for the old one.
        let (mut mgr, _closed) = manager_without_auth();
        mgr.add_pending("alice", 1, |_| {});
        mgr.client_disconnected(&1);

        // Same identifier value comes back on a fresh connection.
        mgr.add_pending("alice", 2, |_| {});
        assert_eq!(mgr.roster(), &["alice"]);

        // Late duplicate for the old connection handle.
        let outcome = mgr.client_disconnected(&1);

        assert_eq!(outcome, Disconnection::Removed {
            identifier: "alice",
            was_waited: true,
            was_manual: false,
        });
        assert_eq!(
            mgr.roster(),
            &["alice"],
            "newer connection must survive the duplicate notification"
        );
        assert!(mgr.is_present(&2));
    }

    #[test]
    fn test_disconnect_unknown_connection_returns_unknown() {
        let (mut mgr, _closed) = manager_without_auth();
        assert_eq!(mgr.client_disconnected(&42), Disconnection::Unknown);
    }

    #[test]
    fn test_removal_subscriber_receives_flags() {
        let (mut mgr, _closed) = manager_without_auth();
        let seen: std::sync::Arc<Mutex<Vec<(&'static str, bool, bool)>>> =
            Default::default();
        let log = std::sync::Arc::clone(&seen);
        mgr.on_client_removed(move |id, _conn, waited, manual| {
            log.lock().unwrap().push((id, waited, manual))
        });

        mgr.add_pending("alice", 1, |_| {});
        mgr.mark_manual_close(&1);
        mgr.client_disconnected(&1);
        mgr.client_disconnected(&1); // duplicate

        assert_eq!(*seen.lock().unwrap(), vec![
            ("alice", false, true),
            ("alice", true, false),
        ]);
    }

    // =====================================================================
    // Lookups & roster
    // =====================================================================

    #[test]
    fn test_identifier_and_connection_lookups() {
        let (mut mgr, _closed) = manager_without_auth();
        mgr.add_pending("alice", 1, |_| {});
        mgr.add_pending("bob", 2, |_| {});

        assert_eq!(mgr.identifier_for(&1), Some(&"alice"));
        assert_eq!(mgr.connection_for(&"bob"), Some(&2));
        assert_eq!(mgr.identifier_for(&99), None);
        assert_eq!(mgr.connection_for(&"carol"), None);
    }

    #[test]
    fn test_identifier_for_covers_pending_clients() {
        let (mut mgr, _closed) = manager_requiring_auth();
        mgr.add_pending("alice", 1, |_| {});

        assert_eq!(mgr.identifier_for(&1), Some(&"alice"));
        // But a pending peer has no routable connection entry yet.
        assert_eq!(mgr.connection_for(&"alice"), None);
    }

    #[test]
    fn test_roster_preserves_connection_order() {
        let (mut mgr, _closed) = manager_without_auth();
        mgr.add_pending("alice", 1, |_| {});
        mgr.add_pending("bob", 2, |_| {});
        mgr.add_pending("carol", 3, |_| {});

        assert_eq!(mgr.roster(), &["alice", "bob", "carol"]);

        mgr.client_disconnected(&2);
        assert_eq!(mgr.roster(), &["alice", "carol"]);
    }

    #[test]
    fn test_roster_connections_pairs_in_order() {
        let (mut mgr, _closed) = manager_without_auth();
        mgr.add_pending("alice", 1, |_| {});
        mgr.add_pending("bob", 2, |_| {});

        assert_eq!(mgr.roster_connections(), vec![
            ("alice", 1),
            ("bob", 2),
        ]);
    }

    #[test]
    fn test_counts_track_lifecycle() {
        let (mut mgr, _closed) = manager_requiring_auth();
        assert_eq!(mgr.pending_count(), 0);
        assert_eq!(mgr.connected_count(), 0);

        mgr.add_pending("alice", 1, |_| {});
        assert_eq!(mgr.pending_count(), 1);

        mgr.verify_first_message(&1, &auth_message("1234"));
        assert_eq!(mgr.pending_count(), 0);
        assert_eq!(mgr.connected_count(), 1);
    }

    #[test]
    fn test_subscribers_notified_in_registration_order() {
        let (mut mgr, _closed) = manager_without_auth();
        let order: std::sync::Arc<Mutex<Vec<u8>>> = Default::default();
        let first = std::sync::Arc::clone(&order);
        let second = std::sync::Arc::clone(&order);
        mgr.on_client_connected(move |_, _| first.lock().unwrap().push(1));
        mgr.on_client_connected(move |_, _| second.lock().unwrap().push(2));

        mgr.add_pending("alice", 1, |_| {});

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    // =====================================================================
    // Full lifecycle
    // =====================================================================

    #[test]
    fn test_full_lifecycle_auth_connect_kick() {
        let (mut mgr, closed) = manager_requiring_auth();
        let results: ResultLog = Default::default();

        // 1. Transport accepts; peer is pending.
        mgr.add_pending("alice", 1, record_into(&results));
        assert!(mgr.is_waiting(&1));

        // 2. First message authenticates.
        mgr.verify_first_message(&1, &auth_message("1234"));
        assert!(mgr.is_present(&1));

        // 3. Server kicks: flag, close (out of band), then the
        //    transport reports the drop.
        mgr.mark_manual_close(&1);
        let outcome = mgr.client_disconnected(&1);

        assert_eq!(outcome, Disconnection::Removed {
            identifier: "alice",
            was_waited: false,
            was_manual: true,
        });
        assert!(mgr.roster().is_empty());
        assert!(closed.lock().unwrap().is_empty());
        assert_eq!(*results.lock().unwrap(), vec![true]);
    }
}
