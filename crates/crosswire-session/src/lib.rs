//! Connection lifecycle management for Crosswire.
//!
//! This crate handles the life of a client connection on a server:
//!
//! 1. **Admission** — a transport-accepted peer is held pending until
//!    its first message is validated ([`Authenticator`] trait)
//! 2. **Roster tracking** — knowing who's connected, in connection
//!    order ([`ClientManager`])
//! 3. **Removal** — classifying every disconnect (server kick vs. peer
//!    drop, first notification vs. duplicate)
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)  ← drives the manager from transport callbacks
//!     ↕
//! Session Layer (this crate)  ← the connection state machine
//!     ↕
//! Protocol Layer (below)  ← provides DecodedMessage for validation
//! ```

mod auth;
mod config;
mod error;
mod manager;

pub use auth::Authenticator;
pub use config::SessionConfig;
pub use error::SessionError;
pub use manager::{ClientManager, Disconnection, VerifyOutcome};
