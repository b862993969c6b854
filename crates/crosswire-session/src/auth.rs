//! Authentication hook for validating a pending peer's first message.
//!
//! Crosswire doesn't decide what a valid first message looks like —
//! that's the application's job (a password field, a signed token, an
//! account lookup). The framework defines the [`Authenticator`] trait
//! and calls it exactly once per pending connection, on the first
//! message that successfully decodes.
//!
//! A closure works too: any
//! `Fn(&I, &DecodedMessage) -> Result<bool, SessionError>` is an
//! authenticator, which keeps tests and simple servers terse.

use crosswire_protocol::DecodedMessage;

use crate::SessionError;

/// Validates a pending peer's first decoded message.
///
/// - `Ok(true)` — admit the peer to the roster.
/// - `Ok(false)` — reject; the connection is closed.
/// - `Err(_)` — treated exactly like `Ok(false)`. A validator that
///   fails while inspecting a message must not admit anyone by
///   accident.
///
/// `Send + Sync + 'static` because the authenticator is shared with the
/// connection handler tasks and lives as long as the server.
pub trait Authenticator<I>: Send + Sync + 'static {
    /// Examines the peer's first message and returns the verdict.
    fn validate(
        &self,
        identifier: &I,
        message: &DecodedMessage,
    ) -> Result<bool, SessionError>;
}

impl<I, F> Authenticator<I> for F
where
    F: Fn(&I, &DecodedMessage) -> Result<bool, SessionError>
        + Send
        + Sync
        + 'static,
{
    fn validate(
        &self,
        identifier: &I,
        message: &DecodedMessage,
    ) -> Result<bool, SessionError> {
        self(identifier, message)
    }
}
