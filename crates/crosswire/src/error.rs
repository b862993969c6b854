//! Unified error type for the Crosswire facade.

use crosswire_protocol::ProtocolError;
use crosswire_session::SessionError;
use crosswire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `crosswire` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CrosswireError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, unknown type, compression).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authentication).
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let crosswire_err: CrosswireError = err.into();
        assert!(matches!(crosswire_err, CrosswireError::Transport(_)));
        assert!(crosswire_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownType("Ghost".into());
        let crosswire_err: CrosswireError = err.into();
        assert!(matches!(crosswire_err, CrosswireError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("nope".into());
        let crosswire_err: CrosswireError = err.into();
        assert!(matches!(crosswire_err, CrosswireError::Session(_)));
    }
}
