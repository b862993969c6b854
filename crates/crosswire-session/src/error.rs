//! Error types for the session layer.

/// Errors that can occur during connection lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The first-message validator rejected the peer or failed while
    /// examining its message. Either way the peer is not admitted.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Authentication is required by configuration but no
    /// [`Authenticator`](crate::Authenticator) was installed. Every
    /// pending peer is rejected until one is.
    #[error("authentication required but no authenticator configured")]
    MissingAuthenticator,
}
