//! Session layer configuration.

/// Configuration for connection admission behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether a newly accepted peer must authenticate with its first
    /// message before joining the roster.
    ///
    /// When `false`, peers are promoted to the roster the moment the
    /// transport accepts them. When `true`, an
    /// [`Authenticator`](crate::Authenticator) must be installed or
    /// every peer is rejected.
    ///
    /// Default: `false`.
    pub require_auth: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            require_auth: false,
        }
    }
}
