//! Error types for the session layer.

use streambridge_transport::SessionId;

/// Errors that can occur while managing session contexts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session was never opened or has already been torn down.
    /// Its context cannot be created or looked up any more.
    #[error("session {0} is not live")]
    NotLive(SessionId),

    /// The session is already live.
    #[error("session {0} is already open")]
    AlreadyOpen(SessionId),

    /// The arena is at capacity and cannot hold another context.
    #[error("failed to allocate context for session {0}")]
    AllocationFailed(SessionId),
}
