//! Error types for the bridge.
//!
//! Two channels that callers cannot confuse:
//!
//! - [`ScriptError`]: raised into a script during a session. The script
//!   call fails, the session carries on.
//! - [`ConfigFatal`]: raised during configuration. Startup stops.
//!
//! [`BridgeError`] wraps both, plus the sub-crate errors, for code that
//! drives the whole server.

use streambridge_listen::ListenError;
use streambridge_session::SessionError;
use streambridge_transport::TransportError;

/// A recoverable error raised by a session-phase bridge call.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The operation is not available in the current phase.
    #[error("{0}")]
    PhaseViolation(&'static str),

    /// A script argument was missing or of the wrong kind.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session context could not be provided.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The Lua engine reported an error.
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

/// A configuration error. Always aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFatal {
    /// Registering a listener failed.
    #[error("server \"{server}\": {source}")]
    Listen {
        server: String,
        #[source]
        source: ListenError,
    },

    /// A configuration script failed.
    #[error("server \"{server}\": configuration script failed: {source}")]
    Script {
        server: String,
        #[source]
        source: mlua::Error,
    },

    /// A script or configuration file could not be read or parsed.
    #[error("failed to load {what}: {reason}")]
    Load { what: String, reason: String },
}

impl ConfigFatal {
    /// The listener error behind this failure, if there is one.
    pub fn listen_error(&self) -> Option<&ListenError> {
        match self {
            Self::Listen { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A transport-level error (bind, accept, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A session-context error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configuration error; the server did not start.
    #[error(transparent)]
    Config(#[from] ConfigFatal),

    /// A script error outside any session.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}
