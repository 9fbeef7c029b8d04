//! Error types for listener registration.

use streambridge_transport::{ResolveError, TransportError};

/// Errors raised while registering listeners.
///
/// Every variant is a configuration error: the server must not start
/// with a half-configured listener set.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    /// The listener specification is missing a field or has one of the
    /// wrong kind.
    #[error("invalid listener specification: {0}")]
    InvalidSpec(String),

    /// The address could not be resolved.
    #[error("{source} in \"{address}\" of add_listener")]
    Resolve {
        address: String,
        #[source]
        source: ResolveError,
    },

    /// A flag that cannot be combined with a datagram listener was set.
    #[error("\"{0}\" parameter is incompatible with \"udp\"")]
    Incompatible(&'static str),

    /// The listener table refused an endpoint.
    #[error("can't add stream listener \"{address}\": {source}")]
    Register {
        address: String,
        #[source]
        source: TransportError,
    },
}
