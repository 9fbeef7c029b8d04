//! Transport layer for streambridge.
//!
//! Everything that touches socket addresses lives here:
//!
//! - [`SessionId`]: the opaque handle naming one live session
//! - [`Protocol`], [`ListenOptions`], [`ListenEndpoint`]: what a listener is
//! - [`ListenerTable`] / [`ListenerSet`]: where registered endpoints go
//! - [`AddressResolver`] / [`SystemResolver`]: turning `host:port` text
//!   into candidate socket addresses
//! - [`bind`]: materializing an endpoint into a tokio socket
//!
//! The crate never decides *which* listeners exist. That is the
//! registrar's job one layer up; this crate only describes and opens them.

mod bind;
mod endpoint;
mod error;
mod resolve;

pub use bind::{BoundListener, bind};
pub use endpoint::{
    DEFAULT_BACKLOG, DATAGRAM_SUPPORTED, ListenEndpoint, ListenOptions,
    ListenerSet, ListenerTable, socklen,
};
pub use error::TransportError;
pub use resolve::{
    AddressResolver, Resolution, ResolveError, ResolvedAddr, SystemResolver,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating process-unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a session.
///
/// IDs are never reused within a process, so a session that starts after
/// another one was torn down can never observe its predecessor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a `SessionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `SessionId`.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

/// Socket type of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Connection-oriented (TCP).
    #[default]
    Stream,
    /// Datagram (UDP).
    Datagram,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "tcp"),
            Self::Datagram => write!(f, "udp"),
        }
    }
}
