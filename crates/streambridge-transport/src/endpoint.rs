//! Listen endpoints and the table they are registered into.

use std::net::SocketAddr;

use crate::{Protocol, TransportError};

/// Listen queue length used when a listener does not ask for one.
pub const DEFAULT_BACKLOG: u32 = 511;

/// Whether this platform can serve datagram listeners.
pub const DATAGRAM_SUPPORTED: bool = cfg!(not(windows));

/// Length of the C socket address structure backing `addr`.
///
/// Two registrations are the same endpoint only when both the address and
/// this length match, so it is kept alongside the address.
pub fn socklen(addr: &SocketAddr) -> u32 {
    match addr {
        SocketAddr::V4(_) => 16,
        SocketAddr::V6(_) => 28,
    }
}

// ---------------------------------------------------------------------------
// ListenOptions
// ---------------------------------------------------------------------------

/// Socket options shared by every endpoint produced from one listener
/// specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    /// `SO_RCVBUF` override. `None` keeps the OS default.
    pub rcvbuf: Option<u32>,

    /// `SO_SNDBUF` override. `None` keeps the OS default.
    pub sndbuf: Option<u32>,

    /// Listen queue length (stream only).
    pub backlog: u32,

    /// Stream or datagram.
    pub protocol: Protocol,

    /// Bound to the unspecified address (`0.0.0.0` / `::`).
    pub wildcard: bool,

    /// IPv6 sockets do not also accept IPv4-mapped traffic.
    pub ipv6only: bool,

    /// TLS termination requested.
    pub tls: bool,

    /// `SO_KEEPALIVE` requested.
    pub keepalive: bool,

    /// PROXY protocol header expected on accepted connections.
    pub proxy_protocol: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            rcvbuf: None,
            sndbuf: None,
            backlog: DEFAULT_BACKLOG,
            protocol: Protocol::Stream,
            wildcard: false,
            ipv6only: true,
            tls: false,
            keepalive: false,
            proxy_protocol: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ListenEndpoint
// ---------------------------------------------------------------------------

/// One concrete, resolved socket address the server will listen on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEndpoint {
    /// The resolved socket address.
    pub addr: SocketAddr,

    /// Length of the socket address structure (see [`socklen`]).
    pub socklen: u32,

    /// Human-readable address used in diagnostics.
    pub addr_text: String,

    /// Name of the server block that owns this endpoint.
    pub server: String,

    /// Options the socket is opened with.
    pub options: ListenOptions,
}

impl ListenEndpoint {
    /// Stream or datagram.
    pub fn protocol(&self) -> Protocol {
        self.options.protocol
    }

    /// Returns `true` if both endpoints name the same socket address.
    pub fn same_address(&self, other: &ListenEndpoint) -> bool {
        self.addr == other.addr && self.socklen == other.socklen
    }
}

// ---------------------------------------------------------------------------
// ListenerTable
// ---------------------------------------------------------------------------

/// Destination of listener registrations during configuration.
pub trait ListenerTable {
    /// Adds one endpoint to the table.
    fn register(&mut self, endpoint: ListenEndpoint) -> Result<(), TransportError>;
}

/// The listener table of one configuration generation.
///
/// Rejects a second endpoint with the same protocol and socket address.
#[derive(Debug, Default)]
pub struct ListenerSet {
    endpoints: Vec<ListenEndpoint>,
}

impl ListenerSet {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// All registered endpoints, in registration order.
    pub fn endpoints(&self) -> &[ListenEndpoint] {
        &self.endpoints
    }

    /// Endpoints owned by the named server block.
    pub fn for_server<'a>(
        &'a self,
        server: &'a str,
    ) -> impl Iterator<Item = &'a ListenEndpoint> + 'a {
        self.endpoints.iter().filter(move |ep| ep.server == server)
    }

    /// Consumes the table, yielding its endpoints.
    pub fn into_endpoints(self) -> Vec<ListenEndpoint> {
        self.endpoints
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl ListenerTable for ListenerSet {
    fn register(&mut self, endpoint: ListenEndpoint) -> Result<(), TransportError> {
        let duplicate = self.endpoints.iter().any(|ep| {
            ep.protocol() == endpoint.protocol() && ep.same_address(&endpoint)
        });
        if duplicate {
            return Err(TransportError::DuplicateEndpoint(endpoint.addr_text));
        }

        tracing::debug!(
            addr = %endpoint.addr,
            protocol = %endpoint.protocol(),
            server = %endpoint.server,
            "listen endpoint registered"
        );
        self.endpoints.push(endpoint);
        Ok(())
    }
}
