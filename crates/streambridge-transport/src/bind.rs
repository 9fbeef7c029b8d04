//! Opening registered endpoints as tokio sockets.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol as SockProtocol, SockAddr, Socket, Type};
use tokio::net::{TcpListener, UdpSocket};

use crate::{ListenEndpoint, Protocol, TransportError};

/// A listen socket opened from a [`ListenEndpoint`].
#[derive(Debug)]
pub enum BoundListener {
    /// A listening TCP socket.
    Stream {
        listener: TcpListener,
        endpoint: ListenEndpoint,
    },
    /// A bound UDP socket.
    Datagram {
        socket: UdpSocket,
        endpoint: ListenEndpoint,
    },
}

impl BoundListener {
    /// The endpoint this socket was opened from.
    pub fn endpoint(&self) -> &ListenEndpoint {
        match self {
            Self::Stream { endpoint, .. } | Self::Datagram { endpoint, .. } => endpoint,
        }
    }

    /// The address the socket is actually bound to. Differs from the
    /// endpoint address when port `0` was requested.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        let result = match self {
            Self::Stream { listener, .. } => listener.local_addr(),
            Self::Datagram { socket, .. } => socket.local_addr(),
        };
        result.map_err(|e| self.bind_error(e))
    }

    fn bind_error(&self, source: std::io::Error) -> TransportError {
        TransportError::BindFailed {
            addr: self.endpoint().addr_text.clone(),
            source,
        }
    }
}

/// Opens `endpoint` with its options applied.
///
/// TLS termination and the PROXY protocol are not provided by this
/// server, so endpoints asking for them are refused rather than served
/// in plaintext.
pub async fn bind(endpoint: ListenEndpoint) -> Result<BoundListener, TransportError> {
    if endpoint.options.tls {
        return Err(TransportError::Unsupported {
            option: "ssl",
            addr: endpoint.addr_text,
        });
    }
    if endpoint.options.proxy_protocol {
        return Err(TransportError::Unsupported {
            option: "proxy_protocol",
            addr: endpoint.addr_text,
        });
    }

    let bind_failed = |source| TransportError::BindFailed {
        addr: endpoint.addr_text.clone(),
        source,
    };

    match endpoint.protocol() {
        Protocol::Stream => {
            let listener = open_stream(&endpoint).map_err(bind_failed)?;
            tracing::info!(addr = %endpoint.addr, server = %endpoint.server, "stream listener bound");
            Ok(BoundListener::Stream { listener, endpoint })
        }
        Protocol::Datagram => {
            let socket = open_datagram(&endpoint).map_err(bind_failed)?;
            tracing::info!(addr = %endpoint.addr, server = %endpoint.server, "datagram listener bound");
            Ok(BoundListener::Datagram { socket, endpoint })
        }
    }
}

/// Creates a non-blocking socket for `endpoint` with the options both
/// protocols share: IPv6-only for IPv6 addresses and buffer sizes.
fn open_socket(endpoint: &ListenEndpoint, ty: Type, proto: SockProtocol) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(endpoint.addr), ty, Some(proto))?;
    if endpoint.addr.is_ipv6() {
        socket.set_only_v6(endpoint.options.ipv6only)?;
    }
    if let Some(size) = endpoint.options.rcvbuf {
        socket.set_recv_buffer_size(size as usize)?;
    }
    if let Some(size) = endpoint.options.sndbuf {
        socket.set_send_buffer_size(size as usize)?;
    }
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn open_stream(endpoint: &ListenEndpoint) -> io::Result<TcpListener> {
    let socket = open_socket(endpoint, Type::STREAM, SockProtocol::TCP)?;
    socket.set_reuse_address(true)?;
    if endpoint.options.keepalive {
        socket.set_keepalive(true)?;
    }
    socket.bind(&SockAddr::from(endpoint.addr))?;
    let backlog = i32::try_from(endpoint.options.backlog).unwrap_or(i32::MAX);
    socket.listen(backlog)?;
    TcpListener::from_std(std::net::TcpListener::from(socket))
}

fn open_datagram(endpoint: &ListenEndpoint) -> io::Result<UdpSocket> {
    let socket = open_socket(endpoint, Type::DGRAM, SockProtocol::UDP)?;
    socket.bind(&SockAddr::from(endpoint.addr))?;
    UdpSocket::from_std(std::net::UdpSocket::from(socket))
}
