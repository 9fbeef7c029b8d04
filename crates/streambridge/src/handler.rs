//! Per-session handling: one TCP connection or one UDP datagram.
//!
//! Each session follows the same steps:
//!   1. Read the first payload from the peer, giving up after the
//!      configured read timeout
//!   2. Open a session and seed its context with `peer`, `server` and
//!      `payload`
//!   3. Run the server block's session handler
//!   4. Send back whatever the handler stored under `reply`
//!   5. Close, then tear the session down

use std::net::SocketAddr;
use std::rc::Rc;

use serde_json::Value;
use streambridge_transport::{SessionId, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::codes::Status;
use crate::error::{BridgeError, ScriptError};
use crate::server::ServerState;

/// Largest payload read for one session.
pub(crate) const MAX_PAYLOAD: usize = 64 * 1024;

/// Drop guard that tears a session down when handling ends, whichever
/// way it ends.
struct SessionGuard {
    session: SessionId,
    state: Rc<ServerState>,
}

impl SessionGuard {
    fn open(state: &Rc<ServerState>) -> Result<Self, BridgeError> {
        let session = state.engine.open_session()?;
        Ok(Self {
            session,
            state: Rc::clone(state),
        })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.engine.teardown_session(self.session);
    }
}

/// Handles one accepted TCP connection from first read to close.
pub(crate) async fn handle_stream(
    mut stream: TcpStream,
    peer: SocketAddr,
    server: &str,
    state: Rc<ServerState>,
) -> Result<Status, BridgeError> {
    let mut buf = vec![0u8; MAX_PAYLOAD];
    let n = tokio::time::timeout(state.read_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| TransportError::ReadTimeout(state.read_timeout))?
        .map_err(TransportError::ReceiveFailed)?;

    let guard = SessionGuard::open(&state)?;
    tracing::debug!(session = %guard.session, %peer, server, "stream session opened");

    let (status, reply) = run_handler(&state, guard.session, server, peer, &buf[..n])?;
    if let Some(reply) = reply {
        stream
            .write_all(&reply)
            .await
            .map_err(TransportError::SendFailed)?;
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(session = %guard.session, error = %e, "shutdown failed");
    }

    drop(guard);
    Ok(status)
}

/// Handles one received datagram. The reply, if any, goes back to the
/// sender through the listening socket.
pub(crate) async fn handle_datagram(
    socket: &UdpSocket,
    payload: &[u8],
    peer: SocketAddr,
    server: &str,
    state: &Rc<ServerState>,
) -> Result<Status, BridgeError> {
    let guard = SessionGuard::open(state)?;
    tracing::debug!(session = %guard.session, %peer, server, "datagram session opened");

    let (status, reply) = run_handler(state, guard.session, server, peer, payload)?;
    if let Some(reply) = reply {
        socket
            .send_to(&reply, peer)
            .await
            .map_err(TransportError::SendFailed)?;
    }

    drop(guard);
    Ok(status)
}

/// Seeds the context, runs the handler and collects the reply.
fn run_handler(
    state: &ServerState,
    session: SessionId,
    server: &str,
    peer: SocketAddr,
    payload: &[u8],
) -> Result<(Status, Option<Vec<u8>>), BridgeError> {
    let handler = state.handlers.get(server).ok_or_else(|| {
        ScriptError::InvalidArgument(format!("no session handler for server \"{server}\""))
    })?;

    let engine = &state.engine;
    engine.set_context_value(session, "peer", Value::String(peer.to_string()))?;
    engine.set_context_value(session, "server", Value::String(server.to_string()))?;
    engine.set_context_value(
        session,
        "payload",
        Value::String(String::from_utf8_lossy(payload).into_owned()),
    )?;

    let status = match engine.run_session(session, handler) {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(%session, server, error = %e, "session handler raised");
            return Err(e.into());
        }
    };

    if status.is_failure() {
        tracing::warn!(%session, server, %status, "session handler reported failure");
    } else {
        tracing::debug!(%session, server, %status, "session handler finished");
    }

    let reply = match engine.context_value(session, "reply") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.into_bytes()),
        Some(other) => Some(other.to_string().into_bytes()),
    };
    Ok((status, reply))
}
