//! `StreamBridgeServer` builder and accept loops.
//!
//! This is the entry point for running a scripted stream server. It ties
//! the layers together: configuration scripts → listener registration →
//! socket binding → per-session handlers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use mlua::Function;
use streambridge_listen::ServerBlock;
use streambridge_transport::{
    AddressResolver, BoundListener, ListenerSet, SystemResolver, TransportError, bind,
};

use crate::config::ServerConfig;
use crate::error::{BridgeError, ConfigFatal};
use crate::handler::{MAX_PAYLOAD, handle_datagram, handle_stream};
use crate::log::{LogSink, TracingSink};
use crate::script::{ConfigPass, ScriptEngine};

/// Shared server state handed to every session.
///
/// Held in an `Rc`: the Lua state is not `Send`, so the whole server
/// runs on one thread.
pub(crate) struct ServerState {
    /// Session handler per server block name.
    pub(crate) handlers: HashMap<String, Function>,
    pub(crate) engine: Rc<ScriptEngine>,
    /// How long a connection may stay silent before it is dropped.
    pub(crate) read_timeout: Duration,
}

/// Builder for configuring and starting a server.
///
/// # Example
///
/// ```rust,ignore
/// use streambridge::prelude::*;
///
/// let config = ServerConfig::from_json_file("streambridge.json")?;
/// let server = StreamBridgeBuilder::new(config).build().await?;
/// tokio::task::LocalSet::new().run_until(server.run()).await
/// ```
pub struct StreamBridgeBuilder {
    config: ServerConfig,
    sink: Arc<dyn LogSink>,
    resolver: Rc<dyn AddressResolver>,
}

impl StreamBridgeBuilder {
    /// Creates a builder that logs through `tracing` and resolves with
    /// the system resolver.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            resolver: Rc::new(SystemResolver),
        }
    }

    /// Sets where script log lines go.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the resolver used by `add_listener`.
    pub fn resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.resolver = Rc::new(resolver);
        self
    }

    /// Configures every server block and binds the resulting listeners.
    ///
    /// # Errors
    /// - [`BridgeError::Config`]: a script or listener failed during
    ///   configuration
    /// - [`BridgeError::Transport`]: a listener could not be bound
    pub async fn build(self) -> Result<StreamBridgeServer, BridgeError> {
        let engine = ScriptEngine::new(self.sink, self.config.contexts.clone())?;
        let mut listeners = ListenerSet::new();
        let mut handlers = HashMap::new();

        for section in &self.config.servers {
            if handlers.contains_key(&section.name) {
                return Err(ConfigFatal::Load {
                    what: format!("server \"{}\"", section.name),
                    reason: "duplicate server name".into(),
                }
                .into());
            }

            let mut pass = ConfigPass::new(
                ServerBlock::new(section.name.as_str()),
                listeners,
                Rc::clone(&self.resolver),
            );
            if let Some(script) = &section.config_script {
                let code = self.config.load_script(script)?;
                pass = engine.configure(pass, &code)?;
            }
            if let Some(address) = &section.default_listen {
                pass.add_default(address).map_err(|source| ConfigFatal::Listen {
                    server: section.name.clone(),
                    source,
                })?;
            }

            let (server, registered) = pass.into_parts();
            if !server.has_listen {
                tracing::warn!(server = %server.name, "server block has no listeners");
            }
            tracing::info!(
                server = %server.name,
                listeners = registered.for_server(&server.name).count(),
                "server block configured"
            );
            listeners = registered;

            let code = self.config.load_script(&section.session_script)?;
            let handler = engine.compile(&section.name, &code)?;
            handlers.insert(section.name.clone(), handler);
        }

        let mut bound = Vec::with_capacity(listeners.len());
        for endpoint in listeners.into_endpoints() {
            bound.push(bind(endpoint).await?);
        }

        let state = Rc::new(ServerState {
            handlers,
            engine: Rc::new(engine),
            read_timeout: self.config.read_timeout(),
        });
        Ok(StreamBridgeServer {
            listeners: bound,
            state,
        })
    }
}

/// A configured server with its listeners bound.
///
/// Call [`run()`](Self::run) to start serving sessions.
pub struct StreamBridgeServer {
    listeners: Vec<BoundListener>,
    state: Rc<ServerState>,
}

impl StreamBridgeServer {
    /// Creates a builder.
    pub fn builder(config: ServerConfig) -> StreamBridgeBuilder {
        StreamBridgeBuilder::new(config)
    }

    /// Addresses the listeners are actually bound to.
    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>, BridgeError> {
        self.listeners
            .iter()
            .map(|l| l.local_addr().map_err(BridgeError::from))
            .collect()
    }

    /// The script engine serving this server's sessions.
    pub fn engine(&self) -> Rc<ScriptEngine> {
        Rc::clone(&self.state.engine)
    }

    /// Runs every accept loop until the process is terminated.
    ///
    /// Must be awaited inside a [`tokio::task::LocalSet`]; sessions are
    /// spawned with `spawn_local`.
    pub async fn run(self) -> Result<(), BridgeError> {
        if self.listeners.is_empty() {
            tracing::warn!("no listeners bound, nothing to serve");
            return Ok(());
        }
        tracing::info!(listeners = self.listeners.len(), "streambridge server running");

        let mut loops = Vec::with_capacity(self.listeners.len());
        for listener in self.listeners {
            let state = Rc::clone(&self.state);
            loops.push(tokio::task::spawn_local(serve(listener, state)));
        }
        for handle in loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "accept loop ended unexpectedly");
            }
        }
        Ok(())
    }
}

/// Accept loop for one listener.
async fn serve(listener: BoundListener, state: Rc<ServerState>) {
    match listener {
        BoundListener::Stream { listener, endpoint } => {
            let server: Rc<str> = Rc::from(endpoint.server.as_str());
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let state = Rc::clone(&state);
                        let server = Rc::clone(&server);
                        tokio::task::spawn_local(async move {
                            if let Err(e) = handle_stream(stream, peer, &server, state).await {
                                tracing::debug!(error = %e, %peer, "session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        let e = TransportError::AcceptFailed(e);
                        tracing::error!(error = %e, addr = %endpoint.addr, "accept failed");
                    }
                }
            }
        }
        BoundListener::Datagram { socket, endpoint } => {
            let mut buf = vec![0u8; MAX_PAYLOAD];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, peer)) => {
                        let payload = &buf[..n];
                        if let Err(e) =
                            handle_datagram(&socket, payload, peer, &endpoint.server, &state).await
                        {
                            tracing::debug!(error = %e, %peer, "session ended with error");
                        }
                    }
                    Err(e) => {
                        let e = TransportError::ReceiveFailed(e);
                        tracing::error!(error = %e, addr = %endpoint.addr, "receive failed");
                    }
                }
            }
        }
    }
}
