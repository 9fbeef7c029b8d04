//! # Streambridge
//!
//! Lua scripting for a stream server.
//!
//! Scripts run in two phases. At startup each server block's
//! configuration script declares its listeners with `add_listener`. At
//! runtime every TCP connection or UDP datagram is a session: the block's
//! session script runs with that session attached, can keep per-session
//! state, register teardown callbacks and write log lines.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streambridge::prelude::*;
//!
//! # async fn start() -> Result<(), BridgeError> {
//! let config = ServerConfig::from_json_str(r#"{
//!     "servers": [{
//!         "name": "echo",
//!         "config_script": "stream.add_listener({ address = '127.0.0.1:7000' })",
//!         "session_script": "stream.ctx_set('reply', stream.ctx_get('payload'))"
//!     }]
//! }"#)?;
//! let server = StreamBridgeBuilder::new(config).build().await?;
//! tokio::task::LocalSet::new().run_until(server.run()).await
//! # }
//! ```

pub mod codes;
pub mod config;
pub mod error;
mod handler;
pub mod log;
pub mod script;
pub mod server;
pub mod telemetry;

pub use codes::{MODULE_NAME, Severity, Status};
pub use config::{LogConfig, ScriptSource, ServerConfig, ServerSection};
pub use error::{BridgeError, ConfigFatal, ScriptError};
pub use log::{LOG_PHASE_ERROR, LogBridge, LogRecord, LogSink, MemorySink, TracingSink};
pub use script::{ConfigPass, SURFACE_TABLE, ScriptEngine};
pub use server::{StreamBridgeBuilder, StreamBridgeServer};
pub use telemetry::init_logging;

pub use streambridge_listen as listen;
pub use streambridge_session as session;
pub use streambridge_transport as transport;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::codes::{MODULE_NAME, Severity, Status};
    pub use crate::config::{LogConfig, ScriptSource, ServerConfig, ServerSection};
    pub use crate::error::{BridgeError, ConfigFatal, ScriptError};
    pub use crate::log::{LogBridge, LogSink, MemorySink, TracingSink};
    pub use crate::script::{ConfigPass, ScriptEngine};
    pub use crate::server::{StreamBridgeBuilder, StreamBridgeServer};
    pub use crate::telemetry::init_logging;

    pub use streambridge_listen::{ListenError, ListenerSpec, Registrar, ServerBlock};
    pub use streambridge_session::{ContextConfig, SessionContext, SessionContexts, SessionError};
    pub use streambridge_transport::{
        AddressResolver, ListenEndpoint, ListenerSet, Protocol, SessionId, SystemResolver,
        TransportError,
    };
}
