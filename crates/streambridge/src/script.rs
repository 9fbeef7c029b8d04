//! The Lua side of the bridge.
//!
//! [`ScriptEngine`] owns the Lua state and installs a global `stream`
//! table when it is created:
//!
//! ```lua
//! -- configuration script
//! stream.add_listener({ address = "0.0.0.0:5353", udp = true })
//!
//! -- session handler
//! local hits = (stream.ctx_get("hits") or 0) + 1
//! stream.ctx_set("hits", hits)
//! stream.on_teardown(function(id) stream.module_name() end)
//! stream.log(stream.LOG_INFO, "hit " .. hits)
//! return stream.OK
//! ```
//!
//! Which functions work depends on what is attached to the state. A
//! configuration pass is attached while [`ScriptEngine::configure`] runs
//! and a session while [`ScriptEngine::run_session`] runs; neither is
//! attached otherwise.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use mlua::{Function, Lua, LuaSerdeExt, MultiValue, Table, Value};
use streambridge_listen::{ListenError, ListenerSpec, Registrar, ServerBlock};
use streambridge_session::{ContextConfig, SessionContexts, SessionError};
use streambridge_transport::{AddressResolver, ListenerSet, SessionId};

use crate::codes::{MODULE_NAME, Severity, Status};
use crate::error::{ConfigFatal, ScriptError};
use crate::log::{LOG_PHASE_ERROR, LogBridge, LogSink};

/// Name of the global table scripts use.
pub const SURFACE_TABLE: &str = "stream";

const ADD_LISTENER_PHASE_ERROR: &str =
    "add_listener is only usable while the server is being configured";
const CONTEXT_PHASE_ERROR: &str =
    "session context is only usable while a session is active";

/// Marks the session the current call runs for.
#[derive(Debug, Clone, Copy)]
struct ActiveSession(SessionId);

// ---------------------------------------------------------------------------
// ConfigPass
// ---------------------------------------------------------------------------

/// Everything a configuration script can change.
///
/// The first listener failure is kept even if the script recovers from
/// the raised error, so a `pcall` cannot hide it from startup.
pub struct ConfigPass {
    server: ServerBlock,
    listeners: ListenerSet,
    resolver: Rc<dyn AddressResolver>,
    failure: Option<ListenError>,
}

impl ConfigPass {
    pub fn new(
        server: ServerBlock,
        listeners: ListenerSet,
        resolver: Rc<dyn AddressResolver>,
    ) -> Self {
        Self {
            server,
            listeners,
            resolver,
            failure: None,
        }
    }

    /// The block being configured.
    pub fn server(&self) -> &ServerBlock {
        &self.server
    }

    /// Endpoints registered so far in this generation.
    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Registrar for the block being configured.
    pub fn registrar(&mut self) -> Registrar<'_> {
        Registrar::new(&mut self.server, &mut self.listeners, self.resolver.as_ref())
    }

    /// Registers listeners for `spec`.
    pub fn add_listener(&mut self, spec: &ListenerSpec) -> Result<usize, ListenError> {
        self.registrar().add_listener(spec)
    }

    /// Registers `address` unless the block already has a listener.
    pub fn add_default(&mut self, address: &str) -> Result<usize, ListenError> {
        self.registrar().add_default(address)
    }

    /// Splits the pass back into the block and the listener table.
    pub fn into_parts(self) -> (ServerBlock, ListenerSet) {
        (self.server, self.listeners)
    }

    fn record_failure(&mut self, err: ListenError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }
}

impl std::fmt::Debug for ConfigPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigPass")
            .field("server", &self.server)
            .field("listeners", &self.listeners)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ScriptEngine
// ---------------------------------------------------------------------------

/// The Lua state plus the per-session contexts it manages.
///
/// Not `Send`: the engine and every session it serves live on one thread.
pub struct ScriptEngine {
    lua: Lua,
    contexts: Rc<RefCell<SessionContexts>>,
}

impl ScriptEngine {
    /// Creates a Lua state with the `stream` table installed.
    pub fn new(sink: Arc<dyn LogSink>, config: ContextConfig) -> Result<Self, ScriptError> {
        let lua = Lua::new();
        let contexts = Rc::new(RefCell::new(SessionContexts::new(config)));
        register_surface(&lua, &contexts, &LogBridge::new(sink))?;

        Ok(Self { lua, contexts })
    }

    /// The underlying Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Read access to the context arena.
    pub fn contexts(&self) -> Ref<'_, SessionContexts> {
        self.contexts.borrow()
    }

    /// Runs a chunk with nothing attached.
    pub fn exec(&self, name: &str, source: &str) -> Result<(), ScriptError> {
        self.lua.load(source).set_name(name).exec()?;
        Ok(())
    }

    /// Compiles a session handler without running it.
    pub fn compile(&self, name: &str, source: &str) -> Result<Function, ConfigFatal> {
        self.lua
            .load(source)
            .set_name(name)
            .into_function()
            .map_err(|source| ConfigFatal::Script {
                server: name.to_string(),
                source,
            })
    }

    /// Runs a configuration script against `pass`.
    ///
    /// # Errors
    /// - [`ConfigFatal::Listen`]: a listener failed to register, whether
    ///   or not the script caught the error
    /// - [`ConfigFatal::Script`]: the script itself failed
    pub fn configure(&self, pass: ConfigPass, source: &str) -> Result<ConfigPass, ConfigFatal> {
        let server = pass.server.name.clone();
        tracing::debug!(%server, "running configuration script");

        self.lua.set_app_data(pass);
        let result = self.lua.load(source).set_name(server.as_str()).exec();
        let mut pass = self
            .lua
            .remove_app_data::<ConfigPass>()
            .ok_or_else(|| ConfigFatal::Load {
                what: format!("configuration pass of \"{server}\""),
                reason: "detached while the script ran".into(),
            })?;

        if let Some(source) = pass.failure.take() {
            return Err(ConfigFatal::Listen { server, source });
        }
        result.map_err(|source| ConfigFatal::Script {
            server: server.clone(),
            source,
        })?;
        Ok(pass)
    }

    /// Starts a new session.
    pub fn open_session(&self) -> Result<SessionId, ScriptError> {
        let session = SessionId::next();
        self.contexts.borrow_mut().open(session)?;
        Ok(session)
    }

    /// Runs `handler` with `session` attached and maps what it returns to
    /// a [`Status`]. Returning nothing counts as [`Status::Ok`].
    pub fn run_session(&self, session: SessionId, handler: &Function) -> Result<Status, ScriptError> {
        if !self.contexts.borrow().is_live(session) {
            return Err(SessionError::NotLive(session).into());
        }

        let previous = self.lua.set_app_data(ActiveSession(session));
        let result = handler.call::<Value>(());
        match previous {
            Some(previous) => {
                self.lua.set_app_data(previous);
            }
            None => {
                self.lua.remove_app_data::<ActiveSession>();
            }
        }

        match result? {
            Value::Nil => Ok(Status::Ok),
            Value::Integer(code) => status_from_code(code),
            Value::Number(n) if n.fract() == 0.0 => status_from_code(n as i64),
            other => Err(ScriptError::InvalidArgument(format!(
                "session handler returned a {}, expected a status code",
                other.type_name()
            ))),
        }
    }

    /// Stores `value` under `key` in the session's context, allocating
    /// the context if needed.
    pub fn set_context_value(
        &self,
        session: SessionId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), ScriptError> {
        self.contexts
            .borrow_mut()
            .get_or_create(session)?
            .set(key, value);
        Ok(())
    }

    /// Reads `key` from the session's context without allocating one.
    pub fn context_value(&self, session: SessionId, key: &str) -> Option<serde_json::Value> {
        self.contexts.borrow().get(session)?.get(key).cloned()
    }

    /// Ends a session and releases its context. Cleanup callbacks run
    /// here, after the arena borrow is released.
    pub fn teardown_session(&self, session: SessionId) {
        let released = self.contexts.borrow_mut().teardown(session);
        drop(released);
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        // Run outstanding cleanups while the Lua state is still usable.
        let remaining = self.contexts.borrow_mut().drain();
        drop(remaining);
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}

fn status_from_code(code: i64) -> Result<Status, ScriptError> {
    Status::from_code(code)
        .ok_or_else(|| ScriptError::InvalidArgument(format!("unknown status code {code}")))
}

// ---------------------------------------------------------------------------
// Surface registration
// ---------------------------------------------------------------------------

fn active_session(lua: &Lua) -> Option<SessionId> {
    lua.app_data_ref::<ActiveSession>().map(|active| active.0)
}

fn require_session(lua: &Lua) -> mlua::Result<SessionId> {
    active_session(lua)
        .ok_or_else(|| mlua::Error::external(ScriptError::PhaseViolation(CONTEXT_PHASE_ERROR)))
}

/// Installs the `stream` table: constants, logging, listener registration
/// and session context access.
fn register_surface(
    lua: &Lua,
    contexts: &Rc<RefCell<SessionContexts>>,
    logger: &LogBridge,
) -> Result<(), ScriptError> {
    let table = lua.create_table()?;

    for (name, status) in Status::ALL {
        table.set(name, status.code())?;
    }
    for (name, severity) in Severity::ALL {
        table.set(name, severity.code())?;
    }

    register_logging(lua, &table, logger)?;
    register_listeners(lua, &table)?;
    register_context(lua, &table, contexts)?;

    table.set("module_name", lua.create_function(|_, ()| Ok(MODULE_NAME))?)?;

    lua.globals().set(SURFACE_TABLE, table)?;
    Ok(())
}

/// `stream.log(level, message)`, also exposed as `stream.errlogger`.
fn register_logging(lua: &Lua, table: &Table, logger: &LogBridge) -> mlua::Result<()> {
    let logger = logger.clone();
    // The phase is checked before the arguments are converted, so a call
    // outside a session always fails the same way.
    let log_fn = lua.create_function(move |lua, args: MultiValue| {
        let session = active_session(lua)
            .ok_or_else(|| mlua::Error::external(ScriptError::PhaseViolation(LOG_PHASE_ERROR)))?;
        let (level, message): (i64, Value) = lua.unpack_multi(args)?;
        logger
            .log(Some(session), level, || {
                let tostring: Function = lua.globals().get("tostring")?;
                Ok(tostring.call::<String>(message)?)
            })
            .map_err(mlua::Error::external)
    })?;

    table.set("errlogger", log_fn.clone())?;
    table.set("log", log_fn)?;
    Ok(())
}

/// `stream.add_listener{ address = ..., udp = ..., ... }`.
fn register_listeners(lua: &Lua, table: &Table) -> mlua::Result<()> {
    let add_listener = lua.create_function(|lua, spec: Value| {
        let mut pass = lua
            .app_data_mut::<ConfigPass>()
            .ok_or_else(|| mlua::Error::runtime(ADD_LISTENER_PHASE_ERROR))?;

        let result = lua
            .from_value::<ListenerSpec>(spec)
            .map_err(|e| ListenError::InvalidSpec(e.to_string()))
            .and_then(|spec| pass.add_listener(&spec));

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = e.to_string();
                tracing::error!(server = %pass.server.name, error = %message, "add_listener failed");
                pass.record_failure(e);
                Err(mlua::Error::runtime(message))
            }
        }
    })?;

    table.set("add_listener", add_listener)
}

/// `stream.ctx_get(key)`, `stream.ctx_set(key, value)` and
/// `stream.on_teardown(fn)`.
fn register_context(
    lua: &Lua,
    table: &Table,
    contexts: &Rc<RefCell<SessionContexts>>,
) -> mlua::Result<()> {
    let arena = Rc::clone(contexts);
    let ctx_get = lua.create_function(move |lua, key: String| {
        let session = require_session(lua)?;
        let value = arena
            .borrow_mut()
            .get_or_create(session)
            .map_err(mlua::Error::external)?
            .get(&key)
            .cloned();
        match value {
            Some(value) => lua.to_value(&value),
            None => Ok(Value::Nil),
        }
    })?;
    table.set("ctx_get", ctx_get)?;

    let arena = Rc::clone(contexts);
    let ctx_set = lua.create_function(move |lua, (key, value): (String, Value)| {
        let session = require_session(lua)?;
        let value = match value {
            Value::Nil => None,
            value => Some(lua.from_value::<serde_json::Value>(value)?),
        };
        let mut arena = arena.borrow_mut();
        let ctx = arena.get_or_create(session).map_err(mlua::Error::external)?;
        match value {
            Some(value) => ctx.set(key, value),
            None => ctx.remove(&key),
        };
        Ok(())
    })?;
    table.set("ctx_set", ctx_set)?;

    let arena = Rc::clone(contexts);
    let on_teardown = lua.create_function(move |lua, callback: Function| {
        let session = require_session(lua)?;
        arena
            .borrow_mut()
            .get_or_create(session)
            .map_err(mlua::Error::external)?
            .on_teardown(move |session| {
                if let Err(e) = callback.call::<()>(session.into_inner()) {
                    tracing::warn!(%session, error = %e, "teardown callback failed");
                }
            });
        Ok(())
    })?;
    table.set("on_teardown", on_teardown)
}
