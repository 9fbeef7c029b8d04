//! The log bridge: script log calls into the server's logging facility.
//!
//! Scripts log with an integer level and any value as the message. The
//! bridge checks that a session is attached, screens out negative levels,
//! and hands `(level, message)` to a [`LogSink`]. It never clamps the
//! level; deciding what an unknown level means is the sink's business.

use std::sync::{Arc, Mutex};

use streambridge_transport::SessionId;

use crate::codes::{MODULE_NAME, Severity};
use crate::error::ScriptError;

/// Message raised when logging is attempted with no session attached.
pub const LOG_PHASE_ERROR: &str =
    "can't use logger at this phase. only use at session stream phase";

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// One forwarded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Raw level code as the script passed it.
    pub level: u64,
    /// Session the line was emitted from.
    pub session: Option<SessionId>,
    pub message: String,
}

/// Destination of forwarded log lines. Shared with the rest of the
/// server, so it must tolerate concurrent use.
pub trait LogSink: Send + Sync {
    fn emit(&self, level: u64, session: Option<SessionId>, message: &str);
}

/// Sink that writes through `tracing`.
///
/// Severities map onto tracing levels as follows; codes above
/// `LOG_DEBUG` go out at trace level with the raw code attached.
///
/// ```text
/// stderr emerg alert crit error → ERROR
/// warn                          → WARN
/// notice info                   → INFO
/// debug                         → DEBUG
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: u64, session: Option<SessionId>, message: &str) {
        let session = session.map(SessionId::into_inner);
        match Severity::from_code(level) {
            Some(
                severity @ (Severity::Stderr
                | Severity::Emerg
                | Severity::Alert
                | Severity::Crit
                | Severity::Err),
            ) => {
                tracing::error!(module = MODULE_NAME, session, %severity, "{message}");
            }
            Some(severity @ Severity::Warn) => {
                tracing::warn!(module = MODULE_NAME, session, %severity, "{message}");
            }
            Some(severity @ (Severity::Notice | Severity::Info)) => {
                tracing::info!(module = MODULE_NAME, session, %severity, "{message}");
            }
            Some(severity @ Severity::Debug) => {
                tracing::debug!(module = MODULE_NAME, session, %severity, "{message}");
            }
            None => {
                tracing::trace!(module = MODULE_NAME, session, level, "{message}");
            }
        }
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A copy of everything emitted so far.
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages only, in emission order.
    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: u64, session: Option<SessionId>, message: &str) {
        let record = LogRecord {
            level,
            session,
            message: message.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

// ---------------------------------------------------------------------------
// LogBridge
// ---------------------------------------------------------------------------

/// Forwards script log calls to a sink.
#[derive(Clone)]
pub struct LogBridge {
    sink: Arc<dyn LogSink>,
}

impl LogBridge {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// The sink lines are forwarded to.
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Logs `message` at `level` on behalf of `session`.
    ///
    /// `message` produces the display string and is only called once the
    /// line is known to be forwarded.
    ///
    /// - no session → [`ScriptError::PhaseViolation`]
    /// - negative level → one diagnostic line at `LOG_ERR`, the message
    ///   is dropped, and the call still succeeds
    /// - otherwise the level and message are forwarded unchanged
    pub fn log<F>(
        &self,
        session: Option<SessionId>,
        level: i64,
        message: F,
    ) -> Result<(), ScriptError>
    where
        F: FnOnce() -> Result<String, ScriptError>,
    {
        let session = session.ok_or(ScriptError::PhaseViolation(LOG_PHASE_ERROR))?;

        let Ok(level) = u64::try_from(level) else {
            self.sink.emit(
                Severity::Err.code(),
                Some(session),
                &format!("{MODULE_NAME} ERROR log: log level is not positive number"),
            );
            return Ok(());
        };

        let message = message()?;
        self.sink.emit(level, Some(session), &message);
        Ok(())
    }
}

impl std::fmt::Debug for LogBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBridge").finish_non_exhaustive()
    }
}
