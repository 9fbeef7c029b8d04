//! Server configuration file.
//!
//! ```json
//! {
//!   "servers": [
//!     {
//!       "name": "echo",
//!       "config_script": "stream.add_listener({ address = '127.0.0.1:7000' })",
//!       "session_script": { "path": "scripts/echo.lua" },
//!       "default_listen": "127.0.0.1:7001"
//!     }
//!   ],
//!   "contexts": { "max_contexts": 1024 },
//!   "read_timeout_ms": 5000,
//!   "log": { "filter": "info,streambridge=debug" }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streambridge_session::ContextConfig;

use crate::error::ConfigFatal;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Default for [`ServerConfig::read_timeout_ms`].
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server blocks, configured in order.
    #[serde(default)]
    pub servers: Vec<ServerSection>,

    /// Limits for the session context arena.
    #[serde(default)]
    pub contexts: ContextConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// How long an accepted connection may stay silent before it is
    /// closed without running a session.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Directory relative script paths are read from. Set by
    /// [`from_json_file`](Self::from_json_file) to the file's directory.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            contexts: ContextConfig::default(),
            log: LogConfig::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            base_dir: None,
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigFatal> {
        serde_json::from_str(text).map_err(|e| ConfigFatal::Load {
            what: "configuration".into(),
            reason: e.to_string(),
        })
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigFatal> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigFatal::Load {
            what: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config = serde_json::from_str::<Self>(&text).map_err(|e| ConfigFatal::Load {
            what: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// The first-read deadline for stream sessions.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Loads a script, resolving relative paths against
    /// [`base_dir`](Self::base_dir).
    pub fn load_script(&self, source: &ScriptSource) -> Result<String, ConfigFatal> {
        source.load(self.base_dir.as_deref())
    }
}

// ---------------------------------------------------------------------------
// ServerSection
// ---------------------------------------------------------------------------

/// One server block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    pub name: String,

    /// Runs once at startup; may call `add_listener`.
    #[serde(default)]
    pub config_script: Option<ScriptSource>,

    /// Runs once per session.
    pub session_script: ScriptSource,

    /// Registered when the configuration script adds no listener.
    #[serde(default)]
    pub default_listen: Option<String>,
}

/// Where a script comes from: inline text, or a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptSource {
    Inline(String),
    File { path: PathBuf },
}

impl ScriptSource {
    /// Returns the script text.
    pub fn load(&self, base_dir: Option<&Path>) -> Result<String, ConfigFatal> {
        match self {
            Self::Inline(code) => Ok(code.clone()),
            Self::File { path } => {
                let full = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                std::fs::read_to_string(&full).map_err(|e| ConfigFatal::Load {
                    what: full.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LogConfig
// ---------------------------------------------------------------------------

/// Logging settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive string.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}
