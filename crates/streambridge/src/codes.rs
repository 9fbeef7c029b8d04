//! Status and severity codes shared with scripts.
//!
//! Both sets are plain integers on the script side. The values are fixed
//! at engine creation and never change while the process runs.

use std::fmt;

/// Identity string reported by `module_name()` and attached to every log
/// line forwarded from a script.
pub const MODULE_NAME: &str = "streambridge";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome a session handler reports back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Error,
    Again,
    Busy,
    Done,
    Declined,
    Abort,
}

impl Status {
    /// Every status with its script-visible name.
    pub const ALL: [(&'static str, Status); 7] = [
        ("OK", Status::Ok),
        ("ERROR", Status::Error),
        ("AGAIN", Status::Again),
        ("BUSY", Status::Busy),
        ("DONE", Status::Done),
        ("DECLINED", Status::Declined),
        ("ABORT", Status::Abort),
    ];

    /// The integer scripts see.
    pub fn code(self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::Error => -1,
            Self::Again => -2,
            Self::Busy => -3,
            Self::Done => -4,
            Self::Declined => -5,
            Self::Abort => -6,
        }
    }

    /// Maps a script integer back to a status.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL
            .iter()
            .map(|&(_, status)| status)
            .find(|status| status.code() == code)
    }

    /// Returns `true` if the session should be cut short.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Abort)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::ALL
            .iter()
            .find(|(_, status)| status == self)
            .map_or("UNKNOWN", |(name, _)| *name);
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Log severity, most severe first.
///
/// The numeric codes follow syslog ordering with an extra `Stderr` level
/// at zero. Derived `Ord` follows the codes, so `Emerg < Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Stderr,
    Emerg,
    Alert,
    Crit,
    Err,
    Warn,
    Notice,
    Info,
    Debug,
}

impl Severity {
    /// Every severity with its script-visible name, in code order.
    pub const ALL: [(&'static str, Severity); 9] = [
        ("LOG_STDERR", Severity::Stderr),
        ("LOG_EMERG", Severity::Emerg),
        ("LOG_ALERT", Severity::Alert),
        ("LOG_CRIT", Severity::Crit),
        ("LOG_ERR", Severity::Err),
        ("LOG_WARN", Severity::Warn),
        ("LOG_NOTICE", Severity::Notice),
        ("LOG_INFO", Severity::Info),
        ("LOG_DEBUG", Severity::Debug),
    ];

    /// The integer scripts see.
    pub fn code(self) -> u64 {
        self as u64
    }

    /// Maps a level code to a severity. Codes above `LOG_DEBUG` have none.
    pub fn from_code(code: u64) -> Option<Self> {
        Self::ALL.get(usize::try_from(code).ok()?).map(|&(_, s)| s)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stderr => "stderr",
            Self::Emerg => "emerg",
            Self::Alert => "alert",
            Self::Crit => "crit",
            Self::Err => "error",
            Self::Warn => "warn",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}
