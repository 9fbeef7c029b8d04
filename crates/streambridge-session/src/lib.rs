//! Per-session extension state for streambridge.
//!
//! Scripts running inside a session need somewhere to keep bookkeeping
//! that outlives a single call but not the session itself. This crate
//! provides that place:
//!
//! 1. **Contexts**: one [`SessionContext`] per live session, allocated
//!    lazily on first access
//! 2. **The arena**: [`SessionContexts`] owns every context and knows
//!    which sessions are live
//! 3. **Teardown**: ending a session releases its context and runs the
//!    registered cleanup callbacks exactly once
//!
//! # How it fits in the stack
//!
//! ```text
//! Script surface (above)  ← ctx_get / ctx_set / on_teardown
//!     ↕
//! Session contexts (this crate)  ← allocation, lookup, teardown
//!     ↕
//! Transport (below)  ← provides SessionId
//! ```

mod context;
mod error;
mod manager;

pub use context::{CleanupFn, ContextConfig, SessionContext};
pub use error::SessionError;
pub use manager::SessionContexts;
