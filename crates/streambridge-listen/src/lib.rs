//! Listener registration for streambridge.
//!
//! During configuration, scripts describe listeners declaratively
//! (address, protocol, a handful of flags). This crate turns that
//! description into concrete endpoint registrations:
//!
//! - [`ListenerSpec`]: the typed form of the script's mapping
//! - [`ServerBlock`]: the server being configured
//! - [`Registrar`]: validates a spec, resolves its address and
//!   registers one endpoint per distinct candidate
//! - [`ListenError`]: everything that can go wrong, all of it fatal to
//!   startup

mod error;
mod registrar;
mod server;
mod spec;

pub use error::ListenError;
pub use registrar::Registrar;
pub use server::ServerBlock;
pub use spec::ListenerSpec;
