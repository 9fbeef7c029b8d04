//! The per-session context record and its configuration.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use streambridge_transport::SessionId;

// ---------------------------------------------------------------------------
// ContextConfig
// ---------------------------------------------------------------------------

/// Limits for the context arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of contexts alive at once. Allocating beyond this
    /// fails, which is how the arena reports running out of memory.
    pub max_contexts: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_contexts: 4096,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// A callback run when the owning session is torn down.
pub type CleanupFn = Box<dyn FnOnce(SessionId)>;

/// Extension state attached to one live session.
///
/// Owned by [`SessionContexts`](crate::SessionContexts). Dropping a
/// context runs its cleanup callbacks, most recently registered first,
/// so every callback runs exactly once.
pub struct SessionContext {
    session: SessionId,
    state: HashMap<String, Value>,
    cleanups: Vec<CleanupFn>,
}

impl SessionContext {
    pub(crate) fn new(session: SessionId) -> Self {
        Self {
            session,
            state: HashMap::new(),
            cleanups: Vec::new(),
        }
    }

    /// The session this context belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Looks up a value stashed under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.state.insert(key.into(), value)
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    /// Number of stashed values.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Returns `true` if nothing is stashed.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Registers a callback to run at session teardown.
    pub fn on_teardown(&mut self, cleanup: impl FnOnce(SessionId) + 'static) {
        self.cleanups.push(Box::new(cleanup));
    }

    /// Number of pending cleanup callbacks.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.len()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        let session = self.session;
        while let Some(cleanup) = self.cleanups.pop() {
            cleanup(session);
        }
        tracing::debug!(%session, "session context released");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_context_config_default() {
        assert_eq!(ContextConfig::default().max_contexts, 4096);
    }

    #[test]
    fn test_context_config_deserialize_missing_field_uses_default() {
        let config: ContextConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ContextConfig::default());
    }

    #[test]
    fn test_set_returns_previous_value() {
        let mut ctx = SessionContext::new(SessionId::new(1));
        assert_eq!(ctx.set("hits", json!(1)), None);
        assert_eq!(ctx.set("hits", json!(2)), Some(json!(1)));
        assert_eq!(ctx.get("hits"), Some(&json!(2)));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_remove_clears_key() {
        let mut ctx = SessionContext::new(SessionId::new(1));
        ctx.set("peer", json!("10.0.0.1"));
        assert_eq!(ctx.remove("peer"), Some(json!("10.0.0.1")));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_drop_runs_cleanups_last_registered_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = SessionContext::new(SessionId::new(9));

        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            ctx.on_teardown(move |session| {
                order.borrow_mut().push((tag, session.into_inner()));
            });
        }
        assert_eq!(ctx.pending_cleanups(), 3);

        drop(ctx);
        assert_eq!(
            *order.borrow(),
            vec![("third", 9), ("second", 9), ("first", 9)]
        );
    }
}
