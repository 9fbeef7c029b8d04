//! The context arena: which sessions are live and what they carry.
//!
//! # Ownership
//!
//! The arena is the only owner of every [`SessionContext`]. A context is
//! created the first time a live session asks for it and destroyed when
//! the session is torn down. Nothing outside the arena can keep one alive
//! past teardown, so a later lookup can never resurrect it.
//!
//! # Concurrency note
//!
//! `SessionContexts` is not thread-safe and is not meant to be. It
//! belongs to the single thread that runs the scripts of its sessions.

use std::collections::HashMap;

use streambridge_transport::SessionId;

use crate::{ContextConfig, SessionContext, SessionError};

/// Arena of session contexts keyed by session.
///
/// ```text
/// open() ──→ get_or_create() ──→ get_or_create() ──→ teardown()
///   │              │                   │                 │
///   ▼              ▼                   ▼                 ▼
/// [live]     [live + context]   [same context]     [gone, cleanups run]
/// ```
#[derive(Debug)]
pub struct SessionContexts {
    /// Every live session. `None` until the session first asks for a
    /// context.
    live: HashMap<SessionId, Option<SessionContext>>,

    /// Number of `Some` slots in `live`.
    allocated: usize,

    config: ContextConfig,
}

impl SessionContexts {
    /// Creates an empty arena.
    pub fn new(config: ContextConfig) -> Self {
        Self {
            live: HashMap::new(),
            allocated: 0,
            config,
        }
    }

    /// Marks a session live. No context is allocated yet.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyOpen`] if the session is live.
    pub fn open(&mut self, session: SessionId) -> Result<(), SessionError> {
        if self.live.contains_key(&session) {
            return Err(SessionError::AlreadyOpen(session));
        }
        self.live.insert(session, None);
        tracing::debug!(%session, "session opened");
        Ok(())
    }

    /// Returns the session's context, allocating it on first use.
    ///
    /// Repeated calls during one session return the same context.
    ///
    /// # Errors
    /// - [`SessionError::NotLive`]: the session was never opened or has
    ///   been torn down
    /// - [`SessionError::AllocationFailed`]: the arena is full
    pub fn get_or_create(
        &mut self,
        session: SessionId,
    ) -> Result<&mut SessionContext, SessionError> {
        let at_capacity = self.allocated >= self.config.max_contexts;
        let slot = self
            .live
            .get_mut(&session)
            .ok_or(SessionError::NotLive(session))?;

        if slot.is_none() {
            if at_capacity {
                return Err(SessionError::AllocationFailed(session));
            }
            self.allocated += 1;
            tracing::trace!(%session, "session context allocated");
        }
        Ok(slot.get_or_insert_with(|| SessionContext::new(session)))
    }

    /// Like [`get_or_create`](Self::get_or_create), for callers with no
    /// way to raise an error. Failures are logged and `None` is returned.
    pub fn try_get_or_create(
        &mut self,
        session: SessionId,
    ) -> Option<&mut SessionContext> {
        match self.get_or_create(session) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::error!(%session, error = %e, "no session context available");
                None
            }
        }
    }

    /// Looks up an existing context without allocating.
    pub fn get(&self, session: SessionId) -> Option<&SessionContext> {
        self.live.get(&session).and_then(Option::as_ref)
    }

    /// Returns `true` if the session is open.
    pub fn is_live(&self, session: SessionId) -> bool {
        self.live.contains_key(&session)
    }

    /// Ends a session.
    ///
    /// The session stops being live immediately. Its context, if one was
    /// allocated, is handed back so the caller decides where it is
    /// dropped: dropping it runs the cleanup callbacks, and doing that
    /// after releasing any borrow on the arena lets callbacks call back
    /// into it.
    pub fn teardown(&mut self, session: SessionId) -> Option<SessionContext> {
        let slot = self.live.remove(&session)?;
        tracing::debug!(%session, had_context = slot.is_some(), "session torn down");
        if slot.is_some() {
            self.allocated -= 1;
        }
        slot
    }

    /// Ends every live session at once, handing back the allocated
    /// contexts in no particular order.
    pub fn drain(&mut self) -> Vec<SessionContext> {
        self.allocated = 0;
        self.live.drain().filter_map(|(_, slot)| slot).collect()
    }

    /// Number of live sessions.
    pub fn live_sessions(&self) -> usize {
        self.live.len()
    }

    /// Number of allocated contexts.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

impl Default for SessionContexts {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionContexts`.
    //!
    //! Naming follows `test_{function}_{scenario}_{expected}`.

    use std::cell::Cell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;

    fn sid(id: u64) -> SessionId {
        SessionId::new(id)
    }

    fn arena_with_capacity(max_contexts: usize) -> SessionContexts {
        SessionContexts::new(ContextConfig { max_contexts })
    }

    // =====================================================================
    // open()
    // =====================================================================

    #[test]
    fn test_open_new_session_is_live_without_context() {
        let mut arena = SessionContexts::default();
        arena.open(sid(1)).expect("should open");

        assert!(arena.is_live(sid(1)));
        assert!(arena.get(sid(1)).is_none());
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn test_open_twice_returns_already_open() {
        let mut arena = SessionContexts::default();
        arena.open(sid(1)).unwrap();
        assert_eq!(arena.open(sid(1)), Err(SessionError::AlreadyOpen(sid(1))));
    }

    // =====================================================================
    // get_or_create()
    // =====================================================================

    #[test]
    fn test_get_or_create_twice_returns_same_context() {
        let mut arena = SessionContexts::default();
        arena.open(sid(1)).unwrap();

        let first: *const SessionContext =
            arena.get_or_create(sid(1)).expect("first call");
        arena
            .get_or_create(sid(1))
            .unwrap()
            .set("marker", json!(true));
        let second: *const SessionContext =
            arena.get_or_create(sid(1)).expect("second call");

        assert_eq!(first, second);
        assert_eq!(arena.allocated(), 1);
        assert_eq!(arena.get(sid(1)).unwrap().get("marker"), Some(&json!(true)));
    }

    #[test]
    fn test_get_or_create_unopened_session_is_not_live() {
        let mut arena = SessionContexts::default();
        let err = arena.get_or_create(sid(5)).unwrap_err();
        assert_eq!(err, SessionError::NotLive(sid(5)));
    }

    #[test]
    fn test_get_or_create_at_capacity_fails() {
        let mut arena = arena_with_capacity(1);
        arena.open(sid(1)).unwrap();
        arena.open(sid(2)).unwrap();
        arena.get_or_create(sid(1)).unwrap();

        let err = arena.get_or_create(sid(2)).unwrap_err();
        assert_eq!(err, SessionError::AllocationFailed(sid(2)));
        // The session that already has a context keeps getting it.
        assert!(arena.get_or_create(sid(1)).is_ok());
    }

    #[test]
    fn test_try_get_or_create_at_capacity_returns_none() {
        let mut arena = arena_with_capacity(0);
        arena.open(sid(1)).unwrap();
        assert!(arena.try_get_or_create(sid(1)).is_none());
        assert!(arena.is_live(sid(1)));
    }

    #[test]
    fn test_capacity_is_released_on_teardown() {
        let mut arena = arena_with_capacity(1);
        arena.open(sid(1)).unwrap();
        arena.get_or_create(sid(1)).unwrap();
        drop(arena.teardown(sid(1)));

        arena.open(sid(2)).unwrap();
        assert!(arena.get_or_create(sid(2)).is_ok());
    }

    // =====================================================================
    // teardown()
    // =====================================================================

    #[test]
    fn test_teardown_runs_cleanups_exactly_once() {
        let runs = Rc::new(Cell::new(0));
        let mut arena = SessionContexts::default();
        arena.open(sid(1)).unwrap();
        {
            let runs = Rc::clone(&runs);
            arena
                .get_or_create(sid(1))
                .unwrap()
                .on_teardown(move |_| runs.set(runs.get() + 1));
        }

        drop(arena.teardown(sid(1)));
        assert_eq!(runs.get(), 1);

        // A second teardown finds nothing and runs nothing.
        assert!(arena.teardown(sid(1)).is_none());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_teardown_then_lookup_does_not_resurrect() {
        let mut arena = SessionContexts::default();
        arena.open(sid(1)).unwrap();
        arena.get_or_create(sid(1)).unwrap().set("k", json!(1));
        drop(arena.teardown(sid(1)));

        assert!(arena.get(sid(1)).is_none());
        assert_eq!(
            arena.get_or_create(sid(1)).unwrap_err(),
            SessionError::NotLive(sid(1))
        );
        assert_eq!(arena.live_sessions(), 0);
    }

    #[test]
    fn test_fresh_session_sees_no_stale_state() {
        let mut arena = SessionContexts::default();
        let old = SessionId::next();
        arena.open(old).unwrap();
        arena.get_or_create(old).unwrap().set("user", json!("alice"));
        drop(arena.teardown(old));

        let fresh = SessionId::next();
        arena.open(fresh).unwrap();
        let ctx = arena.get_or_create(fresh).unwrap();
        assert!(ctx.is_empty());
        assert_eq!(ctx.session(), fresh);
    }

    #[test]
    fn test_drain_ends_every_session() {
        let mut arena = SessionContexts::default();
        arena.open(sid(1)).unwrap();
        arena.open(sid(2)).unwrap();
        arena.get_or_create(sid(1)).unwrap();

        let released = arena.drain();

        assert_eq!(released.len(), 1);
        assert_eq!(arena.live_sessions(), 0);
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn test_dropping_arena_releases_remaining_contexts() {
        let runs = Rc::new(Cell::new(0));
        let mut arena = SessionContexts::default();
        for id in 1..=3 {
            arena.open(sid(id)).unwrap();
            let runs = Rc::clone(&runs);
            arena
                .get_or_create(sid(id))
                .unwrap()
                .on_teardown(move |_| runs.set(runs.get() + 1));
        }

        drop(arena);
        assert_eq!(runs.get(), 3);
    }
}
