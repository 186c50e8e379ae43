//! Process-wide session registry.
//!
//! Maps stream identifiers to live bridge sessions so the out-of-band
//! escalation endpoint can reach into a call. Sessions register themselves
//! once the `start` event has been processed and unregister on close.

use std::sync::Arc;

use dashmap::DashMap;

use crate::bridge::session::BridgeSession;

/// Thread-safe registry of active bridge sessions, keyed by stream sid.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<BridgeSession>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Registers a session under its stream sid.
    pub fn insert(&self, stream_sid: String, session: Arc<BridgeSession>) {
        log::info!(
            "[Registry] Session {} registered under stream {} (total: {})",
            session.session_id(),
            stream_sid,
            self.sessions.len() + 1
        );
        self.sessions.insert(stream_sid, session);
    }

    /// Removes a session by stream sid.
    pub fn remove(&self, stream_sid: &str) {
        if self.sessions.remove(stream_sid).is_some() {
            log::info!(
                "[Registry] Stream {} unregistered (remaining: {})",
                stream_sid,
                self.sessions.len()
            );
        }
    }

    /// Looks up a session by stream sid.
    pub fn lookup(&self, stream_sid: &str) -> Option<Arc<BridgeSession>> {
        self.sessions.get(stream_sid).map(|r| Arc::clone(r.value()))
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns all registered stream sids, for diagnostics.
    #[must_use]
    pub fn stream_sids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a session's stream when dropped.
///
/// Held by the task running the session so the registry entry is removed
/// even if that task panics or exits early. The session registers itself
/// only after the `start` event, so the guard resolves the stream sid at
/// drop time; removal is idempotent against the normal teardown path.
pub struct RegistryGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<BridgeSession>,
}

impl RegistryGuard {
    /// Creates a guard for a session's (possibly future) registry entry.
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<BridgeSession>) -> Self {
        Self { registry, session }
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if let Some(stream_sid) = self.session.stream_sid() {
            self.registry.remove(&stream_sid);
        }
    }
}
