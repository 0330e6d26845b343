//! Registry of live sessions keyed by session id.
//!
//! Safe for concurrent create/get/remove from any number of WebSocket handler tasks: the
//! registry itself is a `DashMap`, the same concurrent-map idiom this codebase already uses for
//! `security::ConnectionTracker`. Mutating a *particular* session's state always goes through
//! that session's actor mailbox (see `session.rs`), never through the map directly.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::config::Settings;
use crate::error::PtyError;
use crate::protocol::generate_session_id;
use crate::session::{SessionHandle, SessionStats};

const MAX_ID_GENERATION_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, SessionHandle>>,
    settings: Arc<Settings>,
}

impl SessionManager {
    pub fn new(settings: Settings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Allocate a fresh id, spawn a `TerminalSession` actor for it, and register the handle.
    pub fn create_session(&self, cols: u16, rows: u16, cmd: &str) -> Result<SessionHandle, PtyError> {
        let id = self.fresh_id();
        let handle = SessionHandle::start(id.clone(), cols, rows, cmd, &self.settings)?;
        self.sessions.insert(id.clone(), handle.clone());
        info!(session_id = %id, total = self.sessions.len(), "session created");
        Ok(handle)
    }

    pub fn get_session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Pop from the registry then close the session. A no-op if the id is absent.
    pub async fn remove_session(&self, id: &str) {
        if let Some((_, handle)) = self.sessions.remove(id) {
            handle.close().await;
            info!(session_id = %id, total = self.sessions.len(), "session removed");
        }
    }

    /// Check whether a session is eligible for removal (no clients, PTY exited) and remove it if
    /// so. Called by the WebSocket handler after every detach.
    pub async fn reap_if_eligible(&self, id: &str) {
        let eligible = match self.get_session(id) {
            Some(handle) => match handle.stats().await {
                Some(stats) => stats.clients == 0 && !stats.alive,
                None => true, // actor already gone; registry entry is stale
            },
            None => false,
        };
        if eligible {
            self.remove_session(id).await;
        }
    }

    /// Snapshot stats for every live session, for `GET /api/sessions`.
    pub async fn list_stats(&self) -> Vec<SessionStats> {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(stats) = handle.stats().await {
                out.push(stats);
            }
        }
        out
    }

    /// Close every session, awaiting full shutdown of each, and empty the registry.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        info!(count = ids.len(), "shutting down sessions");
        for id in ids {
            self.remove_session(&id).await;
        }
    }

    fn fresh_id(&self) -> String {
        for _ in 0..MAX_ID_GENERATION_ATTEMPTS {
            let candidate = generate_session_id();
            if !self.sessions.contains_key(&candidate) {
                return candidate;
            }
        }
        // Space is ~2.8e12; this branch is not expected to be reachable in practice.
        generate_session_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        let mut s = Settings::default();
        s.log_enabled = false;
        s
    }

    #[tokio::test]
    async fn create_get_remove_round_trip() {
        let manager = SessionManager::new(test_settings());
        let handle = manager
            .create_session(80, 24, "/bin/cat")
            .expect("create session");

        assert!(manager.get_session(&handle.id).is_some());

        manager.remove_session(&handle.id).await;
        assert!(manager.get_session(&handle.id).is_none());
    }

    #[tokio::test]
    async fn remove_session_on_unknown_id_is_a_no_op() {
        let manager = SessionManager::new(test_settings());
        manager.remove_session("nonexist").await;
    }

    #[tokio::test]
    async fn reap_does_not_remove_sessions_with_attached_clients() {
        let manager = SessionManager::new(test_settings());
        let handle = manager
            .create_session(80, 24, "/bin/cat")
            .expect("create session");
        let (_client_id, _rx) = handle.attach().await.expect("attach");

        manager.reap_if_eligible(&handle.id).await;
        assert!(manager.get_session(&handle.id).is_some());

        manager.remove_session(&handle.id).await;
    }

    #[tokio::test]
    async fn shutdown_empties_the_registry() {
        let manager = SessionManager::new(test_settings());
        manager.create_session(80, 24, "/bin/cat").unwrap();
        manager.create_session(80, 24, "/bin/cat").unwrap();

        manager.shutdown().await;
        assert!(manager.list_stats().await.is_empty());
    }
}
