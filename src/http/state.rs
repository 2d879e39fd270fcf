use crate::session::{SessionDeps, SessionStats};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Live sessions, each publishing its stats through a watch channel
pub type SessionRegistry = Arc<RwLock<HashMap<String, watch::Receiver<SessionStats>>>>;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active advisor sessions (session_id → stats)
    pub sessions: SessionRegistry,

    /// Collaborators every new session is built from
    pub deps: SessionDeps,
}

impl AppState {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            deps,
        }
    }

    pub async fn register(&self, session_id: &str, stats: watch::Receiver<SessionStats>) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), stats);
    }

    pub async fn unregister(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|rx| rx.borrow().clone())
    }
}
