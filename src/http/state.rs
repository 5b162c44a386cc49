use crate::backend::SessionBackend;
use crate::turn::{TurnControllerHandle, TurnPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How long a session that ended on its own stays queryable
pub const ENDED_RETENTION: Duration = Duration::from_secs(60);

/// Registry entry for one session key
#[derive(Clone)]
pub enum SessionSlot {
    /// Key reserved while the backend is being opened
    Starting,
    Running(TurnControllerHandle),
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Voice sessions (session_key → controller)
    pub sessions: Arc<RwLock<HashMap<String, SessionSlot>>>,

    /// Opens devices and chat backend for new sessions
    pub backend: Arc<dyn SessionBackend>,

    /// Policy applied to new sessions
    pub policy: TurnPolicy,

    /// Ended sessions are evicted after this long
    pub ended_retention: Duration,
}

impl AppState {
    pub fn new(backend: Arc<dyn SessionBackend>, policy: TurnPolicy) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            backend,
            policy,
            ended_retention: ENDED_RETENTION,
        }
    }

    /// Handle of a running session
    pub async fn session(&self, session_key: &str) -> Option<TurnControllerHandle> {
        let sessions = self.sessions.read().await;
        match sessions.get(session_key) {
            Some(SessionSlot::Running(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Number of registered keys, including reservations
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
