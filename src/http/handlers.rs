use super::state::{AppState, SessionSlot};
use crate::turn::{
    ConnectionStatus, SessionSnapshot, SessionStats, TurnController, TurnControllerHandle,
    TurnState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// How long a control request waits for the controller to apply it
const APPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// How long `end` waits for the controller task to wind down
const END_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session key (if not provided, generate UUID)
    pub session_key: Option<String>,

    /// Greeting spoken on start instead of asking the chat backend
    pub greeting: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_key: String,
    pub state: TurnState,
    pub message: String,
}

/// Session state without the turn log
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_key: String,
    pub session_id: Option<String>,
    pub state: TurnState,
    pub muted: bool,
    pub connection: ConnectionStatus,
    pub pending_transcript: String,
    pub stats: SessionStats,
}

impl SessionStatus {
    fn new(session_key: &str, snapshot: SessionSnapshot) -> Self {
        Self {
            session_key: session_key.to_string(),
            session_id: snapshot.session_id,
            state: snapshot.state,
            muted: snapshot.muted,
            connection: snapshot.connection,
            pending_transcript: snapshot.pending_transcript,
            stats: snapshot.stats,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_found(session_key: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Session {} not found", session_key),
    )
}

/// Send a command and wait until the published snapshot reflects it
async fn apply<F, P>(handle: &TurnControllerHandle, command: F, applied: P) -> SessionSnapshot
where
    F: FnOnce(&TurnControllerHandle),
    P: Fn(&SessionSnapshot) -> bool,
{
    let mut updates = handle.watch();
    command(handle);

    let result = tokio::time::timeout(
        APPLY_TIMEOUT,
        updates.wait_for(|s| applied(s) || s.state == TurnState::Ended),
    )
    .await
    .map(|seen| seen.is_ok());

    match result {
        Ok(true) => {}
        Ok(false) => debug!("Controller stopped before applying command"),
        Err(_) => warn!("Controller did not apply command within {:?}", APPLY_TIMEOUT),
    }

    handle.snapshot()
}

type Sessions = Arc<RwLock<HashMap<String, SessionSlot>>>;

/// A `Starting` slot held while a session's backend is opened.
///
/// Dropped without `commit` (request cancelled) it frees the key.
struct Reservation {
    sessions: Sessions,
    session_key: Option<String>,
}

impl Reservation {
    /// Reserve `session_key`, unless a live or starting session holds it
    async fn acquire(sessions: &Sessions, session_key: &str) -> Result<Self, Response> {
        let mut slots = sessions.write().await;

        match slots.get(session_key) {
            Some(SessionSlot::Starting) => {
                return Err(error_response(
                    StatusCode::CONFLICT,
                    format!("Session {} is already starting", session_key),
                ));
            }
            Some(SessionSlot::Running(existing)) if existing.state() != TurnState::Ended => {
                return Err(error_response(
                    StatusCode::CONFLICT,
                    format!("Session {} is already running", session_key),
                ));
            }
            // Ended sessions can be replaced
            _ => {}
        }

        slots.insert(session_key.to_string(), SessionSlot::Starting);

        Ok(Self {
            sessions: Arc::clone(sessions),
            session_key: Some(session_key.to_string()),
        })
    }

    async fn commit(mut self, handle: TurnControllerHandle) {
        if let Some(key) = self.session_key.take() {
            self.sessions
                .write()
                .await
                .insert(key, SessionSlot::Running(handle));
        }
    }

    async fn release(mut self) {
        if let Some(key) = self.session_key.take() {
            release_slot(&self.sessions, &key).await;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(key) = self.session_key.take() {
            let sessions = Arc::clone(&self.sessions);
            tokio::spawn(async move {
                release_slot(&sessions, &key).await;
            });
        }
    }
}

async fn release_slot(sessions: &Sessions, session_key: &str) {
    let mut slots = sessions.write().await;
    if matches!(slots.get(session_key), Some(SessionSlot::Starting)) {
        slots.remove(session_key);
    }
}

/// Drop the session from the registry some time after it ends on its own
fn evict_when_ended(state: &AppState, session_key: String, handle: TurnControllerHandle) {
    let sessions = Arc::clone(&state.sessions);
    let retention = state.ended_retention;
    let mut updates = handle.watch();

    tokio::spawn(async move {
        if updates
            .wait_for(|s| s.state == TurnState::Ended)
            .await
            .map(|_| ())
            .is_err()
        {
            debug!("Controller for {} stopped without publishing its end", session_key);
        }

        tokio::time::sleep(retention).await;

        let mut slots = sessions.write().await;
        let current = matches!(
            slots.get(&session_key),
            Some(SessionSlot::Running(registered)) if registered.same_session(&handle)
        );
        if current {
            slots.remove(&session_key);
            info!("Evicted ended voice session: {}", session_key);
        }
    });
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Start a new voice session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    // Generate or use provided session key
    let session_key = req
        .session_key
        .unwrap_or_else(|| format!("voice-{}", uuid::Uuid::new_v4()));

    info!("Starting voice session: {}", session_key);

    let reservation = match Reservation::acquire(&state.sessions, &session_key).await {
        Ok(reservation) => reservation,
        Err(response) => return response,
    };

    let collaborators = match state.backend.open(&session_key).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to open session backend: {:#}", e);
            reservation.release().await;
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to open session: {}", e),
            );
        }
    };

    let mut policy = state.policy.clone();
    if req.greeting.is_some() {
        policy.greeting = req.greeting;
    }

    let handle = TurnController::spawn(policy, collaborators);
    let snapshot = apply(&handle, TurnControllerHandle::start, |s| {
        s.stats.started_at.is_some()
    })
    .await;

    reservation.commit(handle.clone()).await;
    evict_when_ended(&state, session_key.clone(), handle);

    info!("Voice session started: {}", session_key);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_key: session_key.clone(),
            state: snapshot.state,
            message: format!("Voice session {} started", session_key),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_key/mute
pub async fn mute_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    let Some(handle) = state.session(&session_key).await else {
        return not_found(&session_key);
    };

    let snapshot = apply(&handle, TurnControllerHandle::mute, |s| s.muted).await;
    (StatusCode::OK, Json(SessionStatus::new(&session_key, snapshot))).into_response()
}

/// POST /sessions/:session_key/unmute
pub async fn unmute_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    let Some(handle) = state.session(&session_key).await else {
        return not_found(&session_key);
    };

    let snapshot = apply(&handle, TurnControllerHandle::unmute, |s| !s.muted).await;
    (StatusCode::OK, Json(SessionStatus::new(&session_key, snapshot))).into_response()
}

/// POST /sessions/:session_key/end
/// End a session and return its final status
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    info!("Ending voice session: {}", session_key);

    // Find and remove session
    let handle = {
        let mut sessions = state.sessions.write().await;
        if matches!(sessions.get(&session_key), Some(SessionSlot::Starting)) {
            return error_response(
                StatusCode::CONFLICT,
                format!("Session {} is still starting", session_key),
            );
        }

        match sessions.remove(&session_key) {
            Some(SessionSlot::Running(handle)) => handle,
            _ => {
                error!("Session {} not found", session_key);
                return not_found(&session_key);
            }
        }
    };

    handle.end();
    match tokio::time::timeout(END_TIMEOUT, handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Turn controller task failed: {:#}", e),
        Err(_) => warn!("Turn controller did not stop within {:?}", END_TIMEOUT),
    }

    (
        StatusCode::OK,
        Json(SessionStatus::new(&session_key, handle.snapshot())),
    )
        .into_response()
}

/// GET /sessions/:session_key/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    match state.session(&session_key).await {
        Some(handle) => (
            StatusCode::OK,
            Json(SessionStatus::new(&session_key, handle.snapshot())),
        )
            .into_response(),
        None => not_found(&session_key),
    }
}

/// GET /sessions/:session_key/transcript
/// Get the turn log accumulated so far
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Response {
    match state.session(&session_key).await {
        Some(handle) => (StatusCode::OK, Json(handle.snapshot().turn_log)).into_response(),
        None => not_found(&session_key),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
