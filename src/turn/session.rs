use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transcript::TranscriptBuffer;

/// Where the conversation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Nothing is capturing, speaking or pending
    #[default]
    Idle,
    /// Speech capture is running and transcripts are accepted
    Listening,
    /// A Remote Reply call is outstanding
    AwaitingReply,
    /// Speech output is playing a reply
    Speaking,
    /// User muted the session; nothing re-arms on its own
    Muted,
    /// Terminal
    Ended,
}

/// Who produced a logged turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
    /// Connection problems and other notices shown alongside the conversation
    System,
}

/// A single entry of the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Controller-side view of a capture or output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    #[default]
    Idle,
    /// Started and not yet asked to stop
    Active,
    /// Asked to stop; waiting for its ended event
    Stopping,
}

/// Link health towards the Remote Reply collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}

/// Identifies one Remote Reply call so late results can be told apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Identifies one scheduled re-listen timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// One voice conversation, owned by the reducer
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Conversation id handed out by the chat backend; `None` until the first reply
    pub session_id: Option<String>,

    pub state: TurnState,

    /// User-controlled mute; gates automatic re-listen
    pub muted: bool,

    /// Append-only conversation log, in processing order
    pub turn_log: Vec<Turn>,

    pub capture: DeviceState,

    pub output: DeviceState,

    pub connection: ConnectionStatus,

    /// When `start()` was accepted
    pub started_at: Option<DateTime<Utc>>,

    /// When the session reached `Ended`
    pub ended_at: Option<DateTime<Utc>>,

    pub(crate) transcript: TranscriptBuffer,
    pub(crate) in_flight: Option<RequestId>,
    pub(crate) queued_speech: Option<String>,
    pub(crate) listen_armed: bool,
    pub(crate) relisten_timer: Option<TimerId>,
    pub(crate) consecutive_failures: u32,
    pub(crate) reply_failures: u32,
    next_id: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interim hypothesis for the utterance being captured
    pub fn pending_transcript(&self) -> &str {
        self.transcript.pending()
    }

    /// The Remote Reply call currently outstanding, if any
    pub fn awaiting_reply(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// The re-listen timer currently armed, if any
    pub fn relisten_timer(&self) -> Option<TimerId> {
        self.relisten_timer
    }

    pub fn is_live(&self) -> bool {
        self.state != TurnState::Ended
    }

    /// Capture and output are never both engaged
    pub fn devices_exclusive(&self) -> bool {
        self.capture == DeviceState::Idle || self.output == DeviceState::Idle
    }

    pub(crate) fn log(&mut self, speaker: Speaker, text: impl Into<String>, now: DateTime<Utc>) {
        // Keep the log monotonic even if the wall clock steps back
        let timestamp = match self.turn_log.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.turn_log.push(Turn {
            speaker,
            text: text.into(),
            timestamp,
        });
    }

    pub(crate) fn next_request(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }

    pub(crate) fn next_timer(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> SessionStats {
        let count = |speaker: Speaker| self.turn_log.iter().filter(|t| t.speaker == speaker).count();
        let duration_secs = self
            .started_at
            .map(|started| {
                let until = self.ended_at.unwrap_or(now);
                until.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            })
            .unwrap_or(0.0);

        SessionStats {
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_secs,
            user_turns: count(Speaker::User),
            agent_turns: count(Speaker::Agent),
            reply_failures: self.reply_failures,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state,
            muted: self.muted,
            pending_transcript: self.pending_transcript().to_string(),
            connection: self.connection,
            capture: self.capture,
            output: self.output,
            turn_log: self.turn_log.clone(),
            stats: self.stats(now),
        }
    }
}

/// Statistics about a voice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub started_at: Option<DateTime<Utc>>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Seconds since start (or until end, once ended)
    pub duration_secs: f64,

    pub user_turns: usize,

    pub agent_turns: usize,

    /// Remote Reply failures over the whole session
    pub reply_failures: u32,
}

/// Read-only copy of a session published to observers after every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: TurnState,
    pub muted: bool,
    pub pending_transcript: String,
    pub connection: ConnectionStatus,
    pub capture: DeviceState,
    pub output: DeviceState,
    pub turn_log: Vec<Turn>,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    pub fn capture_active(&self) -> bool {
        self.capture != DeviceState::Idle
    }

    pub fn output_active(&self) -> bool {
        self.output != DeviceState::Idle
    }
}
