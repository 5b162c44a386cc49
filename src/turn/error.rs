use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::session::TurnState;

/// Why the speech recognizer reported an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureErrorKind {
    /// Microphone access was refused; capture cannot resume on its own
    PermissionDenied,
    /// Speech was heard but nothing was recognized
    NoMatch,
    /// No speech was detected before the recognizer gave up
    NoSpeech,
    /// Recognition was aborted (usually by our own stop)
    Aborted,
    /// Recognizer transport failed
    Network,
    /// The capture device could not be started at all
    Unavailable,
    Other,
}

impl CaptureErrorKind {
    /// Whether listening can be re-armed automatically after this error
    pub fn is_recoverable(self) -> bool {
        !matches!(
            self,
            CaptureErrorKind::PermissionDenied | CaptureErrorKind::Unavailable
        )
    }
}

/// Failure of a Remote Reply call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("network error: {0}")]
    Network(String),

    #[error("chat backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("malformed reply: {0}")]
    Decode(String),
}

/// Everything that can go wrong inside a voice session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error("speech capture error: {0:?}")]
    Capture(CaptureErrorKind),

    #[error("speech output error: {0}")]
    Output(String),

    #[error("remote reply failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("{event} is not allowed while {state:?}")]
    ProtocolViolation { state: TurnState, event: &'static str },
}
