//! Voice conversation turn-taking
//!
//! This module arbitrates between listening, speaking and waiting on the
//! chat backend so a hands-free voice loop never hears its own output:
//! - `Session`: the owned conversation state and turn log
//! - `reduce`: pure transition function from events to effects
//! - `TurnController`: tokio task that feeds events to the reducer and
//!   executes its effects against the speech and reply collaborators
//! - `TurnPolicy`: quiet delay, retry budget, reply timeout and backoff

mod controller;
mod error;
mod policy;
mod reducer;
mod session;
mod transcript;

pub use controller::{Collaborators, TurnController, TurnControllerHandle};
pub use error::{CaptureErrorKind, ReplyError, TurnError};
pub use policy::TurnPolicy;
pub use reducer::{reduce, Effect, EndReason, TurnEvent, TurnNotification};
pub use session::{
    ConnectionStatus, DeviceState, RequestId, Session, SessionSnapshot, SessionStats, Speaker,
    TimerId, Turn, TurnState,
};
pub use transcript::{normalize, TranscriptBuffer};
