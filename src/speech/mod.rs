//! Speech capture and speech output collaborators
//!
//! The turn controller drives these through two traits and receives their
//! callbacks as events on channels it hands out:
//! - `SpeechCapture`: continuous recognizer emitting interim/final text
//! - `SpeechOutput`: synthesizer speaking one reply at a time
//!
//! NATS-backed implementations talk to the loqa STT and TTS services.

pub mod nats;

use crate::turn::CaptureErrorKind;
use anyhow::Result;
use tokio::sync::mpsc;

pub use nats::{NatsSpeechCapture, NatsSpeechOutput};

/// Callback from a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started,
    /// Full-so-far hypothesis for the current utterance
    Interim(String),
    /// Recognizer committed the utterance
    Final(String),
    Error(CaptureErrorKind),
    /// Recognizer fully stopped; the microphone is free
    Ended,
}

/// Callback from a speech synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Started,
    /// Playback finished or was cancelled; the speaker is free
    Ended,
    Error(String),
}

pub type CaptureSink = mpsc::UnboundedSender<CaptureEvent>;
pub type OutputSink = mpsc::UnboundedSender<OutputEvent>;

/// Speech recognizer running in continuous mode
///
/// Implementations must emit `CaptureEvent::Ended` on the sink once the
/// device is released, both after `stop()` and when recognition ends on
/// its own. The controller never starts output before seeing it.
#[async_trait::async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Begin recognizing; events go to `events` until `Ended`
    async fn start(&mut self, events: CaptureSink) -> Result<()>;

    /// Stop recognizing
    async fn stop(&mut self) -> Result<()>;

    /// Get capture name for logging
    fn name(&self) -> &str;
}

/// Speech synthesizer
///
/// Implementations must emit `OutputEvent::Ended` on the sink when playback
/// completes or is cancelled.
#[async_trait::async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Start speaking `text`; returns once playback has been queued
    async fn speak(&mut self, text: &str, events: OutputSink) -> Result<()>;

    /// Cut off current playback
    async fn cancel(&mut self) -> Result<()>;

    /// Get output name for logging
    fn name(&self) -> &str;
}
