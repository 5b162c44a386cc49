use serde::{Deserialize, Serialize};

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Request for the TTS service to speak one utterance
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeakRequestMessage {
    pub session_id: String,
    pub utterance_id: String,
    pub text: String,
    pub timestamp: String, // RFC3339 timestamp
}

/// Request for the TTS service to cut an utterance short
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeakCancelMessage {
    pub session_id: String,
    pub utterance_id: String,
}

/// Playback completion published by the TTS service
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechDoneMessage {
    pub session_id: String,
    pub utterance_id: String,
    /// Set when synthesis or playback failed
    #[serde(default)]
    pub error: Option<String>,
}
