use anyhow::{Context, Result};
use async_nats::Client;
use tracing::info;

use super::messages::{SpeakCancelMessage, SpeakRequestMessage};
use crate::config::NatsConfig;

pub struct NatsClient {
    client: Client,
    session_key: String,
    subjects: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(config: &NatsConfig, session_key: String) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            session_key,
            subjects: config.clone(),
        })
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Subscribe to transcript messages
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        // loqa-core publishes to stt.text.partial and stt.text.final;
        // we filter by session_id in the message payload
        let subject = format!("{}.>", self.subjects.stt_subject);

        info!("Subscribing to transcripts on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject)
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }

    /// Subscribe to playback completions from the TTS service
    pub async fn subscribe_speech_done(&self) -> Result<async_nats::Subscriber> {
        let subject = self.subjects.tts_done_subject.clone();

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        Ok(subscriber)
    }

    /// Ask the TTS service to speak `text`
    pub async fn publish_speak_request(&self, utterance_id: &str, text: &str) -> Result<()> {
        let message = SpeakRequestMessage {
            session_id: self.session_key.clone(),
            utterance_id: utterance_id.to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(self.subjects.tts_subject.clone(), payload.into())
            .await
            .context("Failed to publish speak request")?;

        info!(
            "Published speak request to {} (utterance={}, chars={})",
            self.subjects.tts_subject,
            utterance_id,
            text.len()
        );

        Ok(())
    }

    /// Ask the TTS service to stop an utterance
    pub async fn publish_speak_cancel(&self, utterance_id: &str) -> Result<()> {
        let message = SpeakCancelMessage {
            session_id: self.session_key.clone(),
            utterance_id: utterance_id.to_string(),
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(self.subjects.tts_cancel_subject.clone(), payload.into())
            .await
            .context("Failed to publish speak cancel")?;

        Ok(())
    }
}
