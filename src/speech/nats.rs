use anyhow::{Context, Result};
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{CaptureEvent, CaptureSink, OutputEvent, OutputSink, SpeechCapture, SpeechOutput};
use crate::nats::{NatsClient, SpeechDoneMessage, TranscriptMessage};
use crate::turn::CaptureErrorKind;

/// Speech capture fed by the loqa STT service over NATS
pub struct NatsSpeechCapture {
    client: Arc<NatsClient>,
    task: Option<JoinHandle<()>>,
    events: Option<CaptureSink>,
}

impl NatsSpeechCapture {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self {
            client,
            task: None,
            events: None,
        }
    }
}

/// Map an STT message to a capture event for `session_key`
pub fn transcript_event(message: &TranscriptMessage, session_key: &str) -> Option<CaptureEvent> {
    if message.session_id != session_key {
        return None;
    }

    if message.partial {
        Some(CaptureEvent::Interim(message.text.clone()))
    } else {
        Some(CaptureEvent::Final(message.text.clone()))
    }
}

/// Forward STT payloads for `session_key` as capture events.
///
/// A subscription that closes on its own is reported as a network error
/// followed by ended.
pub async fn forward_transcripts<S, P>(mut payloads: S, session_key: &str, events: &CaptureSink)
where
    S: Stream<Item = P> + Unpin,
    P: AsRef<[u8]>,
{
    while let Some(payload) = payloads.next().await {
        let transcript = match serde_json::from_slice::<TranscriptMessage>(payload.as_ref()) {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Failed to parse transcript message: {}", e);
                continue;
            }
        };

        if let Some(event) = transcript_event(&transcript, session_key) {
            if events.send(event).is_err() {
                return;
            }
        }
    }

    warn!("Transcript subscription closed");
    let _ = events.send(CaptureEvent::Error(CaptureErrorKind::Network));
    let _ = events.send(CaptureEvent::Ended);
}

#[async_trait::async_trait]
impl SpeechCapture for NatsSpeechCapture {
    async fn start(&mut self, events: CaptureSink) -> Result<()> {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Speech capture already started");
            return Ok(());
        }

        let subscriber = self
            .client
            .subscribe_transcripts()
            .await
            .context("Failed to start speech capture")?;

        let session_key = self.client.session_key().to_string();
        let sink = events.clone();

        let task = tokio::spawn(async move {
            info!("Transcript receiving task started");
            forward_transcripts(subscriber.map(|msg| msg.payload), &session_key, &sink).await;
            info!("Transcript receiving task stopped");
        });

        let _ = events.send(CaptureEvent::Started);
        self.task = Some(task);
        self.events = Some(events);

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let events = self.events.take();

        if let Some(task) = self.task.take() {
            // A finished task already reported its end
            if task.is_finished() {
                return Ok(());
            }
            task.abort();
        }

        if let Some(events) = events {
            let _ = events.send(CaptureEvent::Ended);
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "nats-stt"
    }
}

/// Speech output rendered by the loqa TTS service over NATS
pub struct NatsSpeechOutput {
    client: Arc<NatsClient>,
    current: Option<Playback>,
}

struct Playback {
    utterance_id: String,
    waiter: JoinHandle<()>,
    events: OutputSink,
}

impl NatsSpeechOutput {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self {
            client,
            current: None,
        }
    }
}

#[async_trait::async_trait]
impl SpeechOutput for NatsSpeechOutput {
    async fn speak(&mut self, text: &str, events: OutputSink) -> Result<()> {
        if let Some(previous) = self.current.take() {
            if !previous.waiter.is_finished() {
                warn!("Replacing unfinished utterance {}", previous.utterance_id);
                previous.waiter.abort();
            }
        }

        let utterance_id = uuid::Uuid::new_v4().to_string();

        // Subscribe before publishing so a fast completion is not missed
        let mut done = self.client.subscribe_speech_done().await?;
        let session_key = self.client.session_key().to_string();
        let expected = utterance_id.clone();
        let sink = events.clone();

        let waiter = tokio::spawn(async move {
            while let Some(msg) = done.next().await {
                let Ok(message) = serde_json::from_slice::<SpeechDoneMessage>(&msg.payload) else {
                    continue;
                };
                if message.session_id != session_key || message.utterance_id != expected {
                    continue;
                }

                let event = match message.error {
                    Some(error) => OutputEvent::Error(error),
                    None => OutputEvent::Ended,
                };
                let _ = sink.send(event);
                return;
            }

            let _ = sink.send(OutputEvent::Error(
                "speech completion subscription closed".to_string(),
            ));
        });

        if let Err(e) = self.client.publish_speak_request(&utterance_id, text).await {
            waiter.abort();
            return Err(e);
        }

        let _ = events.send(OutputEvent::Started);
        self.current = Some(Playback {
            utterance_id,
            waiter,
            events,
        });

        Ok(())
    }

    async fn cancel(&mut self) -> Result<()> {
        let Some(playback) = self.current.take() else {
            return Ok(());
        };

        // Completion already reported
        if playback.waiter.is_finished() {
            return Ok(());
        }

        playback.waiter.abort();
        let result = self.client.publish_speak_cancel(&playback.utterance_id).await;
        let _ = playback.events.send(OutputEvent::Ended);

        result
    }

    fn name(&self) -> &str {
        "nats-tts"
    }
}
