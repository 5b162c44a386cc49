// Fake speech devices and chat backend shared by the integration tests.
//
// The fakes record every call and track which device is engaged so tests
// can assert that capture and output never overlap.

#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use loqa_voice::reply::{RemoteReply, Reply};
use loqa_voice::speech::{
    CaptureEvent, CaptureSink, OutputEvent, OutputSink, SpeechCapture, SpeechOutput,
};
use loqa_voice::turn::{Collaborators, ReplyError, SessionSnapshot, TurnPolicy, TurnState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Which devices are engaged right now, and whether they ever overlapped
#[derive(Debug, Default)]
pub struct DeviceMonitor {
    pub capture_active: bool,
    pub output_active: bool,
    pub overlapped: bool,
}

impl DeviceMonitor {
    fn check(&mut self) {
        if self.capture_active && self.output_active {
            self.overlapped = true;
        }
    }
}

pub type Monitor = Arc<Mutex<DeviceMonitor>>;

/// Recognizer whose transcripts are pushed by the test
#[derive(Clone, Default)]
pub struct FakeCapture {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    sink: Arc<Mutex<Option<CaptureSink>>>,
    monitor: Monitor,
}

impl FakeCapture {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Deliver a recognizer event as if it came from the device
    pub fn emit(&self, event: CaptureEvent) {
        let sink = self.sink.lock().unwrap();
        if let Some(sink) = sink.as_ref() {
            let _ = sink.send(event);
        }
    }

    pub fn interim(&self, text: &str) {
        self.emit(CaptureEvent::Interim(text.to_string()));
    }

    pub fn final_text(&self, text: &str) {
        self.emit(CaptureEvent::Final(text.to_string()));
    }
}

#[async_trait::async_trait]
impl SpeechCapture for FakeCapture {
    async fn start(&mut self, events: CaptureSink) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        {
            let mut monitor = self.monitor.lock().unwrap();
            monitor.capture_active = true;
            monitor.check();
        }
        let _ = events.send(CaptureEvent::Started);
        *self.sink.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.monitor.lock().unwrap().capture_active = false;
        if let Some(sink) = self.sink.lock().unwrap().take() {
            let _ = sink.send(CaptureEvent::Ended);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-capture"
    }
}

/// Synthesizer that "plays" until the test calls `finish`
#[derive(Clone, Default)]
pub struct FakeOutput {
    pub spoken: Arc<Mutex<Vec<String>>>,
    pub cancels: Arc<AtomicUsize>,
    sink: Arc<Mutex<Option<OutputSink>>>,
    monitor: Monitor,
}

impl FakeOutput {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            ..Default::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Playback completes
    pub fn finish(&self) {
        self.monitor.lock().unwrap().output_active = false;
        if let Some(sink) = self.sink.lock().unwrap().take() {
            let _ = sink.send(OutputEvent::Ended);
        }
    }

    /// Synthesis fails mid-playback
    pub fn fail(&self, message: &str) {
        self.monitor.lock().unwrap().output_active = false;
        if let Some(sink) = self.sink.lock().unwrap().take() {
            let _ = sink.send(OutputEvent::Error(message.to_string()));
        }
    }
}

#[async_trait::async_trait]
impl SpeechOutput for FakeOutput {
    async fn speak(&mut self, text: &str, events: OutputSink) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        {
            let mut monitor = self.monitor.lock().unwrap();
            monitor.output_active = true;
            monitor.check();
        }
        let _ = events.send(OutputEvent::Started);
        *self.sink.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn cancel(&mut self) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.finish();
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-output"
    }
}

/// Chat backend answering from a script, optionally held until released
#[derive(Clone, Default)]
pub struct ScriptedReply {
    pub calls: Arc<Mutex<Vec<(Option<String>, String)>>>,
    script: Arc<Mutex<VecDeque<Result<String, ReplyError>>>>,
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
}

impl ScriptedReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: ReplyError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Hold every reply until `gate.notify_one()`
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Take this long to answer
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(Option<String>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteReply for ScriptedReply {
    async fn send_message(
        &self,
        session_id: Option<&str>,
        text: &str,
    ) -> Result<Reply, ReplyError> {
        self.calls
            .lock()
            .unwrap()
            .push((session_id.map(str::to_string), text.to_string()));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(Reply {
                session_id: "conv-1".to_string(),
                text,
                timestamp: Utc::now(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(ReplyError::Network("script exhausted".to_string())),
        }
    }
}

/// One fake session: devices, backend and the monitor they share
#[derive(Clone)]
pub struct Harness {
    pub capture: FakeCapture,
    pub output: FakeOutput,
    pub reply: ScriptedReply,
    pub monitor: Monitor,
}

impl Harness {
    pub fn new(reply: ScriptedReply) -> Self {
        let monitor = Monitor::default();
        Self {
            capture: FakeCapture::new(monitor.clone()),
            output: FakeOutput::new(monitor.clone()),
            reply,
            monitor,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            capture: Box::new(self.capture.clone()),
            output: Box::new(self.output.clone()),
            reply: Arc::new(self.reply.clone()),
        }
    }

    pub fn overlapped(&self) -> bool {
        self.monitor.lock().unwrap().overlapped
    }
}

pub fn policy_with_greeting(greeting: &str) -> TurnPolicy {
    TurnPolicy {
        greeting: Some(greeting.to_string()),
        ..TurnPolicy::default()
    }
}

/// Wait until the published snapshot satisfies `pred`
pub async fn wait_until<F>(updates: &mut watch::Receiver<SessionSnapshot>, pred: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let snapshot = tokio::time::timeout(Duration::from_secs(60), updates.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for session state")
        .expect("controller stopped");
    snapshot.clone()
}

pub async fn wait_for_state(
    updates: &mut watch::Receiver<SessionSnapshot>,
    state: TurnState,
) -> SessionSnapshot {
    wait_until(updates, |s| s.state == state).await
}
