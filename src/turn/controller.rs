use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::{CaptureErrorKind, ReplyError};
use super::policy::TurnPolicy;
use super::reducer::{reduce, Effect, TurnEvent, TurnNotification};
use super::session::{Session, SessionSnapshot, TimerId, TurnState};
use crate::reply::RemoteReply;
use crate::speech::{CaptureEvent, CaptureSink, OutputEvent, OutputSink, SpeechCapture, SpeechOutput};

/// Capacity of the notification broadcast channel
const NOTIFICATION_CAPACITY: usize = 256;

/// The devices and backend a session talks to
pub struct Collaborators {
    pub capture: Box<dyn SpeechCapture>,
    pub output: Box<dyn SpeechOutput>,
    pub reply: Arc<dyn RemoteReply>,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Start,
    Mute,
    Unmute,
    End,
}

impl From<Command> for TurnEvent {
    fn from(command: Command) -> Self {
        match command {
            Command::Start => TurnEvent::Start,
            Command::Mute => TurnEvent::Mute,
            Command::Unmute => TurnEvent::Unmute,
            Command::End => TurnEvent::End,
        }
    }
}

/// Runs one voice session on its own task.
///
/// All events (commands, device callbacks, reply results, timers) are fed
/// through a single queue into the reducer, so session state is never
/// touched concurrently.
pub struct TurnController {
    policy: TurnPolicy,
    capture: Box<dyn SpeechCapture>,
    output: Box<dyn SpeechOutput>,
    reply: Arc<dyn RemoteReply>,
    capture_tx: CaptureSink,
    output_tx: OutputSink,
    internal_tx: mpsc::UnboundedSender<TurnEvent>,
    timers: HashMap<TimerId, JoinHandle<()>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    notify_tx: broadcast::Sender<TurnNotification>,
}

impl TurnController {
    /// Spawn the controller task and return a handle to drive it
    pub fn spawn(policy: TurnPolicy, collaborators: Collaborators) -> TurnControllerHandle {
        let session = Session::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot(Utc::now()));
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        info!(
            "Creating turn controller (capture: {}, output: {})",
            collaborators.capture.name(),
            collaborators.output.name()
        );

        let controller = Self {
            policy,
            capture: collaborators.capture,
            output: collaborators.output,
            reply: collaborators.reply,
            capture_tx,
            output_tx,
            internal_tx,
            timers: HashMap::new(),
            snapshot_tx,
            notify_tx: notify_tx.clone(),
        };

        let task = tokio::spawn(controller.run(session, command_rx, capture_rx, output_rx, internal_rx));

        TurnControllerHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            notifications: notify_tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(
        mut self,
        mut session: Session,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
        mut output_rx: mpsc::UnboundedReceiver<OutputEvent>,
        mut internal_rx: mpsc::UnboundedReceiver<TurnEvent>,
    ) {
        info!("Turn controller task started");

        loop {
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => TurnEvent::from(command),
                    // Every handle is gone; nobody can end the session later
                    None => TurnEvent::End,
                },
                Some(event) = capture_rx.recv() => TurnEvent::Capture(event),
                Some(event) = output_rx.recv() => TurnEvent::Output(event),
                Some(event) = internal_rx.recv() => event,
            };

            let (next, effects) = reduce(session, event, &self.policy, Utc::now());
            session = next;

            for effect in effects {
                self.apply(effect).await;
            }

            self.snapshot_tx.send_replace(session.snapshot(Utc::now()));

            if session.state == TurnState::Ended {
                break;
            }
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }

        info!("Turn controller task stopped");
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StartCapture => {
                if let Err(e) = self.capture.start(self.capture_tx.clone()).await {
                    error!("Failed to start speech capture: {:#}", e);
                    let _ = self
                        .capture_tx
                        .send(CaptureEvent::Error(CaptureErrorKind::Unavailable));
                    let _ = self.capture_tx.send(CaptureEvent::Ended);
                }
            }

            Effect::StopCapture => {
                if let Err(e) = self.capture.stop().await {
                    // Treat as stopped so the session does not wait forever
                    warn!("Failed to stop speech capture: {:#}", e);
                    let _ = self.capture_tx.send(CaptureEvent::Ended);
                }
            }

            Effect::Speak(text) => {
                if let Err(e) = self.output.speak(&text, self.output_tx.clone()).await {
                    let _ = self.output_tx.send(OutputEvent::Error(format!("{:#}", e)));
                }
            }

            Effect::CancelOutput => {
                if let Err(e) = self.output.cancel().await {
                    warn!("Failed to cancel speech output: {:#}", e);
                    let _ = self.output_tx.send(OutputEvent::Ended);
                }
            }

            Effect::SendMessage {
                request,
                session_id,
                text,
            } => {
                let reply = Arc::clone(&self.reply);
                let events = self.internal_tx.clone();
                let limit = self.policy.reply_timeout;

                // Not cancelled on end/mute; the reducer discards stale results
                tokio::spawn(async move {
                    let result =
                        match tokio::time::timeout(limit, reply.send_message(session_id.as_deref(), &text))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(ReplyError::Timeout(limit)),
                        };

                    if events.send(TurnEvent::Reply { request, result }).is_err() {
                        debug!(?request, "controller gone, reply dropped");
                    }
                });
            }

            Effect::ScheduleRelisten { timer, delay } => {
                self.timers.retain(|_, handle| !handle.is_finished());

                let events = self.internal_tx.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(TurnEvent::QuietElapsed(timer));
                });
                self.timers.insert(timer, handle);
            }

            Effect::CancelTimer(timer) => {
                if let Some(handle) = self.timers.remove(&timer) {
                    handle.abort();
                }
            }

            Effect::Notify(notification) => {
                debug!(?notification, "turn notification");
                // No subscribers is fine
                let _ = self.notify_tx.send(notification);
            }
        }
    }
}

/// Handle held by UI observers and the HTTP API
#[derive(Clone)]
pub struct TurnControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    notifications: broadcast::Sender<TurnNotification>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TurnControllerHandle {
    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn mute(&self) {
        self.send(Command::Mute);
    }

    pub fn unmute(&self) {
        self.send(Command::Unmute);
    }

    pub fn end(&self) {
        self.send(Command::End);
    }

    /// Latest published session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> TurnState {
        self.snapshot.borrow().state
    }

    /// Receiver that is updated after every processed event
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Stream of notifications from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TurnNotification> {
        self.notifications.subscribe()
    }

    /// Wait for the controller task to finish
    pub async fn join(&self) -> Result<()> {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            task.await?;
        }
        Ok(())
    }

    /// Whether both handles drive the same controller task
    pub fn same_session(&self, other: &TurnControllerHandle) -> bool {
        Arc::ptr_eq(&self.task, &other.task)
    }

    fn send(&self, command: Command) {
        // After the session ended every command is a no-op
        if self.commands.send(command).is_err() {
            debug!(?command, "turn controller already stopped");
        }
    }
}
