use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{CaptureErrorKind, ReplyError, TurnError};
use super::policy::TurnPolicy;
use super::session::{ConnectionStatus, DeviceState, RequestId, Session, Speaker, TimerId, TurnState};
use crate::reply::Reply;
use crate::speech::{CaptureEvent, OutputEvent};

/// Everything that can happen to a session
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Start,
    Mute,
    Unmute,
    End,
    Capture(CaptureEvent),
    Output(OutputEvent),
    Reply {
        request: RequestId,
        result: Result<Reply, ReplyError>,
    },
    /// A re-listen timer fired
    QuietElapsed(TimerId),
}

/// Side effects the driver must carry out, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartCapture,
    StopCapture,
    Speak(String),
    CancelOutput,
    SendMessage {
        request: RequestId,
        session_id: Option<String>,
        text: String,
    },
    ScheduleRelisten {
        timer: TimerId,
        delay: Duration,
    },
    CancelTimer(TimerId),
    Notify(TurnNotification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// `end()` was called
    Requested,
    /// Reply retries were exhausted
    Disconnected,
}

/// Change reported to UI observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnNotification {
    StateChanged { from: TurnState, to: TurnState },
    Connection { status: ConnectionStatus },
    CaptureFailed { kind: CaptureErrorKind },
    OutputFailed { message: String },
    Ended { reason: EndReason },
}

/// Apply one event to a session.
///
/// Returns the updated session and the effects to perform. Events that the
/// current state does not accept are logged and leave the session as is.
pub fn reduce(
    mut session: Session,
    event: TurnEvent,
    policy: &TurnPolicy,
    now: DateTime<Utc>,
) -> (Session, Vec<Effect>) {
    let mut effects = Vec::new();

    if !session.is_live() {
        debug!(?event, "session ended, dropping event");
        return (session, effects);
    }

    let before = session.state;

    match event {
        TurnEvent::Start => on_start(&mut session, policy, now, &mut effects),
        TurnEvent::Mute => on_mute(&mut session, &mut effects),
        TurnEvent::Unmute => on_unmute(&mut session),
        TurnEvent::End => end_session(&mut session, EndReason::Requested, now, &mut effects),
        TurnEvent::Capture(event) => on_capture(&mut session, event, policy, now, &mut effects),
        TurnEvent::Output(event) => on_output(&mut session, event, policy, &mut effects),
        TurnEvent::Reply { request, result } => {
            on_reply(&mut session, request, result, policy, now, &mut effects)
        }
        TurnEvent::QuietElapsed(timer) => on_quiet_elapsed(&mut session, timer),
    }

    reconcile(&mut session, &mut effects);

    if session.state != before {
        debug!("turn state {:?} -> {:?}", before, session.state);
        effects.push(Effect::Notify(TurnNotification::StateChanged {
            from: before,
            to: session.state,
        }));
    }

    (session, effects)
}

fn on_start(session: &mut Session, policy: &TurnPolicy, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
    if session.started_at.is_some() {
        violation(session.state, "start");
        return;
    }

    info!("Starting voice session");
    session.started_at = Some(now);

    match policy.greeting_text() {
        Some(greeting) => {
            session.log(Speaker::Agent, greeting, now);
            if !session.muted {
                session.queued_speech = Some(greeting.to_string());
            }
        }
        None => {
            let request = session.next_request();
            session.in_flight = Some(request);
            effects.push(Effect::SendMessage {
                request,
                session_id: session.session_id.clone(),
                text: policy.greeting_prompt.clone(),
            });
        }
    }

    session.state = if session.muted {
        TurnState::Muted
    } else {
        TurnState::AwaitingReply
    };
}

fn on_mute(session: &mut Session, effects: &mut Vec<Effect>) {
    if session.muted {
        debug!("already muted");
        return;
    }

    info!("Muting voice session");
    session.muted = true;
    session.listen_armed = false;
    session.queued_speech = None;
    session.transcript.clear();
    cancel_relisten(session, effects);
    stop_capture(session, effects);
    cancel_output(session, effects);
    session.state = TurnState::Muted;
}

fn on_unmute(session: &mut Session) {
    if !session.muted {
        violation(session.state, "unmute");
        return;
    }

    info!("Unmuting voice session");
    session.muted = false;

    if session.started_at.is_none() {
        session.state = TurnState::Idle;
    } else if session.in_flight.is_some() {
        session.state = TurnState::AwaitingReply;
    } else {
        // Listening begins in reconcile once both devices are idle
        session.state = TurnState::Idle;
        session.listen_armed = true;
    }
}

fn on_capture(
    session: &mut Session,
    event: CaptureEvent,
    policy: &TurnPolicy,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    match event {
        CaptureEvent::Started => debug!("speech capture started"),

        CaptureEvent::Interim(text) => {
            if session.state != TurnState::Listening {
                violation(session.state, "interim transcript");
                return;
            }
            session.transcript.interim(&text);
        }

        CaptureEvent::Final(text) => {
            if session.state != TurnState::Listening {
                violation(session.state, "final transcript");
                return;
            }

            let Some(utterance) = session.transcript.finalize(&text) else {
                debug!("empty utterance ignored");
                return;
            };

            info!("User said: {}", utterance);
            stop_capture(session, effects);
            session.log(Speaker::User, utterance.as_str(), now);

            let request = session.next_request();
            session.in_flight = Some(request);
            effects.push(Effect::SendMessage {
                request,
                session_id: session.session_id.clone(),
                text: utterance,
            });
            session.state = TurnState::AwaitingReply;
        }

        CaptureEvent::Error(kind) => {
            warn!("{}", TurnError::Capture(kind));
            effects.push(Effect::Notify(TurnNotification::CaptureFailed { kind }));

            if !kind.is_recoverable() {
                // Wait for the user to re-enable capture via mute/unmute
                session.listen_armed = false;
                cancel_relisten(session, effects);
                stop_capture(session, effects);
                session.transcript.clear();
                if session.state == TurnState::Listening {
                    session.state = TurnState::Idle;
                }
            }
        }

        CaptureEvent::Ended => {
            let was = session.capture;
            session.capture = DeviceState::Idle;

            if was == DeviceState::Active && session.state == TurnState::Listening {
                // Recognizer stopped on its own; re-arm after a pause
                debug!("speech capture ended unexpectedly, re-arming");
                session.transcript.clear();
                session.state = TurnState::Idle;
                schedule_relisten(session, policy.quiet_delay, effects);
            }
        }
    }
}

fn on_output(session: &mut Session, event: OutputEvent, policy: &TurnPolicy, effects: &mut Vec<Effect>) {
    match event {
        OutputEvent::Started => debug!("speech output started"),

        OutputEvent::Ended | OutputEvent::Error(_) => {
            if let OutputEvent::Error(message) = event {
                warn!("{}", TurnError::Output(message.clone()));
                effects.push(Effect::Notify(TurnNotification::OutputFailed { message }));
            }

            let was = session.output;
            session.output = DeviceState::Idle;

            if was == DeviceState::Idle {
                debug!("speech output already idle");
                return;
            }

            if session.state == TurnState::Speaking {
                session.state = TurnState::Idle;
                if !session.muted {
                    schedule_relisten(session, policy.quiet_delay, effects);
                }
            }
        }
    }
}

fn on_reply(
    session: &mut Session,
    request: RequestId,
    result: Result<Reply, ReplyError>,
    policy: &TurnPolicy,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    if session.in_flight != Some(request) {
        debug!(?request, "discarding reply for a request that is no longer outstanding");
        return;
    }
    session.in_flight = None;

    match result {
        Ok(reply) => {
            session.consecutive_failures = 0;
            set_connection(session, ConnectionStatus::Connected, effects);

            if session.session_id.is_none() {
                info!("Bound conversation {}", reply.session_id);
                session.session_id = Some(reply.session_id);
            }

            let text = reply.text.trim();
            if text.is_empty() {
                warn!("Chat backend returned an empty reply");
                if !session.muted {
                    session.state = TurnState::Idle;
                    session.listen_armed = true;
                }
                return;
            }

            info!("Agent replied: {}", text);
            session.log(Speaker::Agent, text, now);

            if session.muted {
                debug!("muted, reply logged but not spoken");
            } else {
                session.queued_speech = Some(text.to_string());
            }
        }

        Err(err) => {
            session.consecutive_failures += 1;
            session.reply_failures += 1;
            let attempt = session.consecutive_failures;

            warn!(
                "Remote reply failed ({}/{}): {}",
                attempt, policy.retry_budget, err
            );
            session.log(Speaker::System, format!("Connection problem: {}", err), now);

            if attempt >= policy.retry_budget {
                set_connection(session, ConnectionStatus::Disconnected, effects);
                end_session(session, EndReason::Disconnected, now, effects);
                return;
            }

            set_connection(session, ConnectionStatus::Reconnecting { attempt }, effects);
            if !session.muted {
                session.state = TurnState::Idle;
                schedule_relisten(session, policy.backoff(attempt), effects);
            }
        }
    }
}

fn on_quiet_elapsed(session: &mut Session, timer: TimerId) {
    if session.relisten_timer != Some(timer) {
        debug!(?timer, "stale re-listen timer");
        return;
    }

    session.relisten_timer = None;
    if !session.muted {
        session.listen_armed = true;
    }
}

fn end_session(session: &mut Session, reason: EndReason, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
    info!("Ending voice session ({:?})", reason);

    cancel_relisten(session, effects);
    stop_capture(session, effects);
    cancel_output(session, effects);
    session.in_flight = None;
    session.queued_speech = None;
    session.listen_armed = false;
    session.transcript.clear();
    session.ended_at = Some(now);
    session.state = TurnState::Ended;

    effects.push(Effect::Notify(TurnNotification::Ended { reason }));
}

/// Start whichever device the session is waiting for, once both are idle
fn reconcile(session: &mut Session, effects: &mut Vec<Effect>) {
    if !session.is_live() || session.muted {
        return;
    }

    if session.capture != DeviceState::Idle || session.output != DeviceState::Idle {
        return;
    }

    if let Some(text) = session.queued_speech.take() {
        session.listen_armed = false;
        session.output = DeviceState::Active;
        session.state = TurnState::Speaking;
        effects.push(Effect::Speak(text));
        return;
    }

    if session.listen_armed && session.in_flight.is_none() {
        session.listen_armed = false;
        session.transcript.clear();
        session.capture = DeviceState::Active;
        session.state = TurnState::Listening;
        effects.push(Effect::StartCapture);
    }
}

fn stop_capture(session: &mut Session, effects: &mut Vec<Effect>) {
    if session.capture == DeviceState::Active {
        session.capture = DeviceState::Stopping;
        effects.push(Effect::StopCapture);
    }
}

fn cancel_output(session: &mut Session, effects: &mut Vec<Effect>) {
    if session.output == DeviceState::Active {
        session.output = DeviceState::Stopping;
        effects.push(Effect::CancelOutput);
    }
}

fn schedule_relisten(session: &mut Session, delay: Duration, effects: &mut Vec<Effect>) {
    cancel_relisten(session, effects);
    let timer = session.next_timer();
    session.relisten_timer = Some(timer);
    effects.push(Effect::ScheduleRelisten { timer, delay });
}

fn cancel_relisten(session: &mut Session, effects: &mut Vec<Effect>) {
    if let Some(timer) = session.relisten_timer.take() {
        effects.push(Effect::CancelTimer(timer));
    }
}

fn set_connection(session: &mut Session, status: ConnectionStatus, effects: &mut Vec<Effect>) {
    if session.connection != status {
        session.connection = status;
        effects.push(Effect::Notify(TurnNotification::Connection { status }));
    }
}

fn violation(state: TurnState, event: &'static str) {
    warn!("Ignoring event: {}", TurnError::ProtocolViolation { state, event });
}
