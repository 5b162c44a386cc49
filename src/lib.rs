pub mod backend;
pub mod config;
pub mod http;
pub mod nats;
pub mod reply;
pub mod speech;
pub mod turn;

pub use backend::{ServiceBackend, SessionBackend};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nats::{NatsClient, TranscriptMessage};
pub use reply::{HttpReplyClient, RemoteReply, Reply};
pub use speech::{CaptureEvent, OutputEvent, SpeechCapture, SpeechOutput};
pub use turn::{
    Collaborators, Session, SessionSnapshot, TurnController, TurnControllerHandle, TurnEvent,
    TurnNotification, TurnPolicy, TurnState,
};
