//! Remote Reply collaborator
//!
//! Sends a recognized utterance to the chat backend and returns the agent's
//! reply text together with the conversation id to use for the next turn.

pub mod http;

use crate::turn::ReplyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use http::{ChatRequest, ChatResponse, HttpReplyClient};

/// Agent reply for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Conversation id to send with the next message
    pub session_id: String,

    /// Text to speak back to the user
    pub text: String,

    /// When the backend produced the reply
    pub timestamp: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RemoteReply: Send + Sync {
    /// Send `text` within conversation `session_id` (`None` starts a new one)
    async fn send_message(&self, session_id: Option<&str>, text: &str)
        -> Result<Reply, ReplyError>;
}
