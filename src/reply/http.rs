use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{RemoteReply, Reply};
use crate::config::BackendConfig;
use crate::turn::ReplyError;

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub agent_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_metadata: Option<serde_json::Value>,
}

/// Response of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub agent_response: String,
    pub message_id: String,
    pub timestamp: String,
    pub status: String,
    #[serde(default)]
    pub message_metadata: Option<serde_json::Value>,
}

impl ChatResponse {
    pub fn into_reply(self) -> Reply {
        let timestamp = parse_backend_timestamp(&self.timestamp).unwrap_or_else(Utc::now);
        Reply {
            session_id: self.conversation_id,
            text: self.agent_response,
            timestamp,
        }
    }
}

/// Parse a backend timestamp, accepting RFC3339 or naive ISO-8601 (taken as UTC)
pub fn parse_backend_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Remote Reply over the chat backend's HTTP API
pub struct HttpReplyClient {
    client: reqwest::Client,
    endpoint: String,
    agent_id: String,
    timeout: Duration,
}

impl HttpReplyClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let endpoint = format!("{}/api/chat", config.base_url.trim_end_matches('/'));
        info!("Chat backend endpoint: {} (agent {})", endpoint, config.agent_id);

        Ok(Self {
            client,
            endpoint,
            agent_id: config.agent_id.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl RemoteReply for HttpReplyClient {
    async fn send_message(
        &self,
        session_id: Option<&str>,
        text: &str,
    ) -> Result<Reply, ReplyError> {
        let request = ChatRequest {
            agent_id: self.agent_id.clone(),
            message: text.to_string(),
            conversation_id: session_id.map(str::to_string),
            customer_name: None,
            customer_phone: None,
            message_metadata: None,
        };

        debug!("POST {} (conversation {:?})", self.endpoint, session_id);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReplyError::Timeout(self.timeout)
                } else {
                    ReplyError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReplyError::Decode(e.to_string()))?;

        Ok(chat.into_reply())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_naive_timestamp() {
        let ts = parse_backend_timestamp("2025-10-27T14:30:05.123456").unwrap();
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.hour(), 14);
        assert_eq!(ts.second(), 5);
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let ts = parse_backend_timestamp("2025-10-27T14:30:05+02:00").unwrap();
        assert_eq!(ts.hour(), 12);
    }

    #[test]
    fn test_parse_garbage_timestamp() {
        assert!(parse_backend_timestamp("yesterday").is_none());
    }
}
