use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::nats::NatsClient;
use crate::reply::HttpReplyClient;
use crate::speech::{NatsSpeechCapture, NatsSpeechOutput};
use crate::turn::Collaborators;

/// Opens the speech devices and chat backend for a new session
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, session_key: &str) -> Result<Collaborators>;
}

/// NATS speech services plus the HTTP chat backend
pub struct ServiceBackend {
    config: Config,
    reply: Arc<HttpReplyClient>,
}

impl ServiceBackend {
    pub fn new(config: Config) -> Result<Self> {
        let reply = Arc::new(HttpReplyClient::new(&config.backend)?);
        Ok(Self { config, reply })
    }
}

#[async_trait::async_trait]
impl SessionBackend for ServiceBackend {
    async fn open(&self, session_key: &str) -> Result<Collaborators> {
        let client = Arc::new(
            NatsClient::connect(&self.config.nats, session_key.to_string())
                .await
                .context("Failed to connect to NATS")?,
        );

        Ok(Collaborators {
            capture: Box::new(NatsSpeechCapture::new(Arc::clone(&client))),
            output: Box::new(NatsSpeechOutput::new(client)),
            reply: self.reply.clone(),
        })
    }
}
