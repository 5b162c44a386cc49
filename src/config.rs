use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::turn::TurnPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub turns: TurnsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// NATS connection and the loqa STT/TTS subjects
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Prefix of transcript subjects (`<prefix>.partial`, `<prefix>.final`)
    pub stt_subject: String,
    pub tts_subject: String,
    pub tts_done_subject: String,
    pub tts_cancel_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stt_subject: "stt.text".to_string(),
            tts_subject: "tts.say".to_string(),
            tts_done_subject: "tts.done".to_string(),
            tts_cancel_subject: "tts.cancel".to_string(),
        }
    }
}

/// Chat backend that produces agent replies
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub agent_id: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Turn-taking policy as written in the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurnsConfig {
    pub quiet_delay_ms: u64,
    pub retry_budget: u32,
    pub reply_timeout_secs: u64,
    pub max_backoff_ms: u64,
    pub greeting: Option<String>,
    pub greeting_prompt: String,
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self::from(&TurnPolicy::default())
    }
}

impl From<&TurnPolicy> for TurnsConfig {
    fn from(policy: &TurnPolicy) -> Self {
        Self {
            quiet_delay_ms: policy.quiet_delay.as_millis() as u64,
            retry_budget: policy.retry_budget,
            reply_timeout_secs: policy.reply_timeout.as_secs(),
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            greeting: policy.greeting.clone(),
            greeting_prompt: policy.greeting_prompt.clone(),
        }
    }
}

impl TurnsConfig {
    pub fn policy(&self) -> TurnPolicy {
        TurnPolicy {
            quiet_delay: Duration::from_millis(self.quiet_delay_ms),
            retry_budget: self.retry_budget,
            reply_timeout: Duration::from_secs(self.reply_timeout_secs),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            greeting: self.greeting.clone(),
            greeting_prompt: self.greeting_prompt.clone(),
        }
    }
}

impl Config {
    /// Load from `path` (extension optional), overridden by `LOQA_VOICE__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LOQA_VOICE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
