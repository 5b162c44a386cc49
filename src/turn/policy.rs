use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry policy for a voice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnPolicy {
    /// Pause between the end of speech output and re-arming capture
    /// Default: 1 second
    pub quiet_delay: Duration,

    /// Consecutive Remote Reply failures after which the session ends
    /// Default: 3
    pub retry_budget: u32,

    /// Upper bound on a single Remote Reply call
    /// Default: 30 seconds
    pub reply_timeout: Duration,

    /// Cap for the re-listen delay after repeated failures
    /// Default: 8 seconds
    pub max_backoff: Duration,

    /// Spoken on start without asking the backend, when set
    pub greeting: Option<String>,

    /// Sent to the backend on start when no greeting text is configured
    pub greeting_prompt: String,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self {
            quiet_delay: Duration::from_millis(1000),
            retry_budget: 3,
            reply_timeout: Duration::from_secs(30),
            max_backoff: Duration::from_millis(8000),
            greeting: None,
            greeting_prompt: "Hello".to_string(),
        }
    }
}

impl TurnPolicy {
    /// Re-listen delay after `failures` consecutive reply failures.
    ///
    /// Doubles the quiet delay per failure beyond the first, capped at
    /// `max_backoff`. Zero failures is the plain quiet delay.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.quiet_delay;
        }

        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.quiet_delay
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.quiet_delay))
    }

    /// Configured greeting, ignoring blank text
    pub fn greeting_text(&self) -> Option<&str> {
        self.greeting
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}
