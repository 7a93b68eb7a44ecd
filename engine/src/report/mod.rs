//! Answer submission
//!
//! The investigation loop hands a final answer to a [`Reporter`]. The HTTP
//! implementation POSTs `{task, apikey, answer}` to the scoring endpoint and
//! retries transient failures (transport errors, 429, 5xx) with bounded
//! exponential backoff. Other 4xx replies are returned immediately: the
//! endpoint judged the answer and resending it will not change the verdict.

use crate::config::ReportConfig;
use crate::secrets::{scrub, SecretString};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Acknowledgement returned by the scoring endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportAck {
    pub status: u16,
    pub body: Value,
}

impl ReportAck {
    /// The endpoint's human-readable message, when it sends one
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReportError {
    #[error("scoring endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ReportError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Capability that delivers a final answer
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn submit(&self, task: &str, answer: &Value) -> Result<ReportAck, ReportError>;
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

impl From<&ReportConfig> for RetryPolicy {
    fn from(config: &ReportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Reporter that POSTs JSON to the scoring endpoint
pub struct HttpReporter {
    url: String,
    api_key: SecretString,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl HttpReporter {
    pub fn new(url: impl Into<String>, api_key: SecretString, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            api_key,
            policy,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn from_config(config: &ReportConfig, api_key: SecretString) -> Self {
        Self::new(config.url.clone(), api_key, RetryPolicy::from(config))
    }

    async fn attempt(&self, payload: &Value) -> Result<ReportAck, ReportError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ReportError::Transport(scrub(&e.to_string())))?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            return Err(ReportError::Status {
                status,
                body: scrub(&text),
            });
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ReportAck { status, body })
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn submit(&self, task: &str, answer: &Value) -> Result<ReportAck, ReportError> {
        let payload = json!({
            "task": task,
            "apikey": self.api_key.unsecure(),
            "answer": answer,
        });

        let mut attempt = 1;
        loop {
            match self.attempt(&payload).await {
                Ok(ack) => {
                    tracing::info!(
                        "Answer for task '{}' accepted (status {}, attempt {})",
                        task,
                        ack.status,
                        attempt
                    );
                    return Ok(ack);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        "Submission attempt {}/{} failed: {}; retrying in {}ms",
                        attempt,
                        self.policy.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Submission for task '{}' failed after {} attempt(s): {}",
                        task,
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}
