//! Ollama provider
//!
//! Talks to a local Ollama server over the non-streaming `/api/chat`
//! endpoint. No API key is involved. An unreachable server is reported as
//! `ProviderUnavailable` so the router moves on to the next provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{transport_error, LLMError, LLMProvider, Message, Result};
use crate::config::OllamaConfig;

/// Local Ollama model
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    /// Create a provider for `model` served at `base_url` (e.g. "http://localhost:11434")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            // Local models can be slow on first load; the router enforces the real deadline
            client: Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        Self::new(config.base_url.clone(), config.model.clone())
    }

    fn chat_request<'a>(&'a self, messages: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|msg| ChatTurn {
                    role: msg.role.to_string(),
                    content: &msg.content,
                })
                .collect(),
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(
            self.client.get(&url).timeout(Duration::from_secs(3)).send().await,
            Ok(response) if response.status().is_success()
        )
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let request = self.chat_request(messages);
        tracing::debug!(
            "Ollama request: model={}, turns={}",
            self.model,
            request.messages.len()
        );

        let url = format!("{}/api/chat", self.base_url);
        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LLMError::ProviderUnavailable(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.base_url
                    ))
                } else {
                    transport_error(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Unexpected Ollama reply: {}", e)))?;

        tracing::debug!(
            "Ollama replied in {}ms",
            start.elapsed().as_millis()
        );

        Ok(reply.message.content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: String,
    content: &'a str,
}

/// Action blocks should be reproducible for the same conversation
#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatReplyTurn,
}

#[derive(Debug, Deserialize)]
struct ChatReplyTurn {
    content: String,
}
