//! HTTP query tool
//!
//! The people, places, gps and database services all take a JSON POST with
//! the API key and a `query`, and answer with JSON carrying a `reply` (or at
//! least a `message`). The database endpoint additionally wants the task name
//! in the body.

use crate::config::ToolEndpointConfig;
use crate::secrets::{scrub, SecretString};
use async_trait::async_trait;
use reqwest::Client;
use sdk::{QueryTool, ToolError, ToolOutput};
use serde_json::{json, Value};
use std::time::Duration;

pub struct CentralaQueryTool {
    name: String,
    url: String,
    task: Option<String>,
    normalize: bool,
    api_key: SecretString,
    client: Client,
}

impl CentralaQueryTool {
    pub fn new(name: impl Into<String>, endpoint: &ToolEndpointConfig, api_key: SecretString) -> Self {
        Self {
            name: name.into(),
            url: endpoint.url.clone(),
            task: endpoint.task.clone(),
            normalize: endpoint.normalize_target,
            api_key,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn body(&self, query: &str) -> Value {
        match &self.task {
            Some(task) => json!({
                "task": task,
                "apikey": self.api_key.unsecure(),
                "query": query,
            }),
            None => json!({
                "apikey": self.api_key.unsecure(),
                "query": query,
            }),
        }
    }
}

#[async_trait]
impl QueryTool for CentralaQueryTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, target: &str) -> Result<ToolOutput, ToolError> {
        let query = if self.normalize {
            normalize_target(target)
        } else {
            target.trim().to_string()
        };
        if query.is_empty() {
            return Err(ToolError::InvalidTarget("empty query".to_string()));
        }

        let response = self
            .client
            .post(&self.url)
            .json(&self.body(&query))
            .send()
            .await
            .map_err(|e| ToolError::Transport(scrub(&e.to_string())))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(scrub(&e.to_string())))?;

        if !(200..300).contains(&status) {
            return Err(ToolError::Status {
                status,
                body: scrub(&text),
            });
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| ToolError::InvalidResponse(format!("{}: {}", e, scrub(&text))))?;

        Ok(extract_reply(data))
    }
}

/// Take `reply`, else `message`, else the whole body
fn extract_reply(mut data: Value) -> ToolOutput {
    for field in ["reply", "message"] {
        match data.get_mut(field).map(Value::take) {
            Some(Value::Null) | None => continue,
            Some(Value::String(text)) => return ToolOutput::Text(text),
            Some(value) => return ToolOutput::Json(value),
        }
    }
    ToolOutput::Json(data)
}

/// Upper-case a name or city and fold Polish diacritics to ASCII
///
/// `Kraków` becomes `KRAKOW`, `Rafał` becomes `RAFAL`.
pub fn normalize_target(target: &str) -> String {
    target
        .trim()
        .chars()
        .map(|c| match c {
            'ą' | 'Ą' => 'A',
            'ć' | 'Ć' => 'C',
            'ę' | 'Ę' => 'E',
            'ł' | 'Ł' => 'L',
            'ń' | 'Ń' => 'N',
            'ó' | 'Ó' => 'O',
            'ś' | 'Ś' => 'S',
            'ź' | 'Ź' | 'ż' | 'Ż' => 'Z',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}
