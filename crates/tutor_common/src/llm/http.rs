//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::LlmClient;
use crate::config::LlmConfig;
use crate::error::{Result, TutorError};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpLlmClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        Self {
            // Outer per-call timeouts are shorter; this only bounds stuck sockets.
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.saturating_mul(2).max(1)))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "chat completion request");
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "LLM request failed");
            return Err(TutorError::LlmUnavailable(format!("HTTP {}", status)));
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn name(&self) -> &str {
        "http"
    }
}
