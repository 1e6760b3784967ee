//! LLM transport seam.
//!
//! The tutor calls the model for exactly two things: intent classification
//! and response refinement. Both go through [`LlmClient`] so tests can swap
//! in [`FakeLlmClient`] and deployments without a key get [`DisabledLlm`].

pub mod fake;
pub mod http;

pub use fake::{FakeLlmClient, FakeLlmClientBuilder, FakeReply};
pub use http::HttpLlmClient;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TutorConfig;
use crate::error::{Result, TutorError};

/// Prompt → text generator
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;

    /// False when calls are known to fail (no credential)
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Stand-in when no credential is configured
#[derive(Debug, Clone, Default)]
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn generate(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        Err(TutorError::LlmUnavailable("no LLM credential configured".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// HTTP client when the configured key env var is set, otherwise disabled.
pub fn client_from_config(config: &TutorConfig) -> Arc<dyn LlmClient> {
    match config.api_key() {
        Some(key) => {
            info!(model = %config.llm.model, endpoint = %config.llm.endpoint, "LLM enabled");
            Arc::new(HttpLlmClient::new(&config.llm, key))
        }
        None => {
            info!(env = %config.llm.api_key_env, "LLM credential not set, running without LLM");
            Arc::new(DisabledLlm)
        }
    }
}

/// `generate` bounded by a wall-clock timeout
pub async fn generate_with_timeout(
    client: &dyn LlmClient,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
) -> Result<String> {
    if !client.is_available() {
        return Err(TutorError::LlmUnavailable(format!("{} client", client.name())));
    }
    let started = std::time::Instant::now();
    let result = tokio::time::timeout(timeout, client.generate(prompt, max_tokens, temperature))
        .await
        .map_err(|_| TutorError::LlmTimeout(timeout.as_secs()))?;
    debug!(
        client = client.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "llm call"
    );
    result
}
