//! Scripted LLM client for deterministic tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::LlmClient;
use crate::error::{Result, TutorError};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum FakeReply {
    Text(String),
    Error(String),
    /// Sleep, then answer (for timeout tests)
    Delayed(Duration, String),
}

impl From<&str> for FakeReply {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Fake client answering from prompt-matching rules, then a FIFO queue.
///
/// ```rust,ignore
/// let llm = FakeLlmClient::builder()
///     .when_contains("SUBJECT:", "SUBJECT: Biology\nCONFIDENCE: 0.9")
///     .reply("Plants make glucose from light.")
///     .build();
/// ```
pub struct FakeLlmClient {
    rules: Vec<(String, FakeReply)>,
    queue: Mutex<VecDeque<FakeReply>>,
    available: bool,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlmClient {
    pub fn builder() -> FakeLlmClientBuilder {
        FakeLlmClientBuilder::default()
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next_reply(&self, prompt: &str) -> FakeReply {
        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            return reply.clone();
        }
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| FakeReply::Error("no scripted reply left".to_string()))
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn generate(&self, prompt: &str, _max_tokens: u32, _temperature: f32) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        match self.next_reply(prompt) {
            FakeReply::Text(t) => Ok(t),
            FakeReply::Error(e) => Err(TutorError::LlmUnavailable(e)),
            FakeReply::Delayed(d, t) => {
                tokio::time::sleep(d).await;
                Ok(t)
            }
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FakeLlmClientBuilder {
    rules: Vec<(String, FakeReply)>,
    queue: VecDeque<FakeReply>,
    available: bool,
}

impl Default for FakeLlmClientBuilder {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            queue: VecDeque::new(),
            available: true,
        }
    }
}

impl FakeLlmClientBuilder {
    /// Answer every prompt containing `needle` with `reply`. First rule wins.
    pub fn when_contains(mut self, needle: &str, reply: impl Into<FakeReply>) -> Self {
        self.rules.push((needle.to_string(), reply.into()));
        self
    }

    /// Queue a reply for the next prompt no rule matched
    pub fn reply(mut self, reply: impl Into<FakeReply>) -> Self {
        self.queue.push_back(reply.into());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn build(self) -> FakeLlmClient {
        FakeLlmClient {
            rules: self.rules,
            queue: Mutex::new(self.queue),
            available: self.available,
            prompts: Mutex::new(Vec::new()),
        }
    }
}
