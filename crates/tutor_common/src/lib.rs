//! Tutor Common - knowledge-based tutoring core.
//!
//! A rule engine drives per-subject experts over curated knowledge. An
//! LLM classifies intent and polishes answers when available; without one
//! the tutor falls back to keyword routing and raw expert text.

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod experts;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod refiner;
pub mod sessions;
pub mod subject;
pub mod text;

pub use classifier::{ClassificationSource, IntentClassification, IntentClassifier};
pub use config::TutorConfig;
pub use error::{Result, TutorError};
pub use knowledge::{KnowledgeBase, KnowledgeRecord};
pub use llm::{client_from_config, DisabledLlm, FakeLlmClient, LlmClient};
pub use memory::{ConversationMemory, ConversationTurn, MemoryStats};
pub use orchestrator::{
    Answer, AnswerStatus, ClarificationRequest, Orchestrator, OrchestratorResult, OrchestratorState,
};
pub use refiner::{RefinedResponse, ResponseRefiner};
pub use sessions::{SessionId, SessionManager};
pub use subject::Subject;
