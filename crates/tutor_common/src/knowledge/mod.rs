//! Curated knowledge base: per-subject topic records plus the study-guide schema.
//!
//! Records are loaded once and shared read-only across sessions.

pub mod builtin;
pub mod diagnostic;
pub mod record;
pub mod store;

pub use diagnostic::{
    is_known_condition, is_primary_condition, DiagnosticCategory, DiagnosticKnowledge,
    DiagnosticRuleEntry, MODIFIER_CONDITIONS, PRIMARY_CONDITIONS,
};
pub use record::{normalize_topic_key, KnowledgeRecord};
pub use store::{KnowledgeBase, SubjectKnowledge};
