//! Error types for the tutor.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM call timed out after {0}s")]
    LlmTimeout(u64),

    #[error("LLM reply could not be parsed: {0}")]
    LlmParse(String),

    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl TutorError {
    pub fn code(&self) -> i32 {
        match self {
            TutorError::LlmUnavailable(_) => -32002,
            TutorError::LlmTimeout(_) => -32003,
            TutorError::LlmParse(_) => -32004,
            TutorError::UnknownSubject(_) => -32005,
            TutorError::Knowledge(_) => -32006,
            TutorError::Config(_) => -32007,
            TutorError::Invariant(_) => -32603,
            TutorError::Http(_) => -32008,
            TutorError::Io(_) => -32009,
            TutorError::Json(_) => -32700,
            TutorError::Toml(_) => -32701,
        }
    }

    /// LLM-side failures are recovered locally (keyword fallback or raw text).
    pub fn is_llm_failure(&self) -> bool {
        matches!(
            self,
            TutorError::LlmUnavailable(_)
                | TutorError::LlmTimeout(_)
                | TutorError::LlmParse(_)
                | TutorError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_failures_are_recoverable() {
        assert!(TutorError::LlmTimeout(4).is_llm_failure());
        assert!(TutorError::LlmParse("no SUBJECT line".into()).is_llm_failure());
        assert!(!TutorError::Invariant("awaiting without pending".into()).is_llm_failure());
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            TutorError::LlmUnavailable(String::new()),
            TutorError::LlmTimeout(1),
            TutorError::LlmParse(String::new()),
            TutorError::UnknownSubject(String::new()),
            TutorError::Knowledge(String::new()),
            TutorError::Config(String::new()),
            TutorError::Invariant(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
