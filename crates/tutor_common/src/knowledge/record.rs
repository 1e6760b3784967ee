//! Knowledge record and topic-key normalization.

use serde::{Deserialize, Serialize};

/// One curated topic: the unit an information expert emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub topic_key: String,
    pub concept: String,
    pub explanation: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    /// Extra search terms for keyword topic resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl KnowledgeRecord {
    /// Check the per-record contract. Uniqueness is checked by the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.topic_key.is_empty() {
            return Err("empty topic_key".to_string());
        }
        if !self
            .topic_key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!("topic_key '{}' must match [a-z0-9_]", self.topic_key));
        }
        if self.concept.trim().is_empty() {
            return Err(format!("'{}': empty concept", self.topic_key));
        }
        if self.explanation.trim().is_empty() {
            return Err(format!("'{}': empty explanation", self.topic_key));
        }
        Ok(())
    }

    /// Lowercase search terms: key parts, concept, topic and declared keywords.
    pub fn search_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let sources = [
            self.topic_key.replace('_', " "),
            self.concept.to_lowercase(),
            self.topic.to_lowercase(),
        ];
        for source in sources.iter().chain(self.keywords.iter()) {
            for word in source
                .to_lowercase()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|w| w.len() > 2)
            {
                let word = word.to_string();
                if !terms.contains(&word) {
                    terms.push(word);
                }
            }
        }
        terms
    }
}

/// Lowercase, replace every non-alphanumeric char with `_`, collapse runs, trim.
pub fn normalize_topic_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len());
    let mut last_underscore = false;
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            key.push('_');
            last_underscore = true;
        }
    }
    key.trim_matches('_').to_string()
}
