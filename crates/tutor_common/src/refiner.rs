//! Response refinement: rewrite expert output into learner-friendly prose.
//!
//! The LLM may rephrase but not add facts. After a rewrite, every numeric
//! literal and equation-like substring of the source must still be present;
//! whatever went missing is appended verbatim under a "Key facts" line. With
//! no LLM, or on any LLM failure, the raw text is returned unrefined.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TutorConfig;
use crate::error::TutorError;
use crate::knowledge::KnowledgeRecord;
use crate::llm::{generate_with_timeout, LlmClient};
use crate::text::{CLOSE_DELIM, OPEN_DELIM};

/// First line of every refinement prompt
pub const PROMPT_HEADER: &str = "You rewrite tutoring notes for a secondary-school science student.";

/// Heading for restored facts
pub const KEY_FACTS_HEADING: &str = "Key facts:";

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?](?:\s+|$)").unwrap());

/// `A + B → ...` or `X = ...`: every `+`-joined term left of the sign, up to
/// the end of the sentence
static EQUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z0-9₀-₉⁰-⁹¹²³⁺⁻]+\s*\+\s*)*[A-Za-z0-9₀-₉⁰-⁹¹²³⁺⁻]+\s*[=→]\s*.+").unwrap()
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct RefinedResponse {
    /// Text to show the learner
    pub content: String,
    /// Unrefined expert text
    pub original: String,
    /// False in degraded mode
    pub refined: bool,
    /// Source sentences appended because the rewrite dropped a fact
    pub restored: Vec<String>,
}

impl RefinedResponse {
    fn unrefined(original: String) -> Self {
        Self {
            content: original.clone(),
            original,
            refined: false,
            restored: Vec::new(),
        }
    }
}

pub struct ResponseRefiner {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ResponseRefiner {
    pub fn new(llm: Arc<dyn LlmClient>, config: &TutorConfig) -> Self {
        Self {
            llm,
            max_tokens: config.llm.refiner_max_tokens,
            temperature: config.llm.refiner_temperature,
            timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }

    /// Refine one record, or synthesize several into a single answer.
    pub async fn refine(&self, records: &[KnowledgeRecord]) -> RefinedResponse {
        let original = original_text(records);
        if records.is_empty() {
            return RefinedResponse::unrefined(original);
        }

        let prompt = build_prompt(records);
        let reply = generate_with_timeout(
            self.llm.as_ref(),
            &prompt,
            self.max_tokens,
            self.temperature,
            self.timeout,
        )
        .await;

        let text = match reply {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("refiner returned empty text, using raw answer");
                return RefinedResponse::unrefined(original);
            }
            Err(TutorError::LlmUnavailable(e)) => {
                debug!("refiner skipped: {}", e);
                return RefinedResponse::unrefined(original);
            }
            Err(e) => {
                warn!("refiner failed, using raw answer: {}", e);
                return RefinedResponse::unrefined(original);
            }
        };

        let source: Vec<&str> = records.iter().map(|r| r.explanation.as_str()).collect();
        let concepts: Vec<&str> = if records.len() > 1 {
            records.iter().map(|r| r.concept.as_str()).collect()
        } else {
            Vec::new()
        };
        let (content, restored) = enforce_facts(&source, &concepts, &text);
        if !restored.is_empty() {
            info!(restored = restored.len(), "refiner dropped facts, restored verbatim");
        }
        RefinedResponse {
            content,
            original,
            refined: true,
            restored,
        }
    }
}

/// The unrefined answer: the explanation for one record, `Concept: explanation`
/// paragraphs for several.
pub fn original_text(records: &[KnowledgeRecord]) -> String {
    match records {
        [] => String::new(),
        [single] => single.explanation.clone(),
        many => many
            .iter()
            .map(|r| format!("{}: {}", r.concept, r.explanation))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

pub fn build_prompt(records: &[KnowledgeRecord]) -> String {
    let mut prompt = format!("{}\n\n", PROMPT_HEADER);
    prompt.push_str(
        "Rules:\n\
         - Use only the facts in the notes below. Do not add facts, numbers, examples or analogies.\n\
         - Copy every equation and number exactly as written.\n\
         - Keep it clear and friendly, at most two short paragraphs.\n",
    );
    if records.len() > 1 {
        prompt.push_str(
            "- The notes cover related concepts. Combine them into one answer that names each concept.\n",
        );
    }
    for record in records {
        prompt.push_str(&format!(
            "\nConcept: {}\nTopic: {}\nNotes:\n{}\n{}\n{}\n",
            record.concept, record.topic, OPEN_DELIM, record.explanation, CLOSE_DELIM
        ));
        if !record.examples.is_empty() {
            prompt.push_str("Examples:\n");
            for example in &record.examples {
                prompt.push_str(&format!("- {}\n", example));
            }
        }
    }
    prompt.push_str("\nRewritten answer:\n");
    prompt
}

/// Split text into sentences, terminal punctuation kept.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let end = m.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Numeric literals and equation-like substrings of `text`, each paired with
/// the sentence it came from.
pub fn protected_facts(text: &str) -> Vec<(String, String)> {
    let mut facts: Vec<(String, String)> = Vec::new();
    for sentence in sentences(text) {
        let body = sentence.trim_end_matches(['.', '!', '?']);
        if let Some(eq) = EQUATION.find(body) {
            facts.push((eq.as_str().trim().to_string(), sentence.to_string()));
        }
        for n in NUMBER.find_iter(body) {
            facts.push((n.as_str().to_string(), sentence.to_string()));
        }
    }
    facts
}

/// Append every source sentence whose protected fact is missing from
/// `refined`, plus any concept name a synthesis left out.
pub fn enforce_facts(sources: &[&str], concepts: &[&str], refined: &str) -> (String, Vec<String>) {
    let mut restored: Vec<String> = Vec::new();
    for source in sources {
        for (fact, sentence) in protected_facts(source) {
            if !refined.contains(&fact) && !restored.contains(&sentence) {
                restored.push(sentence);
            }
        }
    }
    let lowered = refined.to_lowercase();
    for (concept, source) in concepts.iter().zip(sources.iter()) {
        if lowered.contains(&concept.to_lowercase()) {
            continue;
        }
        let first = sentences(source).first().copied().unwrap_or_default().to_string();
        let line = format!("{}: {}", concept, first);
        if !restored.contains(&line) {
            restored.push(line);
        }
    }

    if restored.is_empty() {
        return (refined.to_string(), restored);
    }
    let mut content = refined.to_string();
    content.push_str("\n\n");
    content.push_str(KEY_FACTS_HEADING);
    for line in &restored {
        content.push_str("\n- ");
        content.push_str(line);
    }
    (content, restored)
}
