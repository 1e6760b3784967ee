//! Information expert: direct Q&A over one subject's knowledge records.
//!
//! The rulebook is generated from data: one rule per record matching
//! `Fact(query_topic == key)` at salience 0 without halting, so several
//! records can be emitted for a compound question. A keyword-resolution rule
//! at salience 10 fills in `query_topic` facts when none were declared.

use std::sync::Arc;
use tracing::debug;

use crate::engine::{Engine, Fact, FactPattern, Firing, Rule, RunReport, DEFAULT_MAX_STEPS};
use crate::error::{Result, TutorError};
use crate::knowledge::{KnowledgeBase, KnowledgeRecord};
use crate::subject::Subject;
use crate::text::words_match;

/// Maximum records the keyword rule resolves for one question
pub const MAX_RESOLVED_TOPICS: usize = 4;

/// Output buffer filled by rule actions
#[derive(Debug, Clone, Default)]
pub struct InformationOutput {
    pub records: Vec<KnowledgeRecord>,
    /// Topic keys picked by keyword resolution, best first
    pub resolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpertResponse {
    None,
    Single(KnowledgeRecord),
    Multiple(Vec<KnowledgeRecord>),
}

impl ExpertResponse {
    pub fn from_records(mut records: Vec<KnowledgeRecord>) -> Self {
        match records.len() {
            0 => Self::None,
            1 => Self::Single(records.remove(0)),
            _ => Self::Multiple(records),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Multiple(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<KnowledgeRecord> {
        match self {
            Self::None => Vec::new(),
            Self::Single(r) => vec![r],
            Self::Multiple(r) => r,
        }
    }
}

pub struct InformationExpert {
    subject: Subject,
    engine: Engine<InformationOutput>,
    output: InformationOutput,
    topic_keys: Vec<String>,
}

impl InformationExpert {
    pub fn new(kb: &KnowledgeBase, subject: Subject) -> Result<Self> {
        Self::with_max_steps(kb, subject, DEFAULT_MAX_STEPS)
    }

    pub fn with_max_steps(kb: &KnowledgeBase, subject: Subject, max_steps: usize) -> Result<Self> {
        if subject.is_diagnostic() {
            return Err(TutorError::UnknownSubject(format!(
                "{} is not an information subject",
                subject
            )));
        }
        let slice = kb
            .subject(subject)
            .ok_or_else(|| TutorError::Knowledge(format!("no knowledge loaded for {}", subject)))?;

        let mut engine: Engine<InformationOutput> = Engine::new(max_steps);
        let index: Arc<Vec<(String, Vec<String>)>> = Arc::new(
            slice
                .records()
                .iter()
                .map(|r| (r.topic_key.clone(), r.search_terms()))
                .collect(),
        );

        engine.add_rule(
            Rule::new("resolve_keywords", move |f: &mut Firing<'_, InformationOutput>| {
                let words: Vec<String> = f
                    .binding("k")
                    .and_then(|v| v.as_list())
                    .map(|l| l.to_vec())
                    .unwrap_or_default();
                for key in resolve_keywords(&index, &words) {
                    f.state.resolved.push(key.clone());
                    f.assert(Fact::single("query_topic", key));
                }
            })
            .salience(10)
            .when(FactPattern::new().bind("keywords", "k"))
            .unless(FactPattern::new().exists("query_topic")),
        );

        for record in slice.records() {
            let emitted = record.clone();
            engine.add_rule(
                Rule::new(&format!("topic::{}", record.topic_key), move |f: &mut Firing<'_, InformationOutput>| {
                    f.state.records.push(emitted.clone());
                })
                .when(FactPattern::new().eq("query_topic", record.topic_key.as_str())),
            );
        }

        Ok(Self {
            subject,
            engine,
            output: InformationOutput::default(),
            topic_keys: slice.topic_keys(),
        })
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.output = InformationOutput::default();
    }

    pub fn declare(&mut self, fact: Fact) {
        self.engine.declare(fact);
    }

    pub fn declare_topic(&mut self, topic_key: &str) {
        self.declare(Fact::single("query_topic", topic_key));
    }

    pub fn declare_keywords(&mut self, keywords: &[String]) {
        if !keywords.is_empty() {
            self.declare(Fact::single("keywords", keywords.to_vec()));
        }
    }

    pub fn run(&mut self) -> RunReport {
        let report = self.engine.run(&mut self.output);
        debug!(
            subject = %self.subject,
            fired = report.fired.len(),
            records = self.output.records.len(),
            "information expert run"
        );
        report
    }

    pub fn get_response(&self) -> ExpertResponse {
        ExpertResponse::from_records(self.output.records.clone())
    }

    /// Topic keys picked by keyword resolution during the last run
    pub fn resolved_topics(&self) -> &[String] {
        &self.output.resolved
    }

    pub fn fired_rules(&self) -> &[String] {
        self.engine.history()
    }

    /// Sorted topic keys of this subject
    pub fn list_topic_keys(&self) -> Vec<String> {
        self.topic_keys.clone()
    }

    pub fn has_topic(&self, topic_key: &str) -> bool {
        self.topic_keys.binary_search_by(|k| k.as_str().cmp(topic_key)).is_ok()
    }
}

/// Score records by how many query words hit their search terms. Keeps the top
/// score, plus anything within one of it when the top is at least 2.
fn resolve_keywords(index: &[(String, Vec<String>)], words: &[String]) -> Vec<String> {
    let mut scored: Vec<(usize, usize)> = index
        .iter()
        .enumerate()
        .map(|(pos, (_, terms))| {
            let score = words
                .iter()
                .filter(|w| terms.iter().any(|t| words_match(w, t)))
                .count();
            (pos, score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();

    let Some(top) = scored.iter().map(|(_, s)| *s).max() else {
        return Vec::new();
    };
    let floor = if top >= 2 { top - 1 } else { top };
    scored.retain(|(_, s)| *s >= floor);
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(MAX_RESOLVED_TOPICS)
        .map(|(pos, _)| index[pos].0.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::keywords;

    fn biology() -> InformationExpert {
        let kb = KnowledgeBase::builtin().unwrap();
        InformationExpert::new(&kb, Subject::Biology).unwrap()
    }

    #[test]
    fn test_one_rule_per_record_plus_resolver() {
        let kb = KnowledgeBase::builtin().unwrap();
        let expert = InformationExpert::new(&kb, Subject::Physics).unwrap();
        let records = kb.subject(Subject::Physics).unwrap().len();
        assert_eq!(expert.engine.rule_count(), records + 1);
        assert!(expert.has_topic("ohms_law"));
        assert!(!expert.has_topic("photosynthesis"));
    }

    #[test]
    fn test_declared_topic_emits_record() {
        let mut expert = biology();
        expert.declare_topic("photosynthesis");
        expert.run();
        match expert.get_response() {
            ExpertResponse::Single(r) => assert_eq!(r.concept, "Photosynthesis"),
            other => panic!("expected single record, got {:?}", other),
        }
    }

    #[test]
    fn test_topic_fires_once_per_session() {
        let mut expert = biology();
        expert.declare_topic("mitosis");
        expert.run();
        expert.declare_topic("mitosis");
        expert.run();
        assert_eq!(expert.get_response().len(), 1);
        assert_eq!(expert.fired_rules(), &["topic::mitosis".to_string()]);
    }

    #[test]
    fn test_keywords_resolve_compound_question() {
        let mut expert = biology();
        expert.declare_keywords(&keywords("What are the processes of digestion?"));
        expert.run();
        let records = expert.get_response().into_records();
        let keys: Vec<&str> = records.iter().map(|r| r.topic_key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["digestion_of_food", "mechanical_process_digestion", "chemical_process_digestion"]
        );
        assert_eq!(
            expert.resolved_topics(),
            &["mechanical_process_digestion", "chemical_process_digestion", "digestion_of_food"]
        );
    }

    #[test]
    fn test_explicit_topic_suppresses_keyword_resolution() {
        let mut expert = biology();
        expert.declare_keywords(&keywords("digestion"));
        expert.declare_topic("enzymes");
        expert.run();
        let records = expert.get_response().into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic_key, "enzymes");
        assert!(expert.resolved_topics().is_empty());
    }

    #[test]
    fn test_unknown_topic_is_none() {
        let kb = KnowledgeBase::builtin().unwrap();
        let mut expert = InformationExpert::new(&kb, Subject::Physics).unwrap();
        expert.declare_keywords(&keywords("Explain quantum chromodynamics"));
        expert.declare_topic("quantum_chromodynamics");
        expert.run();
        assert!(expert.get_response().is_none());
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut expert = biology();
        expert.declare_topic("mitosis");
        expert.run();
        expert.reset();
        assert!(expert.get_response().is_none());
    }

    #[test]
    fn test_study_guide_is_not_an_information_subject() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert!(InformationExpert::new(&kb, Subject::StudyGuide).is_err());
    }
}
