//! Orchestrator: the per-conversation state machine.
//!
//! One `process_query` call opens a turn, either resumes a pending
//! clarification or classifies the input, routes it to an expert, and closes
//! the turn. The only suspension points are the classifier and refiner LLM
//! calls; orchestrator state is written only after them, so an interrupted
//! call leaves either the previous pending state or a fully settled one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::classifier::IntentClassifier;
use crate::config::{MemoryConfig, TutorConfig};
use crate::error::{Result, TutorError};
use crate::experts::interview::wellbeing_facts;
use crate::experts::{
    DiagnosticExpert, DiagnosticOutput, DiagnosticSession, InformationExpert, ResponseMatch,
};
use crate::knowledge::{KnowledgeBase, KnowledgeRecord};
use crate::llm::LlmClient;
use crate::memory::ConversationMemory;
use crate::refiner::{RefinedResponse, ResponseRefiner};
use crate::subject::Subject;
use crate::text::keywords;

/// Replies that abandon a pending clarification
pub const CANCEL_WORDS: &[&str] = &["cancel", "stop", "nevermind", "never mind", "forget it"];

/// Consecutive stalled interview runs before giving up
pub const MAX_STALLS: u32 = 2;

/// Topic keys offered when nothing matched
const SUGGESTION_COUNT: usize = 5;

/// Clarification topic for subject-level questions
const SUBJECT_TOPIC: &str = "subject";

const STALL_PROMPT: &str = "I need a little more to go on. Could you describe what happens when \
you study or sit an exam, for example how many hours you sleep or how stressed you feel?";

const STALL_GUIDANCE: &str = "I couldn't pin down a specific study problem from what we discussed. \
A good general routine is short daily review sessions, practising past-paper questions under timed \
conditions, and getting around 8 hours of sleep. Ask me again any time with more detail.";

const CANCELLED: &str = "No problem, I've dropped that. Ask me anything when you're ready.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Rewritten by the LLM, facts checked
    Refined,
    /// Raw expert text
    Unrefined,
    Diagnostic,
    NoMatch,
    /// Interview cancelled or abandoned
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub content: String,
    pub concept: String,
    pub topic: String,
    pub subject: Option<Subject>,
    /// Unrefined rule output
    pub expert_raw: String,
    pub refined: bool,
    pub examples: Vec<String>,
    pub status: AnswerStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<DiagnosticOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Answer {
    fn incomplete(message: &str) -> Self {
        Self {
            content: message.to_string(),
            concept: "Study check-in".to_string(),
            topic: Subject::StudyGuide.label().to_string(),
            subject: None,
            expert_raw: message.to_string(),
            refined: false,
            examples: Vec::new(),
            status: AnswerStatus::Incomplete,
            topic_keys: Vec::new(),
            diagnostic: None,
            suggestions: Vec::new(),
        }
    }

    fn check(&self) -> Result<()> {
        let informational = matches!(self.status, AnswerStatus::Refined | AnswerStatus::Unrefined);
        if informational
            && (self.concept.trim().is_empty()
                || self.topic.trim().is_empty()
                || self.expert_raw.trim().is_empty())
        {
            return Err(TutorError::Invariant(
                "information answer missing concept, topic or explanation".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub question: String,
    /// `subject` for subject choice, otherwise the interview slot being asked
    pub topic: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorResult {
    Answer(Answer),
    ClarificationRequest(ClarificationRequest),
    Error { message: String },
}

impl OrchestratorResult {
    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Self::Answer(a) => Some(a),
            _ => None,
        }
    }

    pub fn clarification(&self) -> Option<&ClarificationRequest> {
        match self {
            Self::ClarificationRequest(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Text shown to the learner
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(a) => &a.content,
            Self::ClarificationRequest(c) => &c.question,
            Self::Error { message } => message,
        }
    }
}

/// A subject-level question waiting for the learner's pick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectChoice {
    pub original_question: String,
    pub candidates: Vec<Subject>,
}

/// Pending clarification. While awaiting, exactly one of `pending_subject`
/// and `pending_session` is set; otherwise everything is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub awaiting_clarification: bool,
    pub pending_subject: Option<SubjectChoice>,
    pub pending_session: Option<DiagnosticSession>,
    /// The question last put to the learner
    pub pending_prompt: Option<String>,
}

impl OrchestratorState {
    pub fn check(&self) -> Result<()> {
        let pending = self.pending_subject.is_some() as u8 + self.pending_session.is_some() as u8;
        match (self.awaiting_clarification, pending) {
            (true, 1) if self.pending_prompt.is_some() => Ok(()),
            (false, 0) if self.pending_prompt.is_none() => Ok(()),
            (awaiting, n) => Err(TutorError::Invariant(format!(
                "awaiting_clarification={} with {} pending item(s)",
                awaiting, n
            ))),
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

enum Pending {
    Subject(SubjectChoice),
    Session(DiagnosticSession),
}

/// Turn opened for one query. If the query future is dropped before it
/// settles, the turn is abandoned so memory never keeps a half-open turn.
struct OpenTurn<'a> {
    orch: &'a mut Orchestrator,
    settled: bool,
}

impl<'a> OpenTurn<'a> {
    fn start(orch: &'a mut Orchestrator, question: &str) -> Self {
        orch.memory.start_turn(question);
        Self {
            orch,
            settled: false,
        }
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for OpenTurn<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(turn) = self.orch.memory.abandon_current_turn() {
            warn!(turn = %turn.id, "query cancelled, turn abandoned");
        }
    }
}

pub struct Orchestrator {
    kb: Arc<KnowledgeBase>,
    classifier: IntentClassifier,
    refiner: ResponseRefiner,
    memory: ConversationMemory,
    state: OrchestratorState,
    memory_config: MemoryConfig,
    context_turns: usize,
    max_steps: usize,
}

impl Orchestrator {
    pub fn new(kb: Arc<KnowledgeBase>, llm: Arc<dyn LlmClient>, config: &TutorConfig) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone(), &kb, config),
            refiner: ResponseRefiner::new(llm, config),
            memory: ConversationMemory::new(&config.memory),
            state: OrchestratorState::default(),
            memory_config: config.memory.clone(),
            context_turns: config.classifier.context_turns,
            max_steps: config.engine.max_steps,
            kb,
        }
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Clear memory and any pending clarification
    pub fn reset(&mut self) {
        self.state.clear();
        self.memory = ConversationMemory::new(&self.memory_config);
        info!("conversation reset");
    }

    pub async fn process_query(&mut self, input: &str) -> OrchestratorResult {
        let input = input.trim();
        if let Some(stale) = self.memory.abandon_current_turn() {
            warn!(turn = %stale.id, "abandoning turn left open by an interrupted query");
        }
        if input.is_empty() && !self.state.awaiting_clarification {
            return OrchestratorResult::ClarificationRequest(ClarificationRequest {
                question: "What would you like to learn about?".to_string(),
                topic: SUBJECT_TOPIC.to_string(),
                options: Subject::ALL.iter().map(|s| s.label().to_string()).collect(),
                subject: None,
            });
        }

        let outcome = {
            let mut turn = OpenTurn::start(self, input);
            let outcome = if turn.orch.state.awaiting_clarification {
                turn.orch.resume(input).await
            } else {
                turn.orch.handle_question(input).await
            };
            turn.settle();
            outcome
        };

        match outcome.and_then(|result| self.check_invariants(&result).map(|_| result)) {
            Ok(result) => result,
            Err(e) => {
                error!("{}, resetting conversation", e);
                self.reset();
                OrchestratorResult::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn check_invariants(&self, result: &OrchestratorResult) -> Result<()> {
        self.state.check()?;
        self.memory.check_invariants()?;
        if self.memory.current().is_some() {
            return Err(TutorError::Invariant("turn left open after query".to_string()));
        }
        if let Some(answer) = result.answer() {
            answer.check()?;
        }
        Ok(())
    }

    async fn handle_question(&mut self, question: &str) -> Result<OrchestratorResult> {
        let context = self.memory.context_for_classifier(self.context_turns);
        let c = self.classifier.classify(question, &context).await;
        match c.subject.filter(|_| !c.needs_clarification) {
            Some(subject) => self.route(subject, question, &c.topics).await,
            None => self.ask_subject(question, c.candidates),
        }
    }

    async fn route(
        &mut self,
        subject: Subject,
        question: &str,
        topics: &[String],
    ) -> Result<OrchestratorResult> {
        info!(subject = %subject, "routing question");
        if subject.is_diagnostic() {
            self.start_diagnostic(question)
        } else {
            self.answer_information(subject, question, topics).await
        }
    }

    async fn resume(&mut self, input: &str) -> Result<OrchestratorResult> {
        let prompt = self.state.pending_prompt.clone().unwrap_or_default();
        self.memory.add_clarification_to_current(&prompt, Some(input));

        if is_cancel(input) {
            info!("pending clarification cancelled by learner");
            return self.deliver(Answer::incomplete(CANCELLED));
        }
        if let Some(session) = self.state.pending_session.clone() {
            return self.resume_diagnostic(input, session);
        }
        if let Some(choice) = self.state.pending_subject.clone() {
            return self.resume_subject(input, choice).await;
        }
        Err(TutorError::Invariant(
            "awaiting clarification with nothing pending".to_string(),
        ))
    }

    async fn resume_subject(&mut self, input: &str, choice: SubjectChoice) -> Result<OrchestratorResult> {
        let picked = Subject::parse_choice(input).or_else(|| {
            input
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| choice.candidates.get(i).copied())
        });
        if let Some(subject) = picked {
            info!(subject = %subject, "subject picked by learner");
            return self.route(subject, &choice.original_question, &[]).await;
        }

        let combined = format!("{} {}", choice.original_question, input);
        let context = self.memory.context_for_classifier(self.context_turns);
        let c = self.classifier.classify(&combined, &context).await;
        match c.subject.filter(|_| !c.needs_clarification) {
            Some(subject) => self.route(subject, &combined, &c.topics).await,
            None => self.ask_subject(&combined, c.candidates),
        }
    }

    fn ask_subject(&mut self, question: &str, candidates: Vec<Subject>) -> Result<OrchestratorResult> {
        let labels: Vec<&str> = candidates.iter().map(|s| s.label()).collect();
        let prompt = format!(
            "I'm not sure which subject that is about. Is it {}? Reply with the subject name or its number.",
            join_or(&labels)
        );
        let request = ClarificationRequest {
            question: prompt,
            topic: SUBJECT_TOPIC.to_string(),
            options: labels.iter().map(|l| l.to_string()).collect(),
            subject: None,
        };
        self.ask(
            request,
            Pending::Subject(SubjectChoice {
                original_question: question.to_string(),
                candidates,
            }),
        )
    }

    fn diagnostic_expert(&self) -> DiagnosticExpert {
        DiagnosticExpert::with_max_steps(self.kb.diagnostic(), self.max_steps)
    }

    fn start_diagnostic(&mut self, question: &str) -> Result<OrchestratorResult> {
        let mut expert = self.diagnostic_expert();
        expert.reset();
        expert.begin(question);
        expert.run();
        self.advance_diagnostic(expert, 0)
    }

    fn resume_diagnostic(&mut self, input: &str, session: DiagnosticSession) -> Result<OrchestratorResult> {
        let mut expert = self.diagnostic_expert();
        expert.resume(&session);
        match expert.declare_user_response(input) {
            ResponseMatch::Accepted { var, value } => {
                debug!(var = %var, value = %value, "interview advanced");
                expert.run();
                self.advance_diagnostic(expert, 0)
            }
            ResponseMatch::Unrecognized { var } => {
                let attempts = session.attempts + 1;
                info!(var = %var, attempts, "answer not recognized, asking again");
                let options: Vec<String> = expert
                    .expected_choices()
                    .iter()
                    .map(|c| c.label.to_string())
                    .collect();
                let question = session.question.clone().unwrap_or_default();
                let request = ClarificationRequest {
                    question: format!(
                        "Sorry, I didn't catch that. {} (you can answer {})",
                        question,
                        join_or(&options.iter().map(String::as_str).collect::<Vec<_>>())
                    ),
                    topic: var,
                    options,
                    subject: Some(Subject::StudyGuide),
                };
                self.ask(
                    request,
                    Pending::Session(DiagnosticSession {
                        attempts,
                        ..session
                    }),
                )
            }
            ResponseMatch::NothingPending => {
                for fact in wellbeing_facts(input) {
                    expert.declare(fact);
                }
                expert.run();
                self.advance_diagnostic(expert, session.stalls)
            }
        }
    }

    /// Settle after a diagnostic run: deliver the diagnosis, ask the next
    /// question, or handle a stall.
    fn advance_diagnostic(&mut self, expert: DiagnosticExpert, stalls: u32) -> Result<OrchestratorResult> {
        if let Some(output) = expert.get_response() {
            info!(condition = %output.condition, confidence = output.confidence, "diagnosis complete");
            return self.deliver(diagnostic_answer(output.clone()));
        }

        if expert.requires_clarification() {
            let session = expert.snapshot();
            let question = session
                .question
                .clone()
                .ok_or_else(|| TutorError::Invariant("interview asked without a question".to_string()))?;
            let request = ClarificationRequest {
                question,
                topic: session
                    .pending_var
                    .clone()
                    .unwrap_or_else(|| Subject::StudyGuide.as_str().to_string()),
                options: expert
                    .expected_choices()
                    .iter()
                    .map(|c| c.label.to_string())
                    .collect(),
                subject: Some(Subject::StudyGuide),
            };
            return self.ask(request, Pending::Session(session));
        }

        let stalls = stalls + 1;
        if stalls >= MAX_STALLS {
            warn!(stalls, "interview stalled, giving up");
            return self.deliver(Answer::incomplete(STALL_GUIDANCE));
        }
        warn!(stalls, "interview produced neither a question nor a diagnosis");
        let session = DiagnosticSession {
            question: Some(STALL_PROMPT.to_string()),
            pending_var: None,
            stalls,
            ..expert.snapshot()
        };
        let request = ClarificationRequest {
            question: STALL_PROMPT.to_string(),
            topic: Subject::StudyGuide.as_str().to_string(),
            options: Vec::new(),
            subject: Some(Subject::StudyGuide),
        };
        self.ask(request, Pending::Session(session))
    }

    async fn answer_information(
        &mut self,
        subject: Subject,
        question: &str,
        topics: &[String],
    ) -> Result<OrchestratorResult> {
        let records = {
            let mut expert = InformationExpert::with_max_steps(&self.kb, subject, self.max_steps)?;
            expert.reset();
            expert.declare_keywords(&keywords(question));
            for topic in topics {
                if expert.has_topic(topic) {
                    expert.declare_topic(topic);
                } else {
                    debug!(topic = %topic, "classifier topic not in knowledge base, ignored");
                }
            }
            expert.run();
            expert.get_response().into_records()
        };

        if records.is_empty() {
            info!(subject = %subject, "no knowledge match");
            let answer = self.no_match_answer(subject, question);
            return self.deliver(answer);
        }

        let refined = self.refiner.refine(&records).await;
        self.deliver(information_answer(subject, &records, refined))
    }

    fn no_match_answer(&self, subject: Subject, question: &str) -> Answer {
        let suggestions: Vec<String> = self
            .kb
            .list_topics(subject)
            .into_iter()
            .take(SUGGESTION_COUNT)
            .collect();
        let words = keywords(question);
        let asked = if words.is_empty() {
            question.to_string()
        } else {
            words.join(" ")
        };
        let content = format!(
            "I couldn't find \"{}\" in my {} notes. Topics I can help with include: {}.",
            asked,
            subject.label(),
            suggestions.join(", ")
        );
        Answer {
            content: content.clone(),
            concept: "No match in knowledge base".to_string(),
            topic: subject.label().to_string(),
            subject: Some(subject),
            expert_raw: content,
            refined: false,
            examples: Vec::new(),
            status: AnswerStatus::NoMatch,
            topic_keys: Vec::new(),
            diagnostic: None,
            suggestions,
        }
    }

    /// Clear pending state and close the turn with an answer
    fn deliver(&mut self, answer: Answer) -> Result<OrchestratorResult> {
        self.state.clear();
        let clarified = self.memory.current_has_clarifications();
        self.memory
            .complete_turn(&answer.content, answer.subject, clarified)?;
        Ok(OrchestratorResult::Answer(answer))
    }

    /// Record a pending clarification and close the turn with the question
    fn ask(&mut self, request: ClarificationRequest, pending: Pending) -> Result<OrchestratorResult> {
        self.state = match pending {
            Pending::Subject(choice) => OrchestratorState {
                awaiting_clarification: true,
                pending_subject: Some(choice),
                pending_session: None,
                pending_prompt: Some(request.question.clone()),
            },
            Pending::Session(session) => OrchestratorState {
                awaiting_clarification: true,
                pending_subject: None,
                pending_session: Some(session),
                pending_prompt: Some(request.question.clone()),
            },
        };
        self.memory
            .add_clarification_to_current(&request.question, None);
        self.memory
            .complete_turn(&request.question, request.subject, true)?;
        Ok(OrchestratorResult::ClarificationRequest(request))
    }
}

fn information_answer(subject: Subject, records: &[KnowledgeRecord], refined: RefinedResponse) -> Answer {
    let concepts: Vec<&str> = records.iter().map(|r| r.concept.as_str()).collect();
    let mut topics: Vec<&str> = Vec::new();
    for r in records {
        if !r.topic.trim().is_empty() && !topics.contains(&r.topic.as_str()) {
            topics.push(&r.topic);
        }
    }
    let mut examples: Vec<String> = Vec::new();
    for example in records.iter().flat_map(|r| r.examples.iter()) {
        if !examples.contains(example) {
            examples.push(example.clone());
        }
    }
    let topic = if topics.is_empty() {
        subject.label().to_string()
    } else {
        topics.join(", ")
    };
    Answer {
        content: refined.content,
        concept: join_and(&concepts),
        topic,
        subject: Some(subject),
        expert_raw: refined.original,
        refined: refined.refined,
        examples,
        status: if refined.refined {
            AnswerStatus::Refined
        } else {
            AnswerStatus::Unrefined
        },
        topic_keys: records.iter().map(|r| r.topic_key.clone()).collect(),
        diagnostic: None,
        suggestions: Vec::new(),
    }
}

fn diagnostic_answer(output: DiagnosticOutput) -> Answer {
    Answer {
        content: output.render(),
        concept: output.concept.clone(),
        topic: output.condition.clone(),
        subject: Some(Subject::StudyGuide),
        expert_raw: output.explanation.clone(),
        refined: false,
        examples: output.examples.clone(),
        status: AnswerStatus::Diagnostic,
        topic_keys: Vec::new(),
        diagnostic: Some(output),
        suggestions: Vec::new(),
    }
}

fn is_cancel(input: &str) -> bool {
    let t = input
        .trim()
        .trim_end_matches(['.', '!'])
        .to_lowercase();
    CANCEL_WORDS.contains(&t.as_str())
}

fn join_list(items: &[&str], last: &str) -> String {
    match items {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., tail] => format!("{} {} {}", init.join(", "), last, tail),
    }
}

fn join_or(items: &[&str]) -> String {
    join_list(items, "or")
}

fn join_and(items: &[&str]) -> String {
    join_list(items, "and")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DisabledLlm, FakeLlmClient, FakeReply};
    use std::time::Duration;

    fn orchestrator() -> Orchestrator {
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        Orchestrator::new(kb, Arc::new(DisabledLlm), &TutorConfig::default())
    }

    #[test]
    fn test_state_invariant() {
        let mut state = OrchestratorState::default();
        assert!(state.check().is_ok());
        state.awaiting_clarification = true;
        assert!(state.check().is_err());
        state.pending_prompt = Some("which?".to_string());
        state.pending_session = Some(DiagnosticSession::default());
        assert!(state.check().is_ok());
        state.pending_subject = Some(SubjectChoice {
            original_question: "q".to_string(),
            candidates: vec![Subject::Physics],
        });
        assert!(state.check().is_err());
    }

    #[test]
    fn test_joins() {
        assert_eq!(join_or(&["Physics", "Biology"]), "Physics or Biology");
        assert_eq!(join_and(&["A", "B", "C"]), "A, B and C");
        assert_eq!(join_and(&["A"]), "A");
    }

    #[test]
    fn test_cancel_words() {
        assert!(is_cancel("Cancel."));
        assert!(is_cancel("never mind"));
        assert!(!is_cancel("math"));
    }

    #[test]
    fn test_result_wire_format() {
        let result = OrchestratorResult::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");

        let request = OrchestratorResult::ClarificationRequest(ClarificationRequest {
            question: "Physics or Biology?".to_string(),
            topic: SUBJECT_TOPIC.to_string(),
            options: vec!["Physics".to_string(), "Biology".to_string()],
            subject: None,
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "clarification_request");
        let back: OrchestratorResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[tokio::test]
    async fn test_empty_input_leaves_state_alone() {
        let mut orch = orchestrator();
        let result = orch.process_query("   ").await;
        assert!(result.clarification().is_some());
        assert!(orch.memory().is_empty());
        assert_eq!(orch.state(), &OrchestratorState::default());
    }

    #[tokio::test]
    async fn test_cancel_clears_interview() {
        let mut orch = orchestrator();
        let first = orch.process_query("I'm struggling with studies").await;
        assert!(first.clarification().is_some());
        assert!(orch.state().pending_session.is_some());

        let result = orch.process_query("cancel").await;
        assert_eq!(result.answer().map(|a| a.status), Some(AnswerStatus::Incomplete));
        assert_eq!(orch.state(), &OrchestratorState::default());
        assert_eq!(orch.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_open_turn_abandoned() {
        let mut orch = orchestrator();
        orch.memory.start_turn("interrupted");
        let result = orch.process_query("What is photosynthesis?").await;
        assert!(result.answer().is_some());
        assert_eq!(orch.memory().len(), 1);
        assert!(orch.memory().current().is_none());
    }

    fn slow_classifier(first: &str) -> Orchestrator {
        let fake = FakeLlmClient::builder()
            .reply(first)
            .reply(FakeReply::Delayed(
                Duration::from_secs(3),
                "SUBJECT: Biology\nCONFIDENCE: 0.9".to_string(),
            ))
            .build();
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        Orchestrator::new(kb, Arc::new(fake), &TutorConfig::default())
    }

    #[tokio::test]
    async fn test_cancelled_query_leaves_no_open_turn() {
        let fake = FakeLlmClient::builder()
            .when_contains(
                crate::classifier::PROMPT_HEADER,
                FakeReply::Delayed(Duration::from_secs(3), "SUBJECT: Biology\nCONFIDENCE: 0.9".to_string()),
            )
            .build();
        let kb = Arc::new(KnowledgeBase::builtin().unwrap());
        let mut orch = Orchestrator::new(kb, Arc::new(fake), &TutorConfig::default());

        let cut = tokio::time::timeout(
            Duration::from_millis(50),
            orch.process_query("What is photosynthesis?"),
        )
        .await;
        assert!(cut.is_err());
        assert!(orch.memory().current().is_none());
        assert!(orch.memory().is_empty());
        assert_eq!(orch.state(), &OrchestratorState::default());
    }

    #[tokio::test]
    async fn test_cancelled_reply_keeps_pending_question() {
        let mut orch = slow_classifier(
            "SUBJECT: Physics\nCONFIDENCE: 0.45\nIS_CLARIFICATION: no\nTOPICS: none\nREASONING: vague",
        );
        let first = orch.process_query("Tell me about energy").await;
        assert!(first.clarification().is_some());
        let pending = orch.state().clone();

        let cut = tokio::time::timeout(
            Duration::from_millis(50),
            orch.process_query("the one about heat"),
        )
        .await;
        assert!(cut.is_err());
        assert!(orch.memory().current().is_none());
        assert_eq!(orch.memory().len(), 1);
        assert_eq!(orch.state(), &pending);
    }
}
