//! End-to-end conversations through the orchestrator.
//!
//! Tests verify:
//! - Direct lookups route to the right expert and keep equations intact
//! - Ambiguous questions ask for a subject and resume on the reply
//! - Compound questions synthesize several records
//! - The study-guide interview progresses to a diagnosis
//! - Everything still answers with the LLM disabled, slow or failing
//! - Unknown topics produce a no-match answer with suggestions

use std::sync::Arc;
use std::time::Duration;

use tutor_common::classifier;
use tutor_common::llm::{DisabledLlm, FakeLlmClient, FakeReply, LlmClient};
use tutor_common::refiner;
use tutor_common::{AnswerStatus, KnowledgeBase, Orchestrator, Subject, TutorConfig};

const EQUATION: &str = "6CO₂ + 6H₂O → C₆H₁₂O₆ + 6O₂";

fn kb() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::builtin().unwrap())
}

fn orchestrator(llm: Arc<dyn LlmClient>) -> Orchestrator {
    Orchestrator::new(kb(), llm, &TutorConfig::default())
}

fn offline() -> Orchestrator {
    orchestrator(Arc::new(DisabledLlm))
}

#[tokio::test]
async fn test_information_lookup() {
    let fake = Arc::new(
        FakeLlmClient::builder()
            .when_contains(
                classifier::PROMPT_HEADER,
                "SUBJECT: Biology\nCONFIDENCE: 0.95\nIS_CLARIFICATION: no\nTOPICS: photosynthesis\nREASONING: asks about plants",
            )
            .when_contains(
                refiner::PROMPT_HEADER,
                "Green plants capture light with chlorophyll and turn carbon dioxide and water into glucose and oxygen.",
            )
            .build(),
    );
    let mut orch = orchestrator(fake.clone());

    let result = orch.process_query("What is photosynthesis?").await;
    let answer = result.answer().expect("answer");
    assert_eq!(answer.subject, Some(Subject::Biology));
    assert_eq!(answer.concept, "Photosynthesis");
    assert_eq!(answer.topic_keys, vec!["photosynthesis".to_string()]);
    assert_eq!(answer.status, AnswerStatus::Refined);
    assert!(answer.refined);
    assert!(answer.content.contains(EQUATION));
    assert!(answer.expert_raw.contains(EQUATION));
    assert_eq!(fake.call_count(), 2);
    assert!(!orch.state().awaiting_clarification);
}

#[tokio::test]
async fn test_ambiguous_intent_asks_then_resumes() {
    let fake = Arc::new(
        FakeLlmClient::builder()
            .when_contains(
                classifier::PROMPT_HEADER,
                "SUBJECT: Physics\nCONFIDENCE: 0.45\nIS_CLARIFICATION: no\nTOPICS: none\nREASONING: energy is everywhere",
            )
            .when_contains(refiner::PROMPT_HEADER, "Energy can be stored and transferred.")
            .build(),
    );
    let mut orch = orchestrator(fake);

    let first = orch.process_query("Tell me about energy").await;
    let request = first.clarification().expect("clarification");
    assert!(request.options.contains(&"Physics".to_string()));
    assert!(request.options.contains(&"Biology".to_string()));
    assert!(request.question.contains("Physics"));
    assert!(orch.state().awaiting_clarification);
    assert!(orch.state().pending_subject.is_some());

    let second = orch.process_query("Physics").await;
    let answer = second.answer().expect("answer");
    assert_eq!(answer.subject, Some(Subject::Physics));
    assert!(!answer.topic_keys.is_empty());
    assert!(!orch.state().awaiting_clarification);

    let turns: Vec<_> = orch.memory().turns().collect();
    assert_eq!(turns.len(), 2);
    assert!(turns[0].needed_clarification);
    assert!(turns[1].needed_clarification);
    assert_eq!(turns[1].clarifications[0].response.as_deref(), Some("Physics"));
}

#[tokio::test]
async fn test_ambiguous_intent_offline() {
    let mut orch = offline();
    let first = orch.process_query("Tell me about energy").await;
    let request = first.clarification().expect("clarification");
    assert_eq!(request.options.len(), 2);

    // candidate numbers are accepted too
    let physics_index = request
        .options
        .iter()
        .position(|o| o == "Physics")
        .unwrap()
        + 1;
    let second = orch.process_query(&physics_index.to_string()).await;
    assert_eq!(second.answer().and_then(|a| a.subject), Some(Subject::Physics));
}

#[tokio::test]
async fn test_multi_record_answer() {
    let fake = Arc::new(
        FakeLlmClient::builder()
            .when_contains(
                classifier::PROMPT_HEADER,
                "SUBJECT: Biology\nCONFIDENCE: 0.9\nIS_CLARIFICATION: no\nTOPICS: digestion_of_food, mechanical_process_digestion, chemical_process_digestion\nREASONING: digestion",
            )
            .when_contains(refiner::PROMPT_HEADER, "Digestion breaks food down so the body can absorb it.")
            .build(),
    );
    let mut orch = orchestrator(fake);
    let kb = kb();

    let result = orch.process_query("What are the processes of digestion?").await;
    let answer = result.answer().expect("answer");
    assert!(answer.topic_keys.len() >= 2);
    assert!(answer.topic_keys.contains(&"digestion_of_food".to_string()));

    let records: Vec<_> = answer
        .topic_keys
        .iter()
        .map(|k| kb.get(Subject::Biology, k).unwrap())
        .collect();
    for record in &records {
        assert!(answer.content.contains(&record.concept), "missing {}", record.concept);
    }

    let mut union: Vec<String> = Vec::new();
    for example in records.iter().flat_map(|r| r.examples.iter()) {
        if !union.contains(example) {
            union.push(example.clone());
        }
    }
    assert_eq!(answer.examples, union);
}

#[tokio::test]
async fn test_multi_record_answer_offline() {
    let mut orch = offline();
    let result = orch.process_query("What are the processes of digestion?").await;
    let answer = result.answer().expect("answer");
    assert_eq!(answer.status, AnswerStatus::Unrefined);
    assert_eq!(
        answer.topic_keys,
        vec![
            "digestion_of_food".to_string(),
            "mechanical_process_digestion".to_string(),
            "chemical_process_digestion".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_diagnostic_progression() {
    let mut orch = offline();

    let first = orch.process_query("I'm struggling with studies").await;
    let q1 = first.clarification().expect("weak area question");
    assert!(q1.question.starts_with("What area"));
    assert_eq!(q1.topic, "weak_area");
    assert_eq!(q1.subject, Some(Subject::StudyGuide));
    assert!(orch.state().pending_session.is_some());

    let second = orch.process_query("math").await;
    let q2 = second.clarification().expect("refinement question");
    assert!(q2.question.starts_with("Which subject's math"));

    let third = orch.process_query("physics").await;
    let answer = third.answer().expect("diagnosis");
    assert_eq!(answer.status, AnswerStatus::Diagnostic);
    let diagnostic = answer.diagnostic.as_ref().expect("diagnostic output");
    assert!(!diagnostic.diagnosis.is_empty());
    assert!(!diagnostic.recommendation.is_empty());
    assert!(diagnostic.reasoning_chain.len() >= 3);
    assert!(answer.content.contains(&diagnostic.recommendation));
    assert!(!orch.state().awaiting_clarification);
    assert_eq!(orch.memory().len(), 3);
}

#[tokio::test]
async fn test_unrecognized_interview_answer_is_reasked() {
    let mut orch = offline();
    orch.process_query("I'm struggling with studies").await;

    let retry = orch.process_query("bananas").await;
    let request = retry.clarification().expect("re-ask");
    assert!(request.question.contains("What area"));
    assert_eq!(orch.state().pending_session.as_ref().map(|s| s.attempts), Some(1));

    let last = orch.memory().turns().last().unwrap();
    assert_eq!(last.clarifications[0].response.as_deref(), Some("bananas"));

    let next = orch.process_query("essay writing").await;
    assert!(next.clarification().unwrap().question.contains("essay writing"));
}

#[tokio::test]
async fn test_llm_outage_returns_raw_explanation() {
    let kb = kb();
    let explanation = kb.get(Subject::Biology, "photosynthesis").unwrap().explanation.clone();

    for llm in [
        Arc::new(DisabledLlm) as Arc<dyn LlmClient>,
        Arc::new(FakeLlmClient::builder().unavailable().build()),
        Arc::new(
            FakeLlmClient::builder()
                .when_contains(classifier::PROMPT_HEADER, FakeReply::Error("503".into()))
                .when_contains(refiner::PROMPT_HEADER, FakeReply::Error("503".into()))
                .build(),
        ),
    ] {
        let mut orch = orchestrator(llm);
        let result = orch.process_query("What is photosynthesis?").await;
        let answer = result.answer().expect("answer");
        assert_eq!(answer.expert_raw, explanation);
        assert_eq!(answer.content, explanation);
        assert!(!answer.refined);
        assert_eq!(answer.status, AnswerStatus::Unrefined);
    }
}

#[tokio::test]
async fn test_llm_timeout_degrades() {
    let mut config = TutorConfig::default();
    config.llm.timeout_secs = 1;
    let slow = FakeLlmClient::builder()
        .when_contains(
            classifier::PROMPT_HEADER,
            FakeReply::Delayed(Duration::from_secs(5), "SUBJECT: Biology\nCONFIDENCE: 0.9".into()),
        )
        .when_contains(
            refiner::PROMPT_HEADER,
            FakeReply::Delayed(Duration::from_secs(5), "late".into()),
        )
        .build();
    let mut orch = Orchestrator::new(kb(), Arc::new(slow), &config);

    let result = orch.process_query("What is photosynthesis?").await;
    let answer = result.answer().expect("answer");
    assert_eq!(answer.subject, Some(Subject::Biology));
    assert_eq!(answer.status, AnswerStatus::Unrefined);
}

#[tokio::test]
async fn test_unknown_topic_suggests_alternatives() {
    let mut orch = offline();
    let kb = kb();

    let result = orch.process_query("Explain quantum chromodynamics").await;
    let answer = result.answer().expect("answer");
    assert_eq!(answer.subject, Some(Subject::Physics));
    assert_eq!(answer.status, AnswerStatus::NoMatch);
    assert!(answer.suggestions.len() >= 3);
    let physics = kb.list_topics(Subject::Physics);
    assert!(answer.suggestions.iter().all(|s| physics.contains(s)));
    for s in &answer.suggestions {
        assert!(answer.content.contains(s.as_str()));
    }
    assert_eq!(orch.memory().len(), 1);
}

#[tokio::test]
async fn test_classifier_topic_outside_knowledge_is_ignored() {
    let fake = FakeLlmClient::builder()
        .when_contains(
            classifier::PROMPT_HEADER,
            "SUBJECT: Physics\nCONFIDENCE: 0.9\nIS_CLARIFICATION: no\nTOPICS: string_theory\nREASONING: physics",
        )
        .build();
    let mut orch = orchestrator(Arc::new(fake));
    let result = orch.process_query("Explain string theory").await;
    assert_eq!(result.answer().map(|a| a.status), Some(AnswerStatus::NoMatch));
}
