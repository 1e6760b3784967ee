//! Diagnostic expert: progressive interview for the study guide.
//!
//! Salience classes:
//! - 100: ask for the weak area
//! - 90: ask the weak area's refinement question
//! - 50-70: log collected facts, infer primary and modifier conditions
//! - 10: diagnosis from the study-guide knowledge entries
//!
//! Questioning and diagnosis rules halt, so one `run` advances the interview
//! by at most one step. A session is persisted as the ordered list of facts
//! declared from outside and replayed into a fresh expert on resume.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::interview::{
    self, detect_weak_area, match_choice, wellbeing_facts, Choice, WeakArea, WEAK_AREAS,
    WEAK_AREA_QUESTION, WEAK_AREA_VAR,
};
use crate::engine::{Engine, Fact, FactPattern, Firing, Rule, RunReport, Value, DEFAULT_MAX_STEPS};
use crate::knowledge::{is_primary_condition, DiagnosticKnowledge, MODIFIER_CONDITIONS};

/// Finished diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticOutput {
    pub condition: String,
    pub concept: String,
    pub diagnosis: String,
    pub explanation: String,
    pub recommendation: String,
    pub reasoning_chain: Vec<String>,
    pub confidence: f32,
    pub inferred_facts: Vec<String>,
    pub fired_rules: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl DiagnosticOutput {
    /// Student-facing text
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\n\n{}\n\nWhat to do next: {}",
            self.diagnosis, self.explanation, self.recommendation
        );
        if !self.resources.is_empty() {
            out.push_str("\n\nUseful resources:");
            for r in &self.resources {
                out.push_str(&format!("\n- {}", r));
            }
        }
        out
    }
}

/// Output buffer written by rule actions
#[derive(Debug, Clone, Default)]
pub struct DiagnosticState {
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    /// Slot the outstanding question is asking for
    pub pending_var: Option<String>,
    pub reasoning_chain: Vec<String>,
    pub inferred_facts: Vec<String>,
    pub modifiers: Vec<String>,
    pub learning_style: Option<String>,
    pub output: Option<DiagnosticOutput>,
}

impl DiagnosticState {
    fn ask(&mut self, var: &str, question: &str) {
        self.needs_clarification = true;
        self.pending_var = Some(var.to_string());
        self.clarification_question = Some(question.to_string());
    }
}

/// Outcome of reading a learner's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMatch {
    Accepted { var: String, value: String },
    Unrecognized { var: String },
    NothingPending,
}

/// Serializable interview progress: replay `facts` in order to rebuild it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSession {
    pub facts: Vec<Fact>,
    pub question: Option<String>,
    pub pending_var: Option<String>,
    /// Unrecognized replies to the current question
    #[serde(default)]
    pub attempts: u32,
    /// Consecutive runs that produced neither a question nor a diagnosis
    #[serde(default)]
    pub stalls: u32,
}

pub struct DiagnosticExpert {
    engine: Engine<DiagnosticState>,
    state: DiagnosticState,
    declared: Vec<Fact>,
}

impl DiagnosticExpert {
    pub fn new(knowledge: &DiagnosticKnowledge) -> Self {
        Self::with_max_steps(knowledge, DEFAULT_MAX_STEPS)
    }

    pub fn with_max_steps(knowledge: &DiagnosticKnowledge, max_steps: usize) -> Self {
        let mut engine: Engine<DiagnosticState> = Engine::new(max_steps);
        engine.add_rules(questioning_rules());
        engine.add_rules(logging_rules());
        engine.add_rules(inference_rules());
        engine.add_rules(modifier_rules());
        engine.add_rules(diagnosis_rules(knowledge));
        debug!(rules = engine.rule_count(), "diagnostic rulebook built");
        Self {
            engine,
            state: DiagnosticState::default(),
            declared: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.state = DiagnosticState::default();
        self.declared.clear();
    }

    pub fn declare(&mut self, fact: Fact) {
        if !self.declared.contains(&fact) {
            self.declared.push(fact.clone());
        }
        self.engine.declare(fact);
    }

    /// Open an interview for `question`: diagnose action, the raw query, any
    /// wellbeing facts and a weak area the question already names.
    pub fn begin(&mut self, question: &str) {
        self.declare(Fact::single("action", "diagnose"));
        self.declare(Fact::single("user_query", question));
        for fact in wellbeing_facts(question) {
            self.declare(fact);
        }
        if let Some(area) = detect_weak_area(question) {
            self.declare(Fact::single(WEAK_AREA_VAR, area.choice.value));
        }
    }

    /// Slot the interview needs next: the weak area, then that area's
    /// refinement.
    pub fn next_expected_var(&self) -> Option<&'static str> {
        match self.engine.value_of(WEAK_AREA_VAR).and_then(Value::as_str) {
            None => Some(WEAK_AREA_VAR),
            Some(value) => interview::weak_area(value)
                .map(|area| area.var)
                .filter(|var| !self.engine.has_slot(var)),
        }
    }

    /// Choices accepted for the next expected slot, in menu order
    pub fn expected_choices(&self) -> Vec<Choice> {
        match self.next_expected_var() {
            Some(WEAK_AREA_VAR) => interview::weak_area_choices(),
            Some(var) => WEAK_AREAS
                .iter()
                .find(|a| a.var == var)
                .map(|a| a.refinements.iter().map(|r| r.choice).collect())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn declare_user_response(&mut self, text: &str) -> ResponseMatch {
        let Some(var) = self.next_expected_var() else {
            return ResponseMatch::NothingPending;
        };
        match match_choice(text, &self.expected_choices()) {
            Some(choice) => {
                info!(var, value = choice.value, "interview answer accepted");
                self.declare(Fact::single(var, choice.value));
                self.state.needs_clarification = false;
                self.state.clarification_question = None;
                self.state.pending_var = None;
                ResponseMatch::Accepted {
                    var: var.to_string(),
                    value: choice.value.to_string(),
                }
            }
            None => {
                debug!(var, response = text, "interview answer not recognized");
                ResponseMatch::Unrecognized { var: var.to_string() }
            }
        }
    }

    pub fn run(&mut self) -> RunReport {
        let report = self.engine.run(&mut self.state);
        if let Some(output) = self.state.output.as_mut() {
            output.reasoning_chain = self.state.reasoning_chain.clone();
            output.inferred_facts = self.state.inferred_facts.clone();
            output.fired_rules = self.engine.history().to_vec();
        }
        debug!(
            fired = report.fired.len(),
            asking = self.state.needs_clarification,
            done = self.state.output.is_some(),
            "diagnostic expert run"
        );
        report
    }

    pub fn requires_clarification(&self) -> bool {
        self.state.needs_clarification && self.state.output.is_none()
    }

    pub fn get_clarification_question(&self) -> Option<&str> {
        self.state.clarification_question.as_deref()
    }

    pub fn is_diagnosis_complete(&self) -> bool {
        self.state.output.is_some()
    }

    pub fn get_response(&self) -> Option<&DiagnosticOutput> {
        self.state.output.as_ref()
    }

    pub fn state(&self) -> &DiagnosticState {
        &self.state
    }

    pub fn snapshot(&self) -> DiagnosticSession {
        DiagnosticSession {
            facts: self.declared.clone(),
            question: self.state.clarification_question.clone(),
            pending_var: self.state.pending_var.clone(),
            attempts: 0,
            stalls: 0,
        }
    }

    /// Rebuild from a snapshot: fresh working memory, facts replayed in order,
    /// the outstanding interview question restored. A free-form prompt with no
    /// pending slot is not restored.
    pub fn resume(&mut self, session: &DiagnosticSession) {
        self.reset();
        for fact in &session.facts {
            self.declare(fact.clone());
        }
        if let (Some(question), Some(var)) = (&session.question, &session.pending_var) {
            self.state.ask(var, question);
        }
    }
}

fn diagnose() -> FactPattern {
    FactPattern::new().eq("action", "diagnose")
}

fn questioning_rules() -> Vec<Rule<DiagnosticState>> {
    let mut rules = vec![Rule::new("ask_weak_area", |f: &mut Firing<'_, DiagnosticState>| {
        f.state.ask(WEAK_AREA_VAR, WEAK_AREA_QUESTION);
        f.halt();
    })
    .salience(100)
    .when(diagnose())
    .unless(FactPattern::new().exists(WEAK_AREA_VAR))];

    for area in WEAK_AREAS {
        let (var, question) = (area.var, area.question);
        rules.push(
            Rule::new(&format!("ask_{}", var), move |f: &mut Firing<'_, DiagnosticState>| {
                f.state.ask(var, question);
                f.halt();
            })
            .salience(90)
            .when(diagnose())
            .when(FactPattern::new().eq(WEAK_AREA_VAR, area.choice.value))
            .unless(FactPattern::new().exists(var)),
        );
    }
    rules
}

fn logging_rules() -> Vec<Rule<DiagnosticState>> {
    let mut rules = vec![Rule::new("log_weak_area", |f: &mut Firing<'_, DiagnosticState>| {
        let value = f.binding_str("area").unwrap_or_default();
        let label = interview::weak_area(value).map_or(value, |a| a.choice.label);
        let line = format!("Weak area identified: {}", label);
        f.state.reasoning_chain.push(line);
    })
    .salience(70)
    .when(diagnose())
    .when(FactPattern::new().bind(WEAK_AREA_VAR, "area"))];

    for area in WEAK_AREAS {
        let area: &'static WeakArea = area;
        rules.push(
            Rule::new(&format!("log_{}", area.var), move |f: &mut Firing<'_, DiagnosticState>| {
                let value = f.binding_str("detail").unwrap_or_default();
                let label = area
                    .refinements
                    .iter()
                    .find(|r| r.choice.value == value)
                    .map_or(value, |r| r.choice.label);
                let line = format!("Difficulty within {}: {}", area.choice.label, label);
                f.state.reasoning_chain.push(line);
            })
            .salience(65)
            .when(FactPattern::new().eq(WEAK_AREA_VAR, area.choice.value))
            .when(FactPattern::new().bind(area.var, "detail")),
        );
    }

    rules.push(
        Rule::new("log_learning_style", |f: &mut Firing<'_, DiagnosticState>| {
            let style = f.binding_str("style").unwrap_or_default().to_string();
            f.state.reasoning_chain.push(format!("Preferred learning style: {}", style));
            f.state.learning_style = Some(style);
        })
        .salience(55)
        .when(diagnose())
        .when(FactPattern::new().bind("learning_style", "style")),
    );
    rules
}

/// Primary condition from (weak area, refinement)
fn inference_rules() -> Vec<Rule<DiagnosticState>> {
    let mut rules = Vec::new();
    for area in WEAK_AREAS {
        for refinement in area.refinements {
            let condition = refinement.condition;
            rules.push(
                Rule::new(&format!("infer_{}", condition), move |f: &mut Firing<'_, DiagnosticState>| {
                    f.state.inferred_facts.push(format!("condition={}", condition));
                    f.state
                        .reasoning_chain
                        .push(format!("Inferred condition: {}", condition.replace('_', " ")));
                    f.assert(Fact::single("condition", condition));
                })
                .salience(60)
                .when(FactPattern::new().eq(WEAK_AREA_VAR, area.choice.value))
                .when(FactPattern::new().eq(area.var, refinement.choice.value)),
            );
        }
    }
    rules
}

fn number_below(limit: f64) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
    move |v| v.as_f64().map_or(false, |x| x < limit)
}

fn number_at_least(limit: f64) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
    move |v| v.as_f64().map_or(false, |x| x >= limit)
}

fn modifier_rule(condition: &'static str, reason: &'static str) -> Rule<DiagnosticState> {
    Rule::new(&format!("infer_{}", condition), move |f: &mut Firing<'_, DiagnosticState>| {
        f.state.inferred_facts.push(format!("condition={}", condition));
        f.state.reasoning_chain.push(reason.to_string());
        f.state.modifiers.push(condition.to_string());
        f.assert(Fact::single("condition", condition));
    })
    .salience(58)
    .when(diagnose())
}

/// Secondary conditions from wellbeing facts
fn modifier_rules() -> Vec<Rule<DiagnosticState>> {
    vec![
        modifier_rule(
            "memory_impaired",
            "Short sleep combined with high stress impairs memory consolidation",
        )
        .when(FactPattern::new().test("sleep_hours", number_below(6.0)))
        .when(FactPattern::new().test("stress_level", number_at_least(7.0))),
        modifier_rule(
            "exam_pressure",
            "An upcoming exam with raised stress adds exam pressure",
        )
        .when(FactPattern::new().eq("has_upcoming_exam", true))
        .when(FactPattern::new().test("stress_level", number_at_least(6.0))),
        modifier_rule(
            "study_overload",
            "More than 10 study hours a day points to overload",
        )
        .when(FactPattern::new().test("study_hours", |v| v.as_f64().map_or(false, |h| h > 10.0))),
        modifier_rule(
            "study_shortfall",
            "Fewer than 2 study hours a day is too little regular practice",
        )
        .when(FactPattern::new().test("study_hours", number_below(2.0))),
    ]
}

fn style_tip(style: &str) -> Option<&'static str> {
    match style {
        "visual" => Some("Turn notes into diagrams and colour-coded mind maps."),
        "auditory" => Some("Explain each topic aloud or record short summaries to replay."),
        "kinesthetic" => Some("Learn by doing: practice questions, models and experiments."),
        _ => None,
    }
}

/// One diagnosis rule per knowledge entry recommending for a primary condition
fn diagnosis_rules(knowledge: &DiagnosticKnowledge) -> Vec<Rule<DiagnosticState>> {
    let advice: Arc<BTreeMap<String, String>> = Arc::new(
        MODIFIER_CONDITIONS
            .iter()
            .filter_map(|c| knowledge.entry_for(c).map(|(_, _, r)| (c.to_string(), r.recommend.clone())))
            .collect(),
    );

    let mut rules = Vec::new();
    for (_, category, entry) in knowledge.entries() {
        if !is_primary_condition(&entry.condition) {
            continue;
        }
        let category = category.clone();
        let entry = entry.clone();
        let advice = Arc::clone(&advice);
        let condition = entry.condition.clone();
        rules.push(
            Rule::new(&format!("diagnose_{}", entry.id), move |f: &mut Firing<'_, DiagnosticState>| {
                let mut recommendation = entry.recommend.clone();
                for modifier in &f.state.modifiers {
                    if let Some(extra) = advice.get(modifier) {
                        recommendation.push(' ');
                        recommendation.push_str(extra);
                    }
                }
                if let Some(tip) = f.state.learning_style.as_deref().and_then(style_tip) {
                    recommendation.push(' ');
                    recommendation.push_str(tip);
                }
                f.state
                    .reasoning_chain
                    .push(format!("Matched diagnostic rule '{}' ({})", entry.id, category.concept));
                f.state.output = Some(DiagnosticOutput {
                    condition: entry.condition.clone(),
                    concept: category.concept.clone(),
                    diagnosis: category.diagnosis.clone(),
                    explanation: category.explanation.clone(),
                    recommendation,
                    reasoning_chain: Vec::new(),
                    confidence: entry.confidence,
                    inferred_facts: Vec::new(),
                    fired_rules: Vec::new(),
                    examples: category.examples.clone(),
                    resources: category.resources.clone(),
                });
                f.state.needs_clarification = false;
                f.halt();
            })
            .salience(10)
            .when(diagnose())
            .when(FactPattern::new().eq("condition", condition.as_str())),
        );
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;

    fn expert() -> DiagnosticExpert {
        let kb = KnowledgeBase::builtin().unwrap();
        DiagnosticExpert::new(kb.diagnostic())
    }

    #[test]
    fn test_first_run_asks_weak_area() {
        let mut e = expert();
        e.begin("I'm struggling with studies");
        let report = e.run();
        assert!(report.halted);
        assert!(e.requires_clarification());
        assert!(e.get_clarification_question().unwrap().starts_with("What area"));
        assert_eq!(e.next_expected_var(), Some("weak_area"));
    }

    #[test]
    fn test_full_interview() {
        let mut e = expert();
        e.begin("I'm struggling with studies");
        e.run();

        let m = e.declare_user_response("math");
        assert_eq!(m, ResponseMatch::Accepted { var: "weak_area".into(), value: "math".into() });
        e.run();
        assert!(e.requires_clarification());
        assert!(e.get_clarification_question().unwrap().starts_with("Which subject's math"));

        e.declare_user_response("physics");
        e.run();
        assert!(e.is_diagnosis_complete());
        assert!(!e.requires_clarification());
        let out = e.get_response().unwrap();
        assert_eq!(out.condition, "math_in_physics");
        assert!(out.reasoning_chain.len() >= 3);
        assert!(out.fired_rules.iter().any(|r| r == "diagnose_math_physics_formula_triangle"));
        assert!(!out.recommendation.is_empty());
    }

    #[test]
    fn test_unrecognized_response_keeps_question() {
        let mut e = expert();
        e.begin("help me study");
        e.run();
        let m = e.declare_user_response("no idea");
        assert_eq!(m, ResponseMatch::Unrecognized { var: "weak_area".into() });
        e.run();
        assert!(e.requires_clarification());
        assert!(e.get_clarification_question().unwrap().starts_with("What area"));
    }

    #[test]
    fn test_question_naming_area_skips_first_question() {
        let mut e = expert();
        e.begin("My essays keep getting low marks");
        e.run();
        assert_eq!(e.next_expected_var(), Some("essay_difficulty"));
        assert!(e.get_clarification_question().unwrap().contains("essay writing"));
    }

    #[test]
    fn test_modifiers_extend_recommendation() {
        let mut e = expert();
        e.begin("I sleep 4 hours and my stress is 9/10, I can't remember theory");
        e.run();
        e.declare_user_response("biology");
        e.run();
        let out = e.get_response().unwrap();
        assert_eq!(out.condition, "theory_biology");
        assert!(out.inferred_facts.contains(&"condition=memory_impaired".to_string()));
        assert!(out.recommendation.contains("8 hours of sleep"));
    }

    #[test]
    fn test_snapshot_replay_matches_live_run() {
        let mut live = expert();
        live.begin("I'm struggling with studies");
        live.run();
        live.declare_user_response("essay");
        live.run();

        let session = live.snapshot();
        assert_eq!(session.pending_var.as_deref(), Some("essay_difficulty"));

        let mut resumed = expert();
        resumed.resume(&session);
        assert!(resumed.requires_clarification());
        resumed.declare_user_response("timing");
        resumed.run();

        live.declare_user_response("timing");
        live.run();

        let a = live.get_response().unwrap();
        let b = resumed.get_response().unwrap();
        assert_eq!(a.condition, b.condition);
        assert_eq!(a.recommendation, b.recommendation);
    }

    #[test]
    fn test_session_serializes() {
        let mut e = expert();
        e.begin("I'm struggling with studies");
        e.run();
        let json = serde_json::to_string(&e.snapshot()).unwrap();
        let back: DiagnosticSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e.snapshot());
    }
}
