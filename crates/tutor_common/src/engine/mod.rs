//! Forward-chaining production engine.
//!
//! Working memory is an append-only list of facts (until `reset`). Declaring a
//! fact re-matches only the rules whose patterns mention one of its slots.
//! Conflict resolution: highest salience, then rule insertion order, then
//! fact ids. Every `(rule, fact ids)` activation fires at most once.

pub mod fact;
pub mod pattern;
pub mod rule;

pub use fact::{Fact, FactId, Value};
pub use pattern::{Bindings, Condition, FactPattern, SlotTest};
pub use rule::{Firing, Rule};

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_STEPS: usize = 256;

/// A matched rule waiting on the agenda
#[derive(Debug, Clone)]
pub struct Activation {
    pub rule: usize,
    pub facts: Vec<FactId>,
    pub bindings: Bindings,
}

/// Outcome of one `run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fired: Vec<String>,
    pub halted: bool,
    pub step_cap_reached: bool,
}

pub struct Engine<S> {
    rules: Vec<Rule<S>>,
    /// slot name -> rules whose patterns mention it
    slot_index: HashMap<String, Vec<usize>>,
    facts: Vec<Fact>,
    signatures: HashMap<String, FactId>,
    agenda: Vec<Activation>,
    dirty: BTreeSet<usize>,
    fired: HashSet<(usize, Vec<FactId>)>,
    history: Vec<String>,
    max_steps: usize,
}

impl<S> Default for Engine<S> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl<S> Engine<S> {
    pub fn new(max_steps: usize) -> Self {
        Self {
            rules: Vec::new(),
            slot_index: HashMap::new(),
            facts: Vec::new(),
            signatures: HashMap::new(),
            agenda: Vec::new(),
            dirty: BTreeSet::new(),
            fired: HashSet::new(),
            history: Vec::new(),
            max_steps: max_steps.max(1),
        }
    }

    pub fn add_rule(&mut self, rule: Rule<S>) {
        let idx = self.rules.len();
        for slot in rule.slots() {
            self.slot_index.entry(slot.to_string()).or_default().push(idx);
        }
        self.rules.push(rule);
        self.dirty.insert(idx);
    }

    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = Rule<S>>) {
        for rule in rules {
            self.add_rule(rule);
        }
    }

    /// Add a fact to working memory. A fact equal to an existing one
    /// coalesces and returns the existing id.
    pub fn declare(&mut self, fact: Fact) -> FactId {
        let signature = fact.signature();
        if let Some(&id) = self.signatures.get(&signature) {
            return id;
        }
        let id = self.facts.len();
        for slot in fact.slot_names() {
            if let Some(rules) = self.slot_index.get(slot) {
                self.dirty.extend(rules.iter().copied());
            }
        }
        debug!(id, fact = %fact, "declare");
        self.facts.push(fact);
        self.signatures.insert(signature, id);
        id
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// First value of `slot` across working memory
    pub fn value_of(&self, slot: &str) -> Option<&Value> {
        self.facts.iter().find_map(|f| f.get(slot))
    }

    pub fn has_slot(&self, slot: &str) -> bool {
        self.value_of(slot).is_some()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Pending activations after bringing the agenda up to date
    pub fn agenda(&mut self) -> &[Activation] {
        self.refresh();
        &self.agenda
    }

    /// Names of rules fired since the last reset, in firing order
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Clear facts, agenda and activation history. Rules remain.
    pub fn reset(&mut self) {
        self.facts.clear();
        self.signatures.clear();
        self.agenda.clear();
        self.fired.clear();
        self.history.clear();
        self.dirty = (0..self.rules.len()).collect();
    }

    /// Fire activations until the agenda drains, an action halts, or the
    /// step cap is hit.
    pub fn run(&mut self, state: &mut S) -> RunReport {
        let mut report = RunReport::default();
        loop {
            self.refresh();
            let Some(pos) = self.select() else {
                break;
            };
            if report.fired.len() >= self.max_steps {
                warn!(max_steps = self.max_steps, "rule engine step cap reached");
                report.step_cap_reached = true;
                break;
            }

            let activation = self.agenda.swap_remove(pos);
            self.fired.insert((activation.rule, activation.facts.clone()));
            let rule = &self.rules[activation.rule];
            let action = Arc::clone(&rule.action);
            let name = rule.name.clone();

            let (asserted, halted) = {
                let matched: Vec<&Fact> = activation.facts.iter().map(|&id| &self.facts[id]).collect();
                let mut firing = Firing::new(&mut *state, &name, &activation.bindings, matched);
                action(&mut firing);
                firing.finish()
            };
            debug!(rule = %name, facts = ?activation.facts, "fired");
            self.history.push(name.clone());
            report.fired.push(name);

            for fact in asserted {
                self.declare(fact);
            }
            if halted {
                report.halted = true;
                break;
            }
        }
        report
    }

    /// Re-match dirty rules and rebuild their agenda entries.
    fn refresh(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut self.dirty);
        self.agenda.retain(|a| !dirty.contains(&a.rule));
        for idx in dirty {
            let mut found = Vec::new();
            self.match_from(idx, 0, Bindings::new(), Vec::new(), &mut found);
            for activation in found {
                if !self.fired.contains(&(activation.rule, activation.facts.clone())) {
                    self.agenda.push(activation);
                }
            }
        }
    }

    fn match_from(
        &self,
        rule: usize,
        cond: usize,
        bindings: Bindings,
        ids: Vec<FactId>,
        out: &mut Vec<Activation>,
    ) {
        let conditions = &self.rules[rule].conditions;
        let Some(condition) = conditions.get(cond) else {
            out.push(Activation {
                rule,
                facts: ids,
                bindings,
            });
            return;
        };
        match condition {
            Condition::Match(pattern) => {
                for (id, fact) in self.facts.iter().enumerate() {
                    if let Some(extended) = pattern.matches(fact, &bindings) {
                        let mut next = ids.clone();
                        next.push(id);
                        self.match_from(rule, cond + 1, extended, next, out);
                    }
                }
            }
            Condition::Not(pattern) => {
                if !self.facts.iter().any(|f| pattern.matches(f, &bindings).is_some()) {
                    self.match_from(rule, cond + 1, bindings, ids, out);
                }
            }
            Condition::Test(pred) => {
                if pred(&bindings) {
                    self.match_from(rule, cond + 1, bindings, ids, out);
                }
            }
        }
    }

    fn select(&self) -> Option<usize> {
        self.agenda
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| self.precedence(a, b))
            .map(|(pos, _)| pos)
    }

    /// `Greater` means `a` fires before `b`.
    fn precedence(&self, a: &Activation, b: &Activation) -> Ordering {
        let sa = self.rules[a.rule].salience;
        let sb = self.rules[b.rule].salience;
        sa.cmp(&sb)
            .then_with(|| b.rule.cmp(&a.rule))
            .then_with(|| b.facts.cmp(&a.facts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<String>;

    fn push_name(f: &mut Firing<'_, Log>) {
        let name = f.rule_name().to_string();
        f.state.push(name);
    }

    #[test]
    fn test_salience_then_insertion_order() {
        let mut engine: Engine<Log> = Engine::default();
        engine.add_rule(Rule::new("low", push_name).when(FactPattern::new().exists("x")));
        engine.add_rule(Rule::new("first", push_name).salience(10).when(FactPattern::new().exists("x")));
        engine.add_rule(Rule::new("second", push_name).salience(10).when(FactPattern::new().exists("x")));
        engine.declare(Fact::single("x", 1));

        let mut log = Log::new();
        let report = engine.run(&mut log);
        assert_eq!(log, vec!["first", "second", "low"]);
        assert_eq!(report.fired.len(), 3);
        assert!(!report.halted);
    }

    #[test]
    fn test_activation_fires_once() {
        let mut engine: Engine<Log> = Engine::default();
        engine.add_rule(Rule::new("topic", push_name).when(FactPattern::new().eq("query_topic", "waves")));
        engine.declare(Fact::single("query_topic", "waves"));
        engine.declare(Fact::single("query_topic", "waves"));

        let mut log = Log::new();
        engine.run(&mut log);
        engine.run(&mut log);
        assert_eq!(log, vec!["topic"]);
        assert_eq!(engine.facts().len(), 1);
    }

    #[test]
    fn test_negation_and_halt() {
        let mut engine: Engine<Log> = Engine::default();
        engine.add_rule(
            Rule::new("ask_area", |f: &mut Firing<'_, Log>| {
                f.state.push("ask".into());
                f.halt();
            })
            .salience(100)
            .when(FactPattern::new().eq("action", "diagnose"))
            .unless(FactPattern::new().exists("weak_area")),
        );
        engine.add_rule(
            Rule::new("log_area", push_name)
                .salience(50)
                .when(FactPattern::new().bind("weak_area", "area")),
        );
        engine.declare(Fact::single("action", "diagnose"));

        let mut log = Log::new();
        let report = engine.run(&mut log);
        assert!(report.halted);
        assert_eq!(log, vec!["ask"]);

        engine.declare(Fact::single("weak_area", "math"));
        engine.run(&mut log);
        assert_eq!(log, vec!["ask", "log_area"]);
    }

    #[test]
    fn test_join_and_assert_chain() {
        let mut engine: Engine<Log> = Engine::default();
        engine.add_rule(
            Rule::new("infer", |f: &mut Firing<'_, Log>| {
                f.assert(Fact::single("condition", "memory_impaired"));
            })
            .salience(60)
            .when(FactPattern::new().test("sleep_hours", |v| v.as_f64().map_or(false, |h| h < 6.0)))
            .when(FactPattern::new().test("stress_level", |v| v.as_f64().map_or(false, |s| s >= 7.0))),
        );
        engine.add_rule(
            Rule::new("advise", |f: &mut Firing<'_, Log>| {
                let c = f.binding_str("c").unwrap_or_default().to_string();
                f.state.push(c);
            })
            .when(FactPattern::new().bind("condition", "c")),
        );
        engine.declare(Fact::single("sleep_hours", 5));
        engine.declare(Fact::single("stress_level", 8));

        let mut log = Log::new();
        engine.run(&mut log);
        assert_eq!(log, vec!["memory_impaired"]);
        assert_eq!(engine.history(), &["infer".to_string(), "advise".to_string()]);
    }

    #[test]
    fn test_step_cap() {
        let mut engine: Engine<u32> = Engine::new(3);
        engine.add_rule(Rule::new("grow", |f: &mut Firing<'_, u32>| {
            *f.state += 1;
            let n = *f.state as i64;
            f.assert(Fact::single("n", n));
        })
        .when(FactPattern::new().exists("n")));
        engine.declare(Fact::single("n", 0));

        let mut count = 0;
        let report = engine.run(&mut count);
        assert!(report.step_cap_reached);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_reset_keeps_rules() {
        let mut engine: Engine<Log> = Engine::default();
        engine.add_rule(Rule::new("topic", push_name).when(FactPattern::new().exists("query_topic")));
        engine.declare(Fact::single("query_topic", "waves"));
        let mut log = Log::new();
        engine.run(&mut log);

        engine.reset();
        assert!(engine.facts().is_empty());
        assert!(engine.history().is_empty());
        assert_eq!(engine.rule_count(), 1);

        engine.declare(Fact::single("query_topic", "waves"));
        engine.run(&mut log);
        assert_eq!(log, vec!["topic", "topic"]);
    }
}
