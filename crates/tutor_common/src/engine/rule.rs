//! Rules and the firing context handed to rule actions.

use std::sync::Arc;

use super::fact::{Fact, Value};
use super::pattern::{Bindings, Condition, FactPattern};

pub type Action<S> = Arc<dyn Fn(&mut Firing<'_, S>) + Send + Sync>;

/// A (conditions, action, salience) production.
pub struct Rule<S> {
    pub name: String,
    pub salience: i32,
    pub conditions: Vec<Condition>,
    pub(crate) action: Action<S>,
}

impl<S> Clone for Rule<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            salience: self.salience,
            conditions: self.conditions.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<S> std::fmt::Debug for Rule<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("conditions", &self.conditions)
            .finish()
    }
}

impl<S> Rule<S> {
    pub fn new(name: &str, action: impl Fn(&mut Firing<'_, S>) + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            salience: 0,
            conditions: Vec::new(),
            action: Arc::new(action),
        }
    }

    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    pub fn when(mut self, pattern: FactPattern) -> Self {
        self.conditions.push(Condition::Match(pattern));
        self
    }

    pub fn unless(mut self, pattern: FactPattern) -> Self {
        self.conditions.push(Condition::Not(pattern));
        self
    }

    pub fn test(mut self, pred: impl Fn(&Bindings) -> bool + Send + Sync + 'static) -> Self {
        self.conditions.push(Condition::test(pred));
        self
    }

    /// Disjunction: one rule per alternative, all sharing this rule's action
    /// and salience. Names get a `#n` suffix.
    pub fn any_of(self, alternatives: Vec<Vec<Condition>>) -> Vec<Rule<S>> {
        alternatives
            .into_iter()
            .enumerate()
            .map(|(i, alt)| {
                let mut conditions = self.conditions.clone();
                conditions.extend(alt);
                Rule {
                    name: format!("{}#{}", self.name, i + 1),
                    salience: self.salience,
                    conditions,
                    action: Arc::clone(&self.action),
                }
            })
            .collect()
    }

    /// Slots named by any Match/Not pattern
    pub(crate) fn slots(&self) -> Vec<&str> {
        let mut slots: Vec<&str> = self
            .conditions
            .iter()
            .filter_map(Condition::pattern)
            .flat_map(FactPattern::slots)
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

/// What a rule action sees while it runs.
pub struct Firing<'a, S> {
    pub state: &'a mut S,
    rule: &'a str,
    bindings: &'a Bindings,
    matched: Vec<&'a Fact>,
    asserted: Vec<Fact>,
    halted: bool,
}

impl<'a, S> Firing<'a, S> {
    pub(crate) fn new(
        state: &'a mut S,
        rule: &'a str,
        bindings: &'a Bindings,
        matched: Vec<&'a Fact>,
    ) -> Self {
        Self {
            state,
            rule,
            bindings,
            matched,
            asserted: Vec::new(),
            halted: false,
        }
    }

    pub fn rule_name(&self) -> &str {
        self.rule
    }

    pub fn binding(&self, var: &str) -> Option<&Value> {
        self.bindings.get(var)
    }

    pub fn binding_str(&self, var: &str) -> Option<&str> {
        self.binding(var).and_then(Value::as_str)
    }

    /// Facts matched by the positive conditions, in condition order
    pub fn matched(&self) -> &[&'a Fact] {
        &self.matched
    }

    /// Queue a fact for declaration once the action returns.
    pub fn assert(&mut self, fact: Fact) {
        self.asserted.push(fact);
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub(crate) fn finish(self) -> (Vec<Fact>, bool) {
        (self.asserted, self.halted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_of_shares_action_and_salience() {
        let rule = Rule::<Vec<String>>::new("mentions_sleep", |f| {
            let name = f.rule_name().to_string();
            f.state.push(name);
        })
        .salience(60)
        .when(FactPattern::new().eq("action", "diagnose"));

        let rules = rule.any_of(vec![
            vec![Condition::Match(FactPattern::new().exists("sleep_hours"))],
            vec![Condition::Match(FactPattern::new().exists("stress_level"))],
        ]);

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "mentions_sleep#1");
        assert!(rules.iter().all(|r| r.salience == 60 && r.conditions.len() == 2));
    }

    #[test]
    fn test_slots_cover_negated_patterns() {
        let rule = Rule::<()>::new("ask", |_| {})
            .when(FactPattern::new().eq("action", "diagnose"))
            .unless(FactPattern::new().exists("weak_area"));
        assert_eq!(rule.slots(), vec!["action", "weak_area"]);
    }
}
