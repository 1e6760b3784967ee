//! Fact templates and rule conditions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::fact::{Fact, Value};

/// Variable bindings collected while matching a rule's conditions.
pub type Bindings = BTreeMap<String, Value>;

pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type BindingPredicate = Arc<dyn Fn(&Bindings) -> bool + Send + Sync>;

/// Test applied to one slot of a candidate fact
#[derive(Clone)]
pub enum SlotTest {
    /// Slot present with any value (wildcard)
    Exists,
    /// Slot equals a literal
    Eq(Value),
    /// Bind the slot value to a variable; joins if already bound
    Bind(String),
    /// Arbitrary predicate on the slot value, e.g. `x < 7`
    Test(ValuePredicate),
}

impl fmt::Debug for SlotTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => write!(f, "*"),
            Self::Eq(v) => write!(f, "=={}", v),
            Self::Bind(var) => write!(f, "?{}", var),
            Self::Test(_) => write!(f, "<test>"),
        }
    }
}

/// Template over a fact: all slot tests must pass; extra slots are ignored.
#[derive(Debug, Clone, Default)]
pub struct FactPattern {
    tests: Vec<(String, SlotTest)>,
}

impl FactPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, slot: &str, value: impl Into<Value>) -> Self {
        self.tests.push((slot.to_string(), SlotTest::Eq(value.into())));
        self
    }

    pub fn exists(mut self, slot: &str) -> Self {
        self.tests.push((slot.to_string(), SlotTest::Exists));
        self
    }

    pub fn bind(mut self, slot: &str, var: &str) -> Self {
        self.tests.push((slot.to_string(), SlotTest::Bind(var.to_string())));
        self
    }

    pub fn test(mut self, slot: &str, pred: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.tests.push((slot.to_string(), SlotTest::Test(Arc::new(pred))));
        self
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|(s, _)| s.as_str())
    }

    /// Match `fact` under `bindings`; returns the extended bindings on success.
    pub fn matches(&self, fact: &Fact, bindings: &Bindings) -> Option<Bindings> {
        let mut extended: Option<Bindings> = None;
        for (slot, test) in &self.tests {
            let value = fact.get(slot)?;
            match test {
                SlotTest::Exists => {}
                SlotTest::Eq(expected) => {
                    if !value.loosely_eq(expected) {
                        return None;
                    }
                }
                SlotTest::Test(pred) => {
                    if !pred(value) {
                        return None;
                    }
                }
                SlotTest::Bind(var) => {
                    let current = extended.as_ref().unwrap_or(bindings);
                    match current.get(var) {
                        Some(bound) if !bound.loosely_eq(value) => return None,
                        Some(_) => {}
                        None => {
                            extended
                                .get_or_insert_with(|| bindings.clone())
                                .insert(var.clone(), value.clone());
                        }
                    }
                }
            }
        }
        Some(extended.unwrap_or_else(|| bindings.clone()))
    }
}

/// One conjunct of a rule's left-hand side
#[derive(Clone)]
pub enum Condition {
    Match(FactPattern),
    /// Negation as failure: no fact matches under current bindings
    Not(FactPattern),
    Test(BindingPredicate),
}

impl Condition {
    pub fn test(pred: impl Fn(&Bindings) -> bool + Send + Sync + 'static) -> Self {
        Self::Test(Arc::new(pred))
    }

    pub fn pattern(&self) -> Option<&FactPattern> {
        match self {
            Self::Match(p) | Self::Not(p) => Some(p),
            Self::Test(_) => None,
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match(p) => write!(f, "{:?}", p),
            Self::Not(p) => write!(f, "NOT({:?})", p),
            Self::Test(_) => write!(f, "TEST(<fn>)"),
        }
    }
}
