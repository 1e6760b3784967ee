//! Working-memory facts: attribute → value records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Index of a fact in working memory. Stable until reset.
pub type FactId = usize;

/// Slot value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Equality that treats `7` and `7.0` as the same number.
    pub fn loosely_eq(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(l) => write!(f, "[{}]", l.join(", ")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(l: Vec<String>) -> Self {
        Self::List(l)
    }
}

/// An attribute-value record. Immutable once declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fact {
    slots: BTreeMap<String, Value>,
}

impl Fact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-slot fact, e.g. `Fact::single("query_topic", "photosynthesis")`
    pub fn single(slot: &str, value: impl Into<Value>) -> Self {
        Self::new().with(slot, value)
    }

    pub fn with(mut self, slot: &str, value: impl Into<Value>) -> Self {
        self.slots.insert(slot.to_string(), value.into());
        self
    }

    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.slots.get(slot)
    }

    pub fn get_str(&self, slot: &str) -> Option<&str> {
        self.get(slot).and_then(Value::as_str)
    }

    pub fn has(&self, slot: &str) -> bool {
        self.slots.contains_key(slot)
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Canonical text used to coalesce duplicate declarations
    pub fn signature(&self) -> String {
        format!("{:?}", self.slots)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .slots
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "Fact({})", parts.join(", "))
    }
}
