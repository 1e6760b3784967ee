//! Study-guide knowledge: diagnostic categories keyed by condition.
//!
//! `condition` values form a closed vocabulary. Primary conditions come out of
//! the interview (weak area + refinement) and drive diagnosis rules; modifier
//! conditions come out of wellbeing facts and only extend recommendations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, TutorError};

pub const PRIMARY_CONDITIONS: &[&str] = &[
    "math_in_physics",
    "math_in_chemistry",
    "math_in_biology",
    "math_foundations",
    "essay_structure",
    "essay_argument",
    "essay_language",
    "essay_timing",
    "mcq_time_pressure",
    "mcq_distractors",
    "mcq_concept_gaps",
    "theory_biology",
    "theory_chemistry",
    "theory_physics",
];

pub const MODIFIER_CONDITIONS: &[&str] = &[
    "memory_impaired",
    "exam_pressure",
    "study_overload",
    "study_shortfall",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRuleEntry {
    pub id: String,
    pub condition: String,
    pub recommend: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticCategory {
    pub concept: String,
    pub diagnosis: String,
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub rules: Vec<DiagnosticRuleEntry>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticKnowledge {
    pub categories: BTreeMap<String, DiagnosticCategory>,
}

impl DiagnosticKnowledge {
    pub fn from_json(json: &str) -> Result<Self> {
        let kb: DiagnosticKnowledge = serde_json::from_str(json)?;
        kb.validate()?;
        Ok(kb)
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for (name, category) in &self.categories {
            if category.diagnosis.trim().is_empty() || category.explanation.trim().is_empty() {
                return Err(TutorError::Knowledge(format!(
                    "diagnostic category '{}' needs a diagnosis and an explanation",
                    name
                )));
            }
            for rule in &category.rules {
                if !is_known_condition(&rule.condition) {
                    return Err(TutorError::Knowledge(format!(
                        "rule '{}' references unknown condition '{}'",
                        rule.id, rule.condition
                    )));
                }
                if !ids.insert(rule.id.clone()) {
                    return Err(TutorError::Knowledge(format!(
                        "duplicate diagnostic rule id '{}'",
                        rule.id
                    )));
                }
                if !(0.0..=1.0).contains(&rule.confidence) {
                    return Err(TutorError::Knowledge(format!(
                        "rule '{}' confidence {} outside [0,1]",
                        rule.id, rule.confidence
                    )));
                }
            }
        }
        Ok(())
    }

    /// All rule entries in deterministic (category name, file) order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DiagnosticCategory, &DiagnosticRuleEntry)> {
        self.categories
            .iter()
            .flat_map(|(name, cat)| cat.rules.iter().map(move |r| (name.as_str(), cat, r)))
    }

    /// First entry recommending for `condition`
    pub fn entry_for(&self, condition: &str) -> Option<(&str, &DiagnosticCategory, &DiagnosticRuleEntry)> {
        self.entries().find(|(_, _, r)| r.condition == condition)
    }
}

pub fn is_primary_condition(condition: &str) -> bool {
    PRIMARY_CONDITIONS.contains(&condition)
}

pub fn is_known_condition(condition: &str) -> bool {
    is_primary_condition(condition) || MODIFIER_CONDITIONS.contains(&condition)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "categories": {
            "math_skills": {
                "concept": "Applied maths",
                "diagnosis": "Maths gap",
                "explanation": "Formulas are not yet automatic.",
                "rules": [
                    {"id": "m1", "condition": "math_in_physics", "recommend": "Drill units.", "confidence": 0.8}
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_and_lookup() {
        let kb = DiagnosticKnowledge::from_json(SAMPLE).unwrap();
        let (cat, _, rule) = kb.entry_for("math_in_physics").unwrap();
        assert_eq!(cat, "math_skills");
        assert_eq!(rule.id, "m1");
        assert!(kb.entry_for("essay_structure").is_none());
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let bad = SAMPLE.replace("math_in_physics", "bad_luck");
        let err = DiagnosticKnowledge::from_json(&bad).unwrap_err();
        assert!(err.to_string().contains("bad_luck"));
    }

    #[test]
    fn test_vocabularies_are_disjoint() {
        for m in MODIFIER_CONDITIONS {
            assert!(!is_primary_condition(m));
        }
    }

    #[test]
    fn test_condition_lookup_via_knowledge_root() {
        use crate::knowledge;
        assert!(knowledge::is_primary_condition("mcq_distractors"));
        assert!(!knowledge::is_primary_condition("exam_pressure"));
        assert!(knowledge::is_known_condition("exam_pressure"));
        assert!(!knowledge::is_known_condition("homesick"));
    }
}
