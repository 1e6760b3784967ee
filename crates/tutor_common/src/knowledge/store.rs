//! Knowledge base store (per-subject record slices + study-guide schema).

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::builtin;
use super::diagnostic::DiagnosticKnowledge;
use super::record::KnowledgeRecord;
use crate::config::KnowledgeConfig;
use crate::error::{Result, TutorError};
use crate::subject::Subject;

/// On-disk layout of a subject file
#[derive(Debug, Deserialize)]
struct SubjectFile {
    #[serde(default)]
    subject: Option<String>,
    records: Vec<KnowledgeRecord>,
}

/// Records of one information subject, in file order.
#[derive(Debug, Clone)]
pub struct SubjectKnowledge {
    subject: Subject,
    records: Vec<KnowledgeRecord>,
    index: HashMap<String, usize>,
}

impl SubjectKnowledge {
    pub fn new(subject: Subject, records: Vec<KnowledgeRecord>) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|e| TutorError::Knowledge(format!("{}: {}", subject, e)))?;
            if index.insert(record.topic_key.clone(), i).is_some() {
                return Err(TutorError::Knowledge(format!(
                    "{}: duplicate topic_key '{}'",
                    subject, record.topic_key
                )));
            }
        }
        Ok(Self {
            subject,
            records,
            index,
        })
    }

    pub fn from_json(subject: Subject, json: &str) -> Result<Self> {
        let file: SubjectFile = serde_json::from_str(json)?;
        if let Some(declared) = &file.subject {
            if declared != subject.as_str() {
                return Err(TutorError::Knowledge(format!(
                    "file declares subject '{}' but was loaded as {}",
                    declared, subject
                )));
            }
        }
        Self::new(subject, file.records)
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn get(&self, topic_key: &str) -> Option<&KnowledgeRecord> {
        self.index.get(topic_key).map(|&i| &self.records[i])
    }

    pub fn contains(&self, topic_key: &str) -> bool {
        self.index.contains_key(topic_key)
    }

    /// Records in file order (rule definition order)
    pub fn records(&self) -> &[KnowledgeRecord] {
        &self.records
    }

    /// Sorted topic keys
    pub fn topic_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read-only after load. Shared across sessions behind an `Arc`.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    subjects: BTreeMap<Subject, SubjectKnowledge>,
    diagnostic: DiagnosticKnowledge,
}

impl KnowledgeBase {
    pub fn new(subjects: Vec<SubjectKnowledge>, diagnostic: DiagnosticKnowledge) -> Self {
        Self {
            subjects: subjects.into_iter().map(|s| (s.subject(), s)).collect(),
            diagnostic,
        }
    }

    /// Knowledge bundled with the crate
    pub fn builtin() -> Result<Self> {
        let mut subjects = Vec::new();
        for subject in Subject::INFORMATION {
            subjects.push(SubjectKnowledge::from_json(subject, builtin::subject_json(subject))?);
        }
        let diagnostic = DiagnosticKnowledge::from_json(builtin::STUDY_GUIDE_JSON)?;
        Ok(Self::new(subjects, diagnostic))
    }

    /// Load `<subject>.json` files from `dir`; missing files fall back to builtin data.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(TutorError::Knowledge(format!(
                "knowledge directory {} does not exist",
                dir.display()
            )));
        }
        let mut subjects = Vec::new();
        for subject in Subject::INFORMATION {
            let path = dir.join(format!("{}.json", subject.file_stem()));
            let slice = if path.exists() {
                info!("Loading {} knowledge from {}", subject, path.display());
                SubjectKnowledge::from_json(subject, &fs::read_to_string(&path)?)?
            } else {
                debug!("No {} file in {}, using builtin", subject, dir.display());
                SubjectKnowledge::from_json(subject, builtin::subject_json(subject))?
            };
            subjects.push(slice);
        }
        let guide_path = dir.join(format!("{}.json", Subject::StudyGuide.file_stem()));
        let diagnostic = if guide_path.exists() {
            info!("Loading study guide from {}", guide_path.display());
            DiagnosticKnowledge::from_json(&fs::read_to_string(&guide_path)?)?
        } else {
            DiagnosticKnowledge::from_json(builtin::STUDY_GUIDE_JSON)?
        };
        Ok(Self::new(subjects, diagnostic))
    }

    /// Configured data directory, or the bundled knowledge
    pub fn from_config(config: &KnowledgeConfig) -> Result<Self> {
        match &config.data_dir {
            Some(dir) => Self::load_dir(dir),
            None => Self::builtin(),
        }
    }

    pub fn subject(&self, subject: Subject) -> Option<&SubjectKnowledge> {
        self.subjects.get(&subject)
    }

    pub fn get(&self, subject: Subject, topic_key: &str) -> Option<&KnowledgeRecord> {
        self.subjects.get(&subject).and_then(|s| s.get(topic_key))
    }

    /// Sorted topic keys of an information subject (empty for StudyGuide).
    pub fn list_topics(&self, subject: Subject) -> Vec<String> {
        self.subjects
            .get(&subject)
            .map(|s| s.topic_keys())
            .unwrap_or_default()
    }

    pub fn diagnostic(&self) -> &DiagnosticKnowledge {
        &self.diagnostic
    }

    pub fn total_records(&self) -> usize {
        self.subjects.values().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_loads_every_information_subject() {
        let kb = KnowledgeBase::builtin().unwrap();
        for subject in Subject::INFORMATION {
            assert!(
                kb.list_topics(subject).len() >= 3,
                "{} needs at least three topics",
                subject
            );
        }
        assert!(kb.list_topics(Subject::StudyGuide).is_empty());
        assert!(!kb.diagnostic().categories.is_empty());
    }

    #[test]
    fn test_builtin_photosynthesis_record() {
        let kb = KnowledgeBase::builtin().unwrap();
        let record = kb.get(Subject::Biology, "photosynthesis").unwrap();
        assert_eq!(record.concept, "Photosynthesis");
        assert!(record.explanation.contains("6CO₂ + 6H₂O → C₆H₁₂O₆ + 6O₂"));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let json = r#"{"records": [
            {"topic_key": "atom", "concept": "Atom", "explanation": "x", "topic": "Matter"},
            {"topic_key": "atom", "concept": "Atom", "explanation": "y", "topic": "Matter"}
        ]}"#;
        let err = SubjectKnowledge::from_json(Subject::Chemistry, json).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_subject_mismatch_rejected() {
        let json = r#"{"subject": "Physics", "records": []}"#;
        assert!(SubjectKnowledge::from_json(Subject::Chemistry, json).is_err());
    }

    #[test]
    fn test_load_dir_overrides_one_subject() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("chemistry.json"),
            r#"{"subject": "Chemistry", "records": [
                {"topic_key": "titration", "concept": "Titration", "explanation": "Measured neutralisation.", "topic": "Acids"}
            ]}"#,
        )
        .unwrap();
        let kb = KnowledgeBase::load_dir(dir.path()).unwrap();
        assert_eq!(kb.list_topics(Subject::Chemistry), vec!["titration".to_string()]);
        assert!(kb.get(Subject::Biology, "photosynthesis").is_some());
    }

    #[test]
    fn test_load_dir_missing_dir() {
        assert!(KnowledgeBase::load_dir(Path::new("/nonexistent/tutor-kb")).is_err());
    }
}
