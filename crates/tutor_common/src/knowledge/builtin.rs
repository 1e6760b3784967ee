//! Knowledge files bundled into the binary.
//! A `knowledge.data_dir` can override any subject.

use crate::subject::Subject;

pub const BIOLOGY_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/biology.json"));
pub const PHYSICS_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/physics.json"));
pub const CHEMISTRY_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/chemistry.json"));
pub const STUDY_GUIDE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/study_guide.json"));

/// Bundled JSON for an information subject. StudyGuide maps to the schema file.
pub fn subject_json(subject: Subject) -> &'static str {
    match subject {
        Subject::Biology => BIOLOGY_JSON,
        Subject::Physics => PHYSICS_JSON,
        Subject::Chemistry => CHEMISTRY_JSON,
        Subject::StudyGuide => STUDY_GUIDE_JSON,
    }
}
