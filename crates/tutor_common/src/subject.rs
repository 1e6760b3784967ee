//! Subject enumeration shared by the classifier, experts and the wire format.
//!
//! Wire names are case-sensitive: `Biology | Physics | Chemistry | StudyGuide`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Subject {
    Biology,
    Physics,
    Chemistry,
    StudyGuide,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Biology,
        Subject::Physics,
        Subject::Chemistry,
        Subject::StudyGuide,
    ];

    /// Subjects answered by an information expert.
    pub const INFORMATION: [Subject; 3] = [Subject::Biology, Subject::Physics, Subject::Chemistry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Biology => "Biology",
            Self::Physics => "Physics",
            Self::Chemistry => "Chemistry",
            Self::StudyGuide => "StudyGuide",
        }
    }

    /// Human label used in prompts and clarification menus
    pub fn label(&self) -> &'static str {
        match self {
            Self::StudyGuide => "Study Guide",
            other => other.as_str(),
        }
    }

    /// Knowledge file stem (`biology.json`, `study_guide.json`)
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Biology => "biology",
            Self::Physics => "physics",
            Self::Chemistry => "chemistry",
            Self::StudyGuide => "study_guide",
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::StudyGuide)
    }

    /// Exact wire-name lookup. Anything else is unknown.
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|sub| sub.as_str() == s)
    }

    /// Lenient lookup for a user typing a subject name in reply to a menu.
    pub fn parse_choice(s: &str) -> Option<Self> {
        let t = s.trim().trim_end_matches(&['.', '!', '?'][..]).to_lowercase();
        match t.as_str() {
            "biology" | "bio" => Some(Self::Biology),
            "physics" | "phys" => Some(Self::Physics),
            "chemistry" | "chem" => Some(Self::Chemistry),
            "studyguide" | "study guide" | "study_guide" | "study" | "studying" => {
                Some(Self::StudyGuide)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
