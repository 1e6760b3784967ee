//! Study-guide interview schema: weak areas, their refinement questions, and
//! the free-text matching used to read the learner's answers.

use regex::Regex;
use std::sync::LazyLock;

use crate::engine::Fact;
use crate::text::words_match;

/// One selectable answer to an interview question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
    pub aliases: &'static [&'static str],
}

/// Refinement answer and the primary condition it leads to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refinement {
    pub choice: Choice,
    pub condition: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakArea {
    pub choice: Choice,
    /// Fact slot holding this area's refinement
    pub var: &'static str,
    pub question: &'static str,
    pub refinements: &'static [Refinement],
}

pub const WEAK_AREA_VAR: &str = "weak_area";

pub const WEAK_AREA_QUESTION: &str = "What area of your studies are you finding most difficult: \
math, essay writing, multiple-choice questions, or remembering theory?";

pub const WEAK_AREAS: &[WeakArea] = &[
    WeakArea {
        choice: Choice {
            value: "math",
            label: "math",
            aliases: &["maths", "mathematics", "calculation", "calculations", "formula", "formulas", "equation", "equations", "numbers"],
        },
        var: "math_subject",
        question: "Which subject's math is giving you trouble: physics, chemistry, biology, \
or the math foundations themselves?",
        refinements: &[
            Refinement {
                choice: Choice { value: "physics", label: "physics", aliases: &["phys"] },
                condition: "math_in_physics",
            },
            Refinement {
                choice: Choice { value: "chemistry", label: "chemistry", aliases: &["chem", "moles"] },
                condition: "math_in_chemistry",
            },
            Refinement {
                choice: Choice { value: "biology", label: "biology", aliases: &["bio"] },
                condition: "math_in_biology",
            },
            Refinement {
                choice: Choice {
                    value: "foundations",
                    label: "math foundations",
                    aliases: &["foundation", "basics", "basic", "general", "algebra", "fractions", "everything", "all"],
                },
                condition: "math_foundations",
            },
        ],
    },
    WeakArea {
        choice: Choice {
            value: "essay",
            label: "essay writing",
            aliases: &["essays", "writing", "extended", "written", "long answers"],
        },
        var: "essay_difficulty",
        question: "Which part of essay writing is hardest for you: structure, argument, language, or timing?",
        refinements: &[
            Refinement {
                choice: Choice {
                    value: "structure",
                    label: "structure",
                    aliases: &["structuring", "planning", "plan", "organising", "organizing", "organisation", "organization", "paragraphs"],
                },
                condition: "essay_structure",
            },
            Refinement {
                choice: Choice {
                    value: "argument",
                    label: "argument",
                    aliases: &["arguments", "analysis", "evaluation", "evaluating", "evidence", "reasoning"],
                },
                condition: "essay_argument",
            },
            Refinement {
                choice: Choice {
                    value: "language",
                    label: "language",
                    aliases: &["grammar", "vocabulary", "spelling", "expression", "wording"],
                },
                condition: "essay_language",
            },
            Refinement {
                choice: Choice {
                    value: "timing",
                    label: "timing",
                    aliases: &["time", "slow", "run out of time", "running out of time"],
                },
                condition: "essay_timing",
            },
        ],
    },
    WeakArea {
        choice: Choice {
            value: "mcq",
            label: "multiple-choice questions",
            aliases: &["mcqs", "multiple choice", "multiple-choice", "quiz", "quizzes", "objective"],
        },
        var: "mcq_issue",
        question: "What goes wrong most in multiple-choice questions: time pressure, tricky distractors, \
or gaps in the concepts?",
        refinements: &[
            Refinement {
                choice: Choice {
                    value: "time_pressure",
                    label: "time pressure",
                    aliases: &["time", "timing", "speed", "slow", "running out"],
                },
                condition: "mcq_time_pressure",
            },
            Refinement {
                choice: Choice {
                    value: "distractors",
                    label: "tricky distractors",
                    aliases: &["distractor", "tricky", "confusing", "similar options", "trick questions"],
                },
                condition: "mcq_distractors",
            },
            Refinement {
                choice: Choice {
                    value: "concept_gaps",
                    label: "gaps in the concepts",
                    aliases: &["concepts", "concept", "gaps", "gap", "content"],
                },
                condition: "mcq_concept_gaps",
            },
        ],
    },
    WeakArea {
        choice: Choice {
            value: "theory",
            label: "remembering theory",
            aliases: &["memorizing", "memorising", "remembering", "memory", "recall", "facts", "memorise", "memorize"],
        },
        var: "theory_subject",
        question: "Which subject's theory is hardest to remember: biology, chemistry, or physics?",
        refinements: &[
            Refinement {
                choice: Choice { value: "biology", label: "biology", aliases: &["bio"] },
                condition: "theory_biology",
            },
            Refinement {
                choice: Choice { value: "chemistry", label: "chemistry", aliases: &["chem"] },
                condition: "theory_chemistry",
            },
            Refinement {
                choice: Choice { value: "physics", label: "physics", aliases: &["phys"] },
                condition: "theory_physics",
            },
        ],
    },
];

pub fn weak_area(value: &str) -> Option<&'static WeakArea> {
    WEAK_AREAS.iter().find(|a| a.choice.value == value)
}

pub fn weak_area_choices() -> Vec<Choice> {
    WEAK_AREAS.iter().map(|a| a.choice).collect()
}

/// Every refinement var, in schema order
pub fn refinement_vars() -> impl Iterator<Item = &'static str> {
    WEAK_AREAS.iter().map(|a| a.var)
}

/// Read a free-text answer against `choices`: a menu number, an exact value,
/// label or alias, then any alias mentioned as a word or phrase.
pub fn match_choice(text: &str, choices: &[Choice]) -> Option<Choice> {
    let t = text
        .trim()
        .trim_end_matches(&['.', '!', '?'][..])
        .trim()
        .to_lowercase();
    if t.is_empty() {
        return None;
    }

    if let Ok(n) = t.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| choices.get(i)).copied();
    }

    if let Some(c) = choices
        .iter()
        .find(|c| c.value == t || c.label == t || c.aliases.contains(&t.as_str()))
    {
        return Some(*c);
    }

    let words: Vec<&str> = t
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    choices.iter().copied().find(|c| {
        std::iter::once(c.value)
            .chain(std::iter::once(c.label))
            .chain(c.aliases.iter().copied())
            .any(|term| {
                if term.contains(' ') || term.contains('-') {
                    t.contains(term)
                } else {
                    words.iter().any(|w| words_match(w, term))
                }
            })
    })
}

/// Weak area named outright in a question, if any
pub fn detect_weak_area(text: &str) -> Option<&'static WeakArea> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    WEAK_AREAS.iter().find(|area| {
        std::iter::once(area.choice.value)
            .chain(area.choice.aliases.iter().copied())
            .any(|term| {
                if term.contains(' ') || term.contains('-') {
                    lower.contains(term)
                } else {
                    words.iter().any(|w| words_match(w, term))
                }
            })
    })
}

static SLEEP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\s+(?:of\s+)?sleep").unwrap(),
        Regex::new(r"sleep(?:ing)?\s+(?:only\s+|about\s+|around\s+|for\s+)*(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\b").unwrap(),
    ]
});

static STRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"stress(?:ed)?(?:\s+level)?\s*(?:is|of|at|:|about|around)?\s*(\d{1,2})(?:\s*/\s*10|\s+out\s+of\s+10)?").unwrap()
});

static STUDY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\s+(?:a\s+day\s+|per\s+day\s+|daily\s+)?(?:of\s+)?(?:study|studying|revision|revising)").unwrap(),
        Regex::new(r"(?:study|studying|revise|revising)\s+(?:for\s+|about\s+|around\s+|only\s+)*(\d+(?:\.\d+)?)\s*(?:hours?|hrs?|h)\b").unwrap(),
    ]
});

static EXAM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:exam|exams|test|tests|finals|mocks?)\b").unwrap());

const LEARNING_STYLES: &[(&str, &[&str])] = &[
    ("visual", &["visual", "diagrams", "pictures"]),
    ("auditory", &["auditory", "listening", "podcasts"]),
    ("kinesthetic", &["kinesthetic", "kinaesthetic", "hands-on", "practical"]),
];

fn first_number(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Wellbeing facts mentioned in free text (sleep, stress, study hours,
/// upcoming exam, learning style).
pub fn wellbeing_facts(text: &str) -> Vec<Fact> {
    let lower = text.to_lowercase();
    let mut facts = Vec::new();

    if let Some(hours) = first_number(&SLEEP_PATTERNS, &lower) {
        facts.push(Fact::single("sleep_hours", hours));
    }
    if let Some(level) = STRESS_PATTERN
        .captures(&lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        facts.push(Fact::single("stress_level", level.clamp(0, 10)));
    }
    if let Some(hours) = first_number(&STUDY_PATTERNS, &lower) {
        facts.push(Fact::single("study_hours", hours));
    }
    if EXAM_PATTERN.is_match(&lower) {
        facts.push(Fact::single("has_upcoming_exam", true));
    }
    if let Some((style, _)) = LEARNING_STYLES
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| lower.contains(cue)))
    {
        facts.push(Fact::single("learning_style", *style));
    }
    facts
}
