//! Bounded conversation memory.
//!
//! Completed turns live in a ring of fixed capacity, oldest evicted first.
//! At most one turn is open at a time; it is only appended to history when
//! completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::error::{Result, TutorError};
use crate::subject::Subject;
use crate::text::sanitize_for_prompt;

/// Question characters kept per turn in classifier context
const QUESTION_PREVIEW_CHARS: usize = 200;

/// A question the tutor asked back, and what the learner replied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub response: Option<String>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub subject: Option<Subject>,
    pub needed_clarification: bool,
    pub clarifications: Vec<Clarification>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Snapshot for `/stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub turns: usize,
    pub capacity: usize,
    pub open_turn: bool,
    pub clarified_turns: usize,
    pub by_subject: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    current: Option<ConversationTurn>,
    capacity: usize,
    preview_chars: usize,
}

impl ConversationMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            current: None,
            capacity,
            preview_chars: config.answer_preview_chars,
        }
    }

    /// Open a turn. A turn still open is abandoned first.
    pub fn start_turn(&mut self, question: &str) -> Uuid {
        if let Some(open) = self.current.take() {
            warn!(turn = %open.id, "starting a turn while another is open, abandoning it");
        }
        let turn = ConversationTurn {
            id: Uuid::new_v4(),
            question: question.to_string(),
            answer: None,
            subject: None,
            needed_clarification: false,
            clarifications: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        };
        let id = turn.id;
        self.current = Some(turn);
        id
    }

    /// Attach a clarification exchange to the open turn. False if none is open.
    pub fn add_clarification_to_current(&mut self, question: &str, response: Option<&str>) -> bool {
        match self.current.as_mut() {
            Some(turn) => {
                turn.clarifications.push(Clarification {
                    question: question.to_string(),
                    response: response.map(str::to_string),
                    ts: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Close the open turn and append it to history, evicting the oldest turn
    /// past capacity.
    pub fn complete_turn(
        &mut self,
        answer: &str,
        subject: Option<Subject>,
        needed_clarification: bool,
    ) -> Result<&ConversationTurn> {
        let mut turn = self
            .current
            .take()
            .ok_or_else(|| TutorError::Invariant("no open turn to complete".to_string()))?;
        if needed_clarification && turn.clarifications.is_empty() {
            return Err(TutorError::Invariant(format!(
                "turn {} marked as clarified without a clarification",
                turn.id
            )));
        }
        turn.answer = Some(answer.to_string());
        turn.subject = subject;
        turn.needed_clarification = needed_clarification;
        turn.completed_at = Some(Utc::now());
        debug!(turn = %turn.id, subject = ?subject, "turn completed");

        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
        self.turns
            .back()
            .ok_or_else(|| TutorError::Invariant("history empty after append".to_string()))
    }

    /// Drop the open turn without recording it
    pub fn abandon_current_turn(&mut self) -> Option<ConversationTurn> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&ConversationTurn> {
        self.current.as_ref()
    }

    /// Whether the open turn carries any clarification exchange
    pub fn current_has_clarifications(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|t| !t.clarifications.is_empty())
    }

    /// Last `n` completed turns, oldest first
    pub fn recent(&self, n: usize) -> Vec<&ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Recent turns flattened for the classifier prompt. Each turn is one
    /// sanitized line; answers are cut to the preview length.
    pub fn context_for_classifier(&self, n: usize) -> String {
        self.recent(n)
            .iter()
            .map(|t| {
                let subject = t.subject.map(|s| s.as_str()).unwrap_or("none");
                let answer = t.answer.as_deref().unwrap_or("");
                format!(
                    "Q: {} | subject: {} | A: {}",
                    sanitize_for_prompt(&t.question, QUESTION_PREVIEW_CHARS),
                    subject,
                    sanitize_for_prompt(answer, self.preview_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.current = None;
    }

    pub fn stats(&self) -> MemoryStats {
        let mut by_subject = BTreeMap::new();
        for turn in &self.turns {
            let key = turn.subject.map(|s| s.as_str()).unwrap_or("none");
            *by_subject.entry(key.to_string()).or_insert(0) += 1;
        }
        MemoryStats {
            turns: self.turns.len(),
            capacity: self.capacity,
            open_turn: self.current.is_some(),
            clarified_turns: self.turns.iter().filter(|t| t.needed_clarification).count(),
            by_subject,
        }
    }

    /// Checked by the orchestrator after every query
    pub fn check_invariants(&self) -> Result<()> {
        if self.turns.len() > self.capacity {
            return Err(TutorError::Invariant(format!(
                "memory holds {} turns, capacity {}",
                self.turns.len(),
                self.capacity
            )));
        }
        if let Some(turn) = self
            .turns
            .iter()
            .find(|t| t.needed_clarification && t.clarifications.is_empty())
        {
            return Err(TutorError::Invariant(format!(
                "turn {} needed clarification but recorded none",
                turn.id
            )));
        }
        Ok(())
    }
}
