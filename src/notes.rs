//! Working notes accumulated across a session: intent, assumptions,
//! decisions, and open questions. Models update these incrementally through
//! [`SessionDelta`] objects in their replies; the summary feeds back into the
//! next prompt's Session Context section.

use llm_protocol::{Decision, Question, SessionDelta};

/// An open question the model has since answered.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNote {
    pub question: Question,
    pub answer: String,
}

#[derive(Debug, Default)]
pub struct SessionNotes {
    intent: String,
    assumptions: Vec<String>,
    decisions: Vec<Decision>,
    open_questions: Vec<Question>,
    resolved_questions: Vec<ResolvedNote>,
}

impl SessionNotes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn intent(&self) -> &str {
        &self.intent
    }

    #[must_use]
    pub fn open_questions(&self) -> &[Question] {
        &self.open_questions
    }

    #[must_use]
    pub fn resolved_questions(&self) -> &[ResolvedNote] {
        &self.resolved_questions
    }

    #[must_use]
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    #[must_use]
    pub fn assumptions(&self) -> &[String] {
        &self.assumptions
    }

    /// Folds one reply's delta into the notes.
    ///
    /// Questions and decisions are deduplicated by id; a resolved id moves its
    /// question out of the open list. Entries without an id are dropped as
    /// malformed.
    pub fn apply_delta(&mut self, delta: &SessionDelta) {
        if !delta.intent.trim().is_empty() {
            self.intent = delta.intent.trim().to_string();
        }

        for question in &delta.open_questions {
            if question.id.is_empty() {
                continue;
            }
            let known = self.open_questions.iter().any(|q| q.id == question.id)
                || self
                    .resolved_questions
                    .iter()
                    .any(|r| r.question.id == question.id);
            if !known {
                self.open_questions.push(question.clone());
            }
        }

        for resolved in &delta.resolved_questions {
            if resolved.id.is_empty() {
                continue;
            }
            if let Some(at) = self
                .open_questions
                .iter()
                .position(|q| q.id == resolved.id)
            {
                let question = self.open_questions.remove(at);
                self.resolved_questions.push(ResolvedNote {
                    question,
                    answer: resolved.answer.clone(),
                });
            }
        }

        for decision in &delta.decisions_added {
            if decision.id.is_empty() {
                continue;
            }
            if !self.decisions.iter().any(|d| d.id == decision.id) {
                self.decisions.push(decision.clone());
            }
        }
    }

    /// Records assumptions the model stated alongside a reply, deduplicated
    /// by exact text.
    pub fn add_assumptions<'a>(&mut self, assumptions: impl IntoIterator<Item = &'a String>) {
        for assumption in assumptions {
            let trimmed = assumption.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !self.assumptions.iter().any(|a| a == trimmed) {
                self.assumptions.push(trimmed.to_string());
            }
        }
    }

    /// Compact plain-text summary for the prompt's Session Context section.
    /// Empty when there is nothing worth telling the model.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.intent.is_empty() {
            parts.push(format!("Intent: {}", self.intent));
        }
        if !self.assumptions.is_empty() {
            let mut block = String::from("Assumptions:");
            for assumption in &self.assumptions {
                block.push_str("\n  - ");
                block.push_str(assumption);
            }
            parts.push(block);
        }
        if !self.decisions.is_empty() {
            let mut block = String::from("Decisions:");
            for decision in &self.decisions {
                block.push_str("\n  - ");
                block.push_str(&decision.decision);
            }
            parts.push(block);
        }
        if !self.open_questions.is_empty() {
            let mut block = String::from("Open questions:");
            for question in &self.open_questions {
                block.push_str(&format!("\n  - [{}] {}", question.id, question.question));
            }
            parts.push(block);
        }
        parts.join("\n")
    }

    pub fn clear(&mut self) {
        self.intent.clear();
        self.assumptions.clear();
        self.decisions.clear();
        self.open_questions.clear();
        self.resolved_questions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_protocol::ResolvedQuestion;

    fn question(id: &str, text: &str) -> Question {
        Question {
            id: id.to_string(),
            question: text.to_string(),
            why_needed: String::new(),
        }
    }

    #[test]
    fn delta_sets_intent_and_collects_questions() {
        let mut notes = SessionNotes::new();
        notes.apply_delta(&SessionDelta {
            intent: "author a boot test".to_string(),
            open_questions: vec![question("q1", "which board revision?")],
            ..SessionDelta::default()
        });

        assert_eq!(notes.intent(), "author a boot test");
        assert_eq!(notes.open_questions().len(), 1);

        // Blank intent in a later delta must not erase the stored one.
        notes.apply_delta(&SessionDelta::default());
        assert_eq!(notes.intent(), "author a boot test");
    }

    #[test]
    fn duplicate_and_malformed_questions_are_dropped() {
        let mut notes = SessionNotes::new();
        notes.apply_delta(&SessionDelta {
            open_questions: vec![
                question("q1", "first"),
                question("q1", "first again"),
                question("", "no id"),
            ],
            ..SessionDelta::default()
        });
        assert_eq!(notes.open_questions().len(), 1);
        assert_eq!(notes.open_questions()[0].question, "first");
    }

    #[test]
    fn resolving_moves_a_question_out_of_the_open_list() {
        let mut notes = SessionNotes::new();
        notes.apply_delta(&SessionDelta {
            open_questions: vec![question("q1", "voltage range?")],
            ..SessionDelta::default()
        });
        notes.apply_delta(&SessionDelta {
            resolved_questions: vec![ResolvedQuestion {
                id: "q1".to_string(),
                answer: "3.3V nominal".to_string(),
            }],
            ..SessionDelta::default()
        });

        assert!(notes.open_questions().is_empty());
        assert_eq!(notes.resolved_questions().len(), 1);
        assert_eq!(notes.resolved_questions()[0].answer, "3.3V nominal");

        // Re-asking a resolved question is ignored.
        notes.apply_delta(&SessionDelta {
            open_questions: vec![question("q1", "voltage range?")],
            ..SessionDelta::default()
        });
        assert!(notes.open_questions().is_empty());
    }

    #[test]
    fn decisions_dedupe_by_id() {
        let mut notes = SessionNotes::new();
        let delta = SessionDelta {
            decisions_added: vec![Decision {
                id: "d1".to_string(),
                decision: "use JSON schema v2".to_string(),
                why: String::new(),
            }],
            ..SessionDelta::default()
        };
        notes.apply_delta(&delta);
        notes.apply_delta(&delta);
        assert_eq!(notes.decisions().len(), 1);
    }

    #[test]
    fn summary_lists_each_populated_section() {
        let mut notes = SessionNotes::new();
        notes.apply_delta(&SessionDelta {
            intent: "review the procedure".to_string(),
            open_questions: vec![question("q2", "is step 4 optional?")],
            decisions_added: vec![Decision {
                id: "d1".to_string(),
                decision: "keep imperial units".to_string(),
                why: String::new(),
            }],
            ..SessionDelta::default()
        });
        notes.add_assumptions(&["operator has a multimeter".to_string()]);

        let summary = notes.summary();
        assert!(summary.starts_with("Intent: review the procedure"));
        assert!(summary.contains("Assumptions:\n  - operator has a multimeter"));
        assert!(summary.contains("Decisions:\n  - keep imperial units"));
        assert!(summary.contains("Open questions:\n  - [q2] is step 4 optional?"));
    }

    #[test]
    fn empty_notes_summarize_to_nothing_and_clear_resets() {
        let mut notes = SessionNotes::new();
        assert!(notes.summary().is_empty());

        notes.apply_delta(&SessionDelta {
            intent: "anything".to_string(),
            ..SessionDelta::default()
        });
        notes.clear();
        assert!(notes.summary().is_empty());
        assert!(notes.intent().is_empty());
    }
}
