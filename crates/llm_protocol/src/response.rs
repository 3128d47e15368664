//! Structured result of one LLM turn.
//!
//! Every outcome, including every failure, is an [`LlmResponse`] value. Nothing
//! in this crate panics or returns `Err` across the session boundary for a
//! model misbehaving; callers branch on `success` and [`FailureKind`].

use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::tasks::{ArtifactKind, LlmTask};
use crate::usage::TokenUsage;

/// Why a turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Backend was never started or is configured off.
    TransportUnavailable,
    Timeout,
    NetworkError,
    /// Provider reported a rate limit. The bundled HTTP backend retries 429s
    /// itself and escalates an exhausted budget to `NetworkError`; this kind
    /// is for backends without their own retry loop.
    RateLimited,
    /// Transport call succeeded but returned zero-length text.
    EmptyResponse,
    /// Provider signalled that the conversation no longer fits its window.
    ContextExceeded,
    /// No JSON object could be extracted, or the extracted object was unusable.
    ParseFailure,
    /// Reply proposed artifact kinds the tab or task does not allow.
    ContractViolation,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TransportUnavailable => "transport unavailable",
            Self::Timeout => "timeout",
            Self::NetworkError => "network error",
            Self::RateLimited => "rate limited",
            Self::EmptyResponse => "empty response",
            Self::ContextExceeded => "context length exceeded",
            Self::ParseFailure => "parse failure",
            Self::ContractViolation => "contract violation",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// How a proposal wants to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalMode {
    Replace,
    Patch,
}

impl ProposalMode {
    /// Lenient wire parse. Models occasionally say "create" when they mean a
    /// full replacement; anything else unrecognized reads as "no proposal".
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "replace" | "create" => Some(Self::Replace),
            "patch" => Some(Self::Patch),
            _ => None,
        }
    }
}

/// A candidate change to one artifact, not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub mode: ProposalMode,
    /// JSON object for structured artifacts, string for text and code.
    pub content: Value,
}

impl Proposal {
    /// True when the content is actually usable: a non-blank string or an
    /// object. Anything else (null, number, array) is noise.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match &self.content {
            Value::String(text) => !text.trim().is_empty(),
            Value::Object(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Warning
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pass,
    Warn,
    Fail,
}

/// One finding reported by the model under `validation.issues`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationIssue {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub suggested_fix: String,
}

/// A line-range edit suggested for the narrative text artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextPatch {
    #[serde(default)]
    pub line_start: u32,
    #[serde(default)]
    pub line_end: u32,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub proposed: String,
    #[serde(default)]
    pub reason: String,
}

/// A question the model wants answered before it can proceed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub why_needed: String,
}

/// A previously open question the model now considers settled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolvedQuestion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub answer: String,
}

/// A decision the model recorded during this turn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub why: String,
}

/// Incremental updates to the per-session working notes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionDelta {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub open_questions: Vec<Question>,
    #[serde(default)]
    pub resolved_questions: Vec<ResolvedQuestion>,
    #[serde(default)]
    pub decisions_added: Vec<Decision>,
}

impl SessionDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intent.is_empty()
            && self.open_questions.is_empty()
            && self.resolved_questions.is_empty()
            && self.decisions_added.is_empty()
    }
}

/// The full outcome of one turn, success or failure.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Raw transport text, kept for debugging.
    pub raw_text: String,

    pub success: bool,
    pub failure_kind: Option<FailureKind>,
    pub error_message: String,

    pub task: Option<LlmTask>,
    pub strict_mode: bool,

    pub usage: TokenUsage,

    /// Always shown in the transcript, even on failure.
    pub assistant_message: String,

    pub validation_status: Option<ValidationStatus>,
    pub issues: Vec<ValidationIssue>,
    pub assumptions: Vec<String>,

    pub procedure_text: Option<Proposal>,
    pub procedure_json: Option<Proposal>,
    pub test_code: Option<Proposal>,
    pub text_patches: Vec<TextPatch>,

    pub session_delta: Option<SessionDelta>,
}

impl LlmResponse {
    /// A failed response carrying only a reason.
    #[must_use]
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            failure_kind: Some(kind),
            error_message: message.into(),
            ..Self::default()
        }
    }

    /// Marks an otherwise-built response as failed without touching its
    /// proposals or transcript fields.
    pub fn fail_with(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.success = false;
        self.failure_kind = Some(kind);
        self.error_message = message.into();
    }

    #[must_use]
    pub fn proposal_for(&self, kind: ArtifactKind) -> Option<&Proposal> {
        match kind {
            ArtifactKind::ProcedureText => self.procedure_text.as_ref(),
            ArtifactKind::ProcedureJson => self.procedure_json.as_ref(),
            ArtifactKind::TestCode => self.test_code.as_ref(),
        }
    }

    /// Kinds for which this response carries a usable proposal.
    #[must_use]
    pub fn proposed_kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| {
                self.proposal_for(*kind)
                    .is_some_and(|proposal| proposal.is_valid())
            })
            .collect()
    }

    #[must_use]
    pub fn has_proposals(&self) -> bool {
        !self.proposed_kinds().is_empty() || !self.text_patches.is_empty()
    }

    #[must_use]
    pub fn context_exceeded(&self) -> bool {
        self.failure_kind == Some(FailureKind::ContextExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_string_proposal_is_not_valid() {
        let proposal = Proposal {
            mode: ProposalMode::Replace,
            content: json!("   \n"),
        };
        assert!(!proposal.is_valid());

        let proposal = Proposal {
            mode: ProposalMode::Replace,
            content: json!("step 1: power on"),
        };
        assert!(proposal.is_valid());
    }

    #[test]
    fn object_proposal_is_valid_and_arrays_are_not() {
        let object = Proposal {
            mode: ProposalMode::Patch,
            content: json!({"steps": []}),
        };
        assert!(object.is_valid());

        let array = Proposal {
            mode: ProposalMode::Patch,
            content: json!([1, 2]),
        };
        assert!(!array.is_valid());
    }

    #[test]
    fn create_reads_as_replace_and_junk_reads_as_nothing() {
        assert_eq!(ProposalMode::from_wire("create"), Some(ProposalMode::Replace));
        assert_eq!(ProposalMode::from_wire("replace"), Some(ProposalMode::Replace));
        assert_eq!(ProposalMode::from_wire("patch"), Some(ProposalMode::Patch));
        assert_eq!(ProposalMode::from_wire("append"), None);
        assert_eq!(ProposalMode::from_wire(""), None);
    }

    #[test]
    fn proposed_kinds_skips_invalid_proposals() {
        let mut response = LlmResponse::default();
        response.test_code = Some(Proposal {
            mode: ProposalMode::Replace,
            content: json!("print('ok')"),
        });
        response.procedure_json = Some(Proposal {
            mode: ProposalMode::Replace,
            content: json!(null),
        });
        assert_eq!(response.proposed_kinds(), vec![ArtifactKind::TestCode]);
        assert!(response.has_proposals());
    }

    #[test]
    fn failure_constructor_sets_kind_and_message() {
        let response = LlmResponse::failure(FailureKind::Timeout, "request timed out after 120s");
        assert!(!response.success);
        assert_eq!(response.failure_kind, Some(FailureKind::Timeout));
        assert_eq!(response.error_message, "request timed out after 120s");
        assert!(!response.context_exceeded());
    }

    #[test]
    fn session_delta_tolerates_sparse_wire_objects() {
        let delta: SessionDelta = serde_json::from_value(json!({
            "intent": "author a power-on test",
            "open_questions": [{"question": "which board revision?"}]
        }))
        .unwrap();
        assert_eq!(delta.intent, "author a power-on test");
        assert_eq!(delta.open_questions.len(), 1);
        assert_eq!(delta.open_questions[0].question, "which board revision?");
        assert!(delta.resolved_questions.is_empty());
        assert!(!delta.is_empty());
    }
}
