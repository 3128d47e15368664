//! One turn's worth of input, computed fresh by the session per send.

use crate::tasks::{ArtifactKind, LlmTask};

/// Everything the prompt assembler needs for a single turn.
///
/// Artifact fields are `Some` only when the session decided the snapshot must
/// be (re-)sent this turn; `None` means "the provider already has it".
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub task: LlmTask,
    /// Strict mode lets the model refuse and ask questions; force mode
    /// demands output with documented assumptions.
    pub strict_mode: bool,

    pub procedure_text: Option<String>,
    pub procedure_json: Option<String>,
    pub test_code: Option<String>,

    pub rules: Option<String>,
    pub session_summary: String,
    pub user_message: String,

    /// Tab/task contract text appended after the output format.
    pub output_contract: Option<String>,
}

impl LlmRequest {
    #[must_use]
    pub fn new(task: LlmTask) -> Self {
        Self {
            task,
            strict_mode: true,
            procedure_text: None,
            procedure_json: None,
            test_code: None,
            rules: None,
            session_summary: String::new(),
            user_message: String::new(),
            output_contract: None,
        }
    }

    #[must_use]
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, kind: ArtifactKind, content: impl Into<String>) -> Self {
        let slot = match kind {
            ArtifactKind::ProcedureText => &mut self.procedure_text,
            ArtifactKind::ProcedureJson => &mut self.procedure_json,
            ArtifactKind::TestCode => &mut self.test_code,
        };
        *slot = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    #[must_use]
    pub fn with_session_summary(mut self, summary: impl Into<String>) -> Self {
        self.session_summary = summary.into();
        self
    }

    #[must_use]
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    #[must_use]
    pub fn with_output_contract(mut self, contract: impl Into<String>) -> Self {
        self.output_contract = Some(contract.into());
        self
    }

    #[must_use]
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&str> {
        let slot = match kind {
            ArtifactKind::ProcedureText => &self.procedure_text,
            ArtifactKind::ProcedureJson => &self.procedure_json,
            ArtifactKind::TestCode => &self.test_code,
        };
        slot.as_deref()
    }

    /// Kinds whose snapshot is carried in this request.
    #[must_use]
    pub fn included_kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.artifact(*kind).is_some())
            .collect()
    }
}
