//! Output contracts: which artifact kinds a tab and a task may propose.

use crate::response::{FailureKind, LlmResponse};
use crate::tasks::{ArtifactKind, LlmTask};

const TEXT_JSON_CONTRACT: &str = "## Output Contract for Text-JSON Tab

You are operating in the TEXT-JSON workflow context. Your responses MUST follow these rules:

**Allowed Proposals:**
- procedure_text: Textual description of the test procedure
- procedure_json: Structured JSON representation

**FORBIDDEN Proposals:**
- test_code: You MUST NOT generate Python test code in this context

**Validation Rules:**
- You may propose procedure_text OR procedure_json OR both
- Set proposal.mode to \"create\", \"replace\", or null (no proposal)
- If you propose test_code, the response will be REJECTED as invalid

This contract ensures you stay focused on text and JSON artifacts only.";

const JSON_CODE_CONTRACT: &str = "## Output Contract for JSON-Code Tab

You are operating in the JSON-CODE workflow context. Your responses MUST follow these rules:

**Allowed Proposals:**
- procedure_json: Structured JSON representation
- test_code: Python test code implementation

**FORBIDDEN Proposals:**
- procedure_text: You MUST NOT generate textual procedure descriptions in this context

**Validation Rules:**
- You may propose procedure_json OR test_code OR both
- Set proposal.mode to \"create\", \"replace\", or null (no proposal)
- If you propose procedure_text, the response will be REJECTED as invalid

This contract ensures you stay focused on JSON and code artifacts only.";

/// A tab's fixed allowed-artifact set plus its prompt-facing contract text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabContract {
    /// Narrative text and structured JSON; code is forbidden.
    TextJson,
    /// Structured JSON and test code; narrative text is forbidden.
    JsonCode,
}

impl TabContract {
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::TextJson => "text_json",
            Self::JsonCode => "json_code",
        }
    }

    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "text_json" => Some(Self::TextJson),
            "json_code" => Some(Self::JsonCode),
            _ => None,
        }
    }

    /// Kinds this tab permits the model to propose.
    #[must_use]
    pub fn allowed_kinds(self) -> &'static [ArtifactKind] {
        match self {
            Self::TextJson => &[ArtifactKind::ProcedureText, ArtifactKind::ProcedureJson],
            Self::JsonCode => &[ArtifactKind::ProcedureJson, ArtifactKind::TestCode],
        }
    }

    /// Contract text appended to the prompt as its final section.
    #[must_use]
    pub fn contract_text(self) -> &'static str {
        match self {
            Self::TextJson => TEXT_JSON_CONTRACT,
            Self::JsonCode => JSON_CODE_CONTRACT,
        }
    }
}

/// Enforces both contract levels on a parsed response, tab level first.
///
/// A tab-level violation fails the response and skips the task-level check. A
/// task-level check runs only when the task has a fixed expected set; open
/// ended tasks defer to the tab contract alone. Proposal content is never
/// touched, only the success and error fields.
pub fn validate_response(response: &mut LlmResponse, tab: TabContract, task: Option<LlmTask>) {
    let proposed: Vec<ArtifactKind> = ArtifactKind::ALL
        .into_iter()
        .filter(|kind| response.proposal_for(*kind).is_some())
        .collect();

    let allowed = tab.allowed_kinds();
    let tab_violations: Vec<ArtifactKind> = proposed
        .iter()
        .copied()
        .filter(|kind| !allowed.contains(kind))
        .collect();
    if !tab_violations.is_empty() {
        log::warn!(
            "tab '{}' contract violation, forbidden proposals: {}",
            tab.id(),
            kind_list(&tab_violations)
        );
        response.fail_with(
            FailureKind::ContractViolation,
            format!(
                "Output contract violation: This tab ({}) does not allow proposals for: {}. \
                 Allowed artifacts: {}. \
                 Please check the Raw Response tab for the full LLM output.",
                tab.id(),
                kind_list(&tab_violations),
                kind_list(allowed)
            ),
        );
        return;
    }

    let Some(task) = task else { return };
    let Some(expected) = task.expected_outputs() else {
        return;
    };

    let task_violations: Vec<ArtifactKind> = proposed
        .iter()
        .copied()
        .filter(|kind| !expected.contains(kind))
        .collect();
    if !task_violations.is_empty() {
        log::warn!(
            "task '{task}' contract violation, unexpected proposals: {}, expected: {}",
            kind_list(&task_violations),
            kind_list(expected)
        );
        response.fail_with(
            FailureKind::ContractViolation,
            format!(
                "Task contract violation: The task '{task}' should only produce {expected_list}, \
                 but the LLM proposed: {violations}. Expected artifacts: {expected_list}. \
                 This may indicate the LLM misunderstood the task. \
                 Please check the Raw Response tab and consider re-running the task.",
                expected_list = kind_list(expected),
                violations = kind_list(&task_violations),
            ),
        );
    }
}

fn kind_list(kinds: &[ArtifactKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Proposal, ProposalMode};
    use serde_json::json;

    fn response_proposing(kinds: &[ArtifactKind]) -> LlmResponse {
        let mut response = LlmResponse {
            success: true,
            ..LlmResponse::default()
        };
        for kind in kinds {
            let proposal = Some(Proposal {
                mode: ProposalMode::Replace,
                content: match kind {
                    ArtifactKind::ProcedureJson => json!({"name": "t", "steps": []}),
                    _ => json!("content"),
                },
            });
            match kind {
                ArtifactKind::ProcedureText => response.procedure_text = proposal,
                ArtifactKind::ProcedureJson => response.procedure_json = proposal,
                ArtifactKind::TestCode => response.test_code = proposal,
            }
        }
        response
    }

    #[test]
    fn forbidden_kind_fails_at_tab_level_and_names_it() {
        let mut response = response_proposing(&[ArtifactKind::TestCode]);
        validate_response(&mut response, TabContract::TextJson, Some(LlmTask::AdHocChat));
        assert!(!response.success);
        assert_eq!(response.failure_kind, Some(FailureKind::ContractViolation));
        assert!(response.error_message.contains("test_code"));
        assert!(response.error_message.contains("text_json"));
        assert!(response.error_message.contains("procedure_text, procedure_json"));
    }

    #[test]
    fn allowed_and_expected_kinds_pass_untouched() {
        let mut response = response_proposing(&[ArtifactKind::TestCode]);
        let before = response.test_code.clone();
        validate_response(
            &mut response,
            TabContract::JsonCode,
            Some(LlmTask::GenerateCodeFromJson),
        );
        assert!(response.success);
        assert!(response.error_message.is_empty());
        assert_eq!(response.test_code, before);
    }

    #[test]
    fn unexpected_kind_fails_at_task_level_even_when_tab_allows_it() {
        // Tab allows json and code; the task expects only code.
        let mut response = response_proposing(&[ArtifactKind::ProcedureJson, ArtifactKind::TestCode]);
        validate_response(
            &mut response,
            TabContract::JsonCode,
            Some(LlmTask::GenerateCodeFromJson),
        );
        assert!(!response.success);
        assert_eq!(response.failure_kind, Some(FailureKind::ContractViolation));
        assert!(response.error_message.contains("Task contract violation"));
        assert!(response.error_message.contains("procedure_json"));
        // Proposal content survives validation.
        assert!(response.procedure_json.is_some());
        assert!(response.test_code.is_some());
    }

    #[test]
    fn open_ended_task_defers_to_the_tab_contract() {
        let mut response = response_proposing(&[ArtifactKind::ProcedureText]);
        validate_response(&mut response, TabContract::TextJson, Some(LlmTask::AdHocChat));
        assert!(response.success);
    }

    #[test]
    fn tab_level_violation_skips_the_task_level_message() {
        let mut response = response_proposing(&[ArtifactKind::ProcedureText]);
        validate_response(
            &mut response,
            TabContract::JsonCode,
            Some(LlmTask::GenerateCodeFromJson),
        );
        assert!(!response.success);
        assert!(response.error_message.starts_with("Output contract violation"));
    }

    #[test]
    fn responses_without_proposals_always_pass() {
        let mut response = LlmResponse {
            success: true,
            ..LlmResponse::default()
        };
        validate_response(&mut response, TabContract::TextJson, Some(LlmTask::ReviewJson));
        assert!(response.success);
    }

    #[test]
    fn tab_ids_round_trip() {
        for tab in [TabContract::TextJson, TabContract::JsonCode] {
            assert_eq!(TabContract::from_id(tab.id()), Some(tab));
        }
        assert_eq!(TabContract::from_id("graph_tab"), None);
    }
}
