mod support;

use support::{harness, reply_proposing};
use workbench_llm::{ArtifactKind, FailureKind, LlmTask, Proposal, ProposalMode, TabContract};

#[tokio::test]
async fn forbidden_proposal_fails_the_turn_and_nothing_is_recorded() {
    let h = harness(
        TabContract::TextJson,
        vec![reply_proposing(ArtifactKind::TestCode, "def test(): pass")],
    );
    h.artifacts.set(ArtifactKind::ProcedureText, "1. Power on.");

    let response = h
        .session
        .send(LlmTask::ReviewTextProcedure, None, true)
        .await;

    assert!(!response.success);
    assert_eq!(response.failure_kind, Some(FailureKind::ContractViolation));
    assert!(response.error_message.contains("Output contract violation"));
    assert!(response.error_message.contains("test_code"));
    // The offending proposal survives for the raw-response view.
    assert!(response.test_code.is_some());
    // Failed turns record nothing and leave first-interaction in place.
    assert_eq!(h.session.message_count(), 0);
    assert!(h.session.is_first_interaction());
}

#[tokio::test]
async fn generating_code_must_not_also_propose_json() {
    let mut reply = reply_proposing(ArtifactKind::TestCode, "def test(): pass");
    reply.procedure_json = Some(Proposal {
        mode: ProposalMode::Replace,
        content: serde_json::json!({"steps": []}),
    });
    let h = harness(TabContract::JsonCode, vec![reply]);
    h.artifacts
        .set(ArtifactKind::ProcedureJson, "{\"steps\": []}");

    let response = h
        .session
        .send(LlmTask::GenerateCodeFromJson, None, true)
        .await;

    // Both kinds are allowed on the tab, but the task expects code only.
    assert!(!response.success);
    assert_eq!(response.failure_kind, Some(FailureKind::ContractViolation));
    assert!(response.error_message.contains("Task contract violation"));
    assert!(response
        .error_message
        .contains("'generate_code_from_json'"));
}

#[tokio::test]
async fn expected_proposal_passes_and_is_recorded() {
    let h = harness(
        TabContract::JsonCode,
        vec![reply_proposing(ArtifactKind::TestCode, "def test(): pass")],
    );
    h.artifacts
        .set(ArtifactKind::ProcedureJson, "{\"steps\": []}");

    let response = h
        .session
        .send(LlmTask::GenerateCodeFromJson, None, true)
        .await;

    assert!(response.success);
    assert_eq!(response.proposed_kinds(), vec![ArtifactKind::TestCode]);
    assert_eq!(h.session.message_count(), 1);
}

#[tokio::test]
async fn record_response_validates_externally_executed_turns() {
    let h = harness(TabContract::JsonCode, Vec::new());

    let mut response = reply_proposing(ArtifactKind::ProcedureJson, "{\"steps\": []}");
    response.task = Some(LlmTask::GenerateCodeFromJson);
    h.session.record_response(&mut response);

    assert!(!response.success);
    assert_eq!(response.failure_kind, Some(FailureKind::ContractViolation));
    assert_eq!(h.session.message_count(), 0);
}
