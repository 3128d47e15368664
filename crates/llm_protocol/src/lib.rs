//! Shared LLM turn contract for the procedure authoring workbench.
//!
//! This crate owns everything a backend transport and the per-tab session
//! orchestrator must agree on: the closed task registry, request/response
//! shapes, the backend trait, prompt assembly, defensive reply parsing, and
//! output-contract enforcement. It intentionally contains no transport code
//! and no UI coupling.

pub mod backend;
pub mod contracts;
pub mod parse;
pub mod prompt;
pub mod request;
pub mod response;
pub mod tasks;
pub mod usage;

pub use backend::{CancellationSignal, DisabledBackend, LlmBackend};
pub use contracts::{validate_response, TabContract};
pub use parse::ResponseParser;
pub use prompt::{PromptBuilder, TaskInstructionSource, DEFAULT_OUTPUT_FORMAT};
pub use request::LlmRequest;
pub use response::{
    Decision, FailureKind, LlmResponse, Proposal, ProposalMode, Question, ResolvedQuestion,
    SessionDelta, Severity, TextPatch, ValidationIssue, ValidationStatus,
};
pub use tasks::{ArtifactKind, LlmTask};
pub use usage::TokenUsage;
