//! Per-tab LLM session orchestration for the procedure authoring workbench.
//!
//! Invariant: every model outcome, including every failure, is an
//! [`LlmResponse`] value — nothing here panics or returns `Err` across the
//! session boundary for a misbehaving model.
//!
//! # Public API Overview
//! - Drive turns through [`TabSession`]: conditional context inclusion,
//!   transcript and token accounting, contract enforcement, cancellation.
//! - Pick a transport with [`BackendFactory`] / [`BackendSettings`]
//!   (disabled stand-in, shared OpenCode sidecar, or an OpenAI-compatible
//!   HTTP endpoint).
//! - Implement the collaborator seams [`ArtifactStore`] and [`RulesProvider`]
//!   to feed editor content and rule files into prompts.
//! - Shared wire types, the `LlmBackend` trait, prompt assembly, parsing, and
//!   output contracts live in the re-exported `llm_protocol` crate.

pub mod factory;
pub mod history;
pub mod notes;
pub mod session;
pub mod store;

pub use crate::factory::{BackendFactory, BackendKind, BackendSettings};
pub use crate::history::{Message, Role, Transcript};
pub use crate::notes::{ResolvedNote, SessionNotes};
pub use crate::session::TabSession;
pub use crate::store::{ArtifactStore, RuleSelection, RulesProvider};

/// Shared protocol types, re-exported for callers.
pub use llm_protocol::{
    validate_response, ArtifactKind, CancellationSignal, Decision, DisabledBackend, FailureKind,
    LlmBackend, LlmRequest, LlmResponse, LlmTask, PromptBuilder, Proposal, ProposalMode, Question,
    ResolvedQuestion, ResponseParser, SessionDelta, Severity, TabContract, TaskInstructionSource,
    TextPatch, TokenUsage, ValidationIssue, ValidationStatus,
};

/// Backend configuration types, re-exported for settings layers.
pub use llm_backend_external::ExternalApiConfig;
pub use opencode_api::OpencodeConfig;
