//! Backend transport trait and the always-on disabled stand-in.

use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::request::LlmRequest;
use crate::response::{FailureKind, LlmResponse};

/// Shared flag a caller trips to abort an in-flight turn.
pub type CancellationSignal = Arc<AtomicBool>;

/// One concrete way to get a prompt answered.
///
/// Implementations never panic and never return `Err` for a turn going wrong;
/// every outcome of [`send`](LlmBackend::send) is an [`LlmResponse`], failed
/// or not. Lifecycle failures surface the same way on the next `send`, so
/// `start` and `is_available` report plain bools and log the detail.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Human-readable backend name for logs and the transcript.
    fn name(&self) -> &str;

    /// Whether this backend is configured well enough to try starting.
    async fn is_available(&self) -> bool;

    /// Brings the backend up (spawning or attaching as needed). Idempotent.
    async fn start(&self) -> bool;

    /// Tears down whatever `start` brought up. Idempotent.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    /// Runs one turn. Checks the cancellation flag around the blocking call
    /// and returns a cancelled response instead of partial work.
    async fn send(&self, request: &LlmRequest) -> LlmResponse;

    /// Trips the cancellation flag for the in-flight turn, if any.
    fn cancel(&self);

    /// Drops provider-side conversation state, if the backend keeps any.
    /// Stateless backends accept the default no-op.
    async fn reset_session(&self) -> bool {
        true
    }
}

/// Stand-in used when no real backend is configured. Never touches the
/// network; every send fails with instructions to configure one.
#[derive(Debug, Default)]
pub struct DisabledBackend;

impl DisabledBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> bool {
        true
    }

    async fn stop(&self) {}

    fn is_running(&self) -> bool {
        false
    }

    async fn send(&self, _request: &LlmRequest) -> LlmResponse {
        let mut response = LlmResponse::failure(
            FailureKind::TransportUnavailable,
            "LLM backend is disabled. Enable it in Settings -> LLM Backend.",
        );
        response.assistant_message =
            "LLM backend is disabled. Please configure it in Settings.".to_string();
        response
    }

    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::LlmTask;

    #[tokio::test]
    async fn disabled_backend_fails_every_send_without_io() {
        let backend = DisabledBackend::new();
        assert!(backend.is_available().await);
        assert!(backend.start().await);
        assert!(!backend.is_running());

        let response = backend.send(&LlmRequest::new(LlmTask::AdHocChat)).await;
        assert!(!response.success);
        assert_eq!(response.failure_kind, Some(FailureKind::TransportUnavailable));
        assert!(!response.assistant_message.is_empty());
    }
}
