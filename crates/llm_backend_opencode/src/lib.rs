//! [`LlmBackend`] adapter over the OpenCode sidecar transport.
//!
//! The server process is shared across all backend instances; each instance
//! owns one conversation session against it, so tabs never share provider
//! history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use llm_protocol::{
    CancellationSignal, FailureKind, LlmBackend, LlmRequest, LlmResponse, PromptBuilder,
    ResponseParser, TokenUsage,
};
use opencode_api::{OpencodeApiError, OpencodeClient, SidecarServer};

const SESSION_TITLE: &str = "Procedure Workbench";

/// Transport seam so tests can run the backend without a real server.
#[async_trait]
trait SidecarTransport: Send + Sync {
    async fn server_available(&self) -> bool;
    async fn start_server(&self) -> bool;
    async fn server_running(&self) -> bool;
    async fn create_session(&self) -> Result<String, OpencodeApiError>;
    async fn send(
        &self,
        session_id: &str,
        prompt: &str,
        cancellation: &CancellationSignal,
    ) -> Result<String, OpencodeApiError>;
}

struct DefaultTransport {
    server: Arc<SidecarServer>,
    client: OpencodeClient,
}

impl DefaultTransport {
    fn new(server: Arc<SidecarServer>) -> Result<Self, OpencodeApiError> {
        let client = OpencodeClient::new(server.config().clone())?;
        Ok(Self { server, client })
    }
}

#[async_trait]
impl SidecarTransport for DefaultTransport {
    async fn server_available(&self) -> bool {
        self.server.is_available().await
    }

    async fn start_server(&self) -> bool {
        self.server.start().await
    }

    async fn server_running(&self) -> bool {
        self.server.is_running().await
    }

    async fn create_session(&self) -> Result<String, OpencodeApiError> {
        self.client.create_session(SESSION_TITLE).await
    }

    async fn send(
        &self,
        session_id: &str,
        prompt: &str,
        cancellation: &CancellationSignal,
    ) -> Result<String, OpencodeApiError> {
        self.client
            .send_message(session_id, prompt, Some(cancellation))
            .await
    }
}

/// Backend that answers prompts through a shared OpenCode sidecar server.
pub struct OpencodeBackend {
    transport: Arc<dyn SidecarTransport>,
    prompt_builder: PromptBuilder,
    parser: ResponseParser,
    session_id: Mutex<Option<String>>,
    cancel_requested: CancellationSignal,
    running: AtomicBool,
}

impl OpencodeBackend {
    pub fn new(
        server: Arc<SidecarServer>,
        prompt_builder: PromptBuilder,
    ) -> Result<Self, OpencodeApiError> {
        Ok(Self::with_transport(
            Arc::new(DefaultTransport::new(server)?),
            prompt_builder,
        ))
    }

    fn with_transport(transport: Arc<dyn SidecarTransport>, prompt_builder: PromptBuilder) -> Self {
        Self {
            transport,
            prompt_builder,
            parser: ResponseParser::new(),
            session_id: Mutex::new(None),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    fn map_transport_error(error: OpencodeApiError) -> LlmResponse {
        let kind = match &error {
            OpencodeApiError::Cancelled => FailureKind::Cancelled,
            OpencodeApiError::ContextExceeded => FailureKind::ContextExceeded,
            OpencodeApiError::EmptyBody => FailureKind::EmptyResponse,
            error if error.is_timeout() => FailureKind::Timeout,
            _ => FailureKind::NetworkError,
        };
        let message = match kind {
            FailureKind::Cancelled => "Request cancelled".to_string(),
            FailureKind::Timeout => "Request timed out".to_string(),
            _ => error.to_string(),
        };
        LlmResponse::failure(kind, message)
    }
}

#[async_trait]
impl LlmBackend for OpencodeBackend {
    fn name(&self) -> &str {
        "OpenCode (sidecar)"
    }

    async fn is_available(&self) -> bool {
        self.transport.server_available().await
    }

    async fn start(&self) -> bool {
        if self.running.load(Ordering::Acquire) && self.transport.server_running().await {
            return true;
        }
        if !self.transport.start_server().await {
            return false;
        }
        match self.transport.create_session().await {
            Ok(session_id) => {
                *self.session_id.lock().await = Some(session_id);
                self.running.store(true, Ordering::Release);
                true
            }
            Err(error) => {
                log::error!("failed to create session: {error}");
                false
            }
        }
    }

    async fn stop(&self) {
        // The shared server stays up for other tabs; only this backend's
        // session handle is dropped.
        self.running.store(false, Ordering::Release);
        *self.session_id.lock().await = None;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn send(&self, request: &LlmRequest) -> LlmResponse {
        self.cancel_requested.store(false, Ordering::Release);

        let session_id = self.session_id.lock().await.clone();
        let Some(session_id) = session_id.filter(|_| self.is_running()) else {
            return LlmResponse::failure(
                FailureKind::TransportUnavailable,
                "OpenCode server is not running",
            );
        };

        let prompt = self
            .prompt_builder
            .build(request, request.output_contract.as_deref());

        let raw = match self
            .transport
            .send(&session_id, &prompt, &self.cancel_requested)
            .await
        {
            Ok(raw) => raw,
            Err(error) => return Self::map_transport_error(error),
        };

        if self.cancel_requested.load(Ordering::Acquire) {
            return LlmResponse::failure(FailureKind::Cancelled, "Request cancelled");
        }

        let mut response = self.parser.parse(&raw, Some(request.task));

        // Token counts live on the sidecar envelope, not the extracted reply.
        if let Ok(envelope) = serde_json::from_str::<serde_json::Value>(&raw) {
            let usage = TokenUsage::from_reply(&envelope);
            if !usage.is_zero() {
                response.usage = usage;
            }
        }

        response
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    /// Opens a fresh provider session, dropping accumulated conversation
    /// state on the server side.
    async fn reset_session(&self) -> bool {
        match self.transport.create_session().await {
            Ok(session_id) => {
                log::info!("session reset complete: {session_id}");
                *self.session_id.lock().await = Some(session_id);
                true
            }
            Err(error) => {
                log::error!("session reset failed: {error}");
                false
            }
        }
    }
}
