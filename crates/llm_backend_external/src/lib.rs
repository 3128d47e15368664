//! [`LlmBackend`] for any OpenAI-compatible chat-completions endpoint.
//!
//! Stateless request/response: every turn carries its full prompt, so the
//! session layer's conditional inclusion matters less here but still applies.
//! Rate-limited attempts are retried with exponential backoff up to the
//! configured budget; timeouts and connection errors end the attempt.

pub mod retry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use llm_protocol::{
    CancellationSignal, FailureKind, LlmBackend, LlmRequest, LlmResponse, PromptBuilder,
    ResponseParser, TokenUsage,
};
use retry::{retry_delay, STATUS_RATE_LIMITED};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

const SYSTEM_PROMPT: &str = "You are an AI assistant helping to create and review test procedures.\n\
You must respond with valid JSON following the specified schema.\n\
Your response must be a single JSON object.";

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ExternalApiConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable read at `start` for the bearer token. Missing is
    /// fine; local endpoints often need no auth.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    /// Retries after the initial attempt.
    pub retry_count: u32,
}

impl Default for ExternalApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            request_timeout: Duration::from_secs(120),
            retry_count: 2,
        }
    }
}

impl ExternalApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key_env(mut self, variable: impl Into<String>) -> Self {
        self.api_key_env = variable.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Raw HTTP outcome the retry loop classifies.
struct HttpReply {
    status: u16,
    body: String,
}

#[derive(Debug)]
enum TransportError {
    Timeout,
    Network(String),
}

#[async_trait]
trait ChatTransport: Send + Sync {
    async fn post_chat(
        &self,
        body: &ChatRequest,
        api_key: Option<&str>,
    ) -> Result<HttpReply, TransportError>;
}

struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    fn new(config: &ExternalApiConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChatTransport for ReqwestTransport {
    async fn post_chat(
        &self,
        body: &ChatRequest,
        api_key: Option<&str>,
    ) -> Result<HttpReply, TransportError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify)?;
        Ok(HttpReply { status, body: text })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

/// Backend speaking the OpenAI chat-completions wire format.
pub struct ExternalApiBackend {
    config: ExternalApiConfig,
    transport: Arc<dyn ChatTransport>,
    prompt_builder: PromptBuilder,
    parser: ResponseParser,
    api_key: Mutex<Option<String>>,
    cancel_requested: CancellationSignal,
    running: AtomicBool,
    name: String,
}

impl ExternalApiBackend {
    pub fn new(
        config: ExternalApiConfig,
        prompt_builder: PromptBuilder,
    ) -> Result<Self, reqwest::Error> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, transport, prompt_builder))
    }

    fn with_transport(
        config: ExternalApiConfig,
        transport: Arc<dyn ChatTransport>,
        prompt_builder: PromptBuilder,
    ) -> Self {
        let name = format!("External API ({})", config.model);
        Self {
            config,
            transport,
            prompt_builder,
            parser: ResponseParser::new(),
            api_key: Mutex::new(None),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            name,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    async fn send_with_retry(&self, body: &ChatRequest, request: &LlmRequest) -> LlmResponse {
        let api_key = self.api_key.lock().await.clone();
        let mut last_error: Option<(FailureKind, String)> = None;

        for attempt in 0..=self.config.retry_count {
            if self.is_cancelled() {
                return LlmResponse::failure(FailureKind::Cancelled, "Request cancelled");
            }

            match self.transport.post_chat(body, api_key.as_deref()).await {
                Ok(reply) if reply.status == 200 => {
                    return self.parse_api_reply(&reply.body, request);
                }
                Ok(reply) if reply.status == STATUS_RATE_LIMITED => {
                    // A rate limit that survives the whole budget escalates
                    // to a plain network failure.
                    last_error = Some((
                        FailureKind::NetworkError,
                        format!("API error: {} - {}", reply.status, reply.body),
                    ));
                    if attempt < self.config.retry_count {
                        log::info!("rate limited, backing off before retry {}", attempt + 1);
                        if self.sleep_or_cancel(retry_delay(attempt)).await {
                            return LlmResponse::failure(
                                FailureKind::Cancelled,
                                "Request cancelled",
                            );
                        }
                    }
                }
                Ok(reply) => {
                    last_error = Some((
                        FailureKind::NetworkError,
                        format!("API error: {} - {}", reply.status, reply.body),
                    ));
                }
                Err(TransportError::Timeout) => {
                    last_error = Some((FailureKind::Timeout, "Request timed out".to_string()));
                }
                Err(TransportError::Network(message)) => {
                    last_error = Some((
                        FailureKind::NetworkError,
                        format!("Request failed: {message}"),
                    ));
                }
            }
        }

        let (kind, message) =
            last_error.unwrap_or((FailureKind::NetworkError, "Unknown error".to_string()));
        LlmResponse::failure(kind, message)
    }

    fn parse_api_reply(&self, body: &str, request: &LlmRequest) -> LlmResponse {
        let envelope: Value = match serde_json::from_str(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                let mut response = LlmResponse::failure(
                    FailureKind::ParseFailure,
                    format!("Failed to parse API response: {error}"),
                );
                response.raw_text = body.to_string();
                return response;
            }
        };

        let content = envelope
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str);
        let Some(content) = content else {
            let mut response = LlmResponse::failure(
                FailureKind::EmptyResponse,
                "No response choices returned",
            );
            response.raw_text = body.to_string();
            return response;
        };

        let mut response = self.parser.parse(content, Some(request.task));
        let usage = TokenUsage::from_reply(&envelope);
        if !usage.is_zero() {
            response.usage = usage;
        }
        response
    }

    /// Sleeps in short slices so a cancel lands quickly. Returns true when
    /// cancelled.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        while tokio::time::Instant::now() < deadline {
            if self.is_cancelled() {
                return true;
            }
            let remaining = deadline - tokio::time::Instant::now();
            tokio::time::sleep(remaining.min(CANCEL_POLL_INTERVAL)).await;
        }
        self.is_cancelled()
    }
}

#[async_trait]
impl LlmBackend for ExternalApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> bool {
        // Key is optional; local endpoints such as Ollama take none.
        let key = std::env::var(&self.config.api_key_env).ok().filter(|key| !key.is_empty());
        if key.is_none() {
            log::debug!("no API key in ${}, sending unauthenticated", self.config.api_key_env);
        }
        *self.api_key.lock().await = key;
        self.running.store(true, Ordering::Release);
        true
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        *self.api_key.lock().await = None;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn send(&self, request: &LlmRequest) -> LlmResponse {
        self.cancel_requested.store(false, Ordering::Release);

        if !self.is_running() {
            return LlmResponse::failure(
                FailureKind::TransportUnavailable,
                "API backend is not started",
            );
        }

        let prompt = self
            .prompt_builder
            .build(request, request.output_contract.as_deref());
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self.send_with_retry(&body, request).await;

        if self.is_cancelled() && response.failure_kind != Some(FailureKind::Cancelled) {
            return LlmResponse::failure(FailureKind::Cancelled, "Request cancelled");
        }
        response
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_protocol::LlmTask;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct ScriptedTransport {
        replies: StdMutex<Vec<Result<HttpReply, TransportError>>>,
        calls: StdMutex<u32>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Self {
            Self {
                replies: StdMutex::new(replies),
                calls: StdMutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn post_chat(
            &self,
            _body: &ChatRequest,
            _api_key: Option<&str>,
        ) -> Result<HttpReply, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn completion_body(content: &str) -> String {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string()
    }

    async fn started_backend(
        replies: Vec<Result<HttpReply, TransportError>>,
        retry_count: u32,
    ) -> (ExternalApiBackend, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let config = ExternalApiConfig::new()
            .with_retry_count(retry_count)
            .with_api_key_env("WORKBENCH_TEST_NO_SUCH_KEY");
        let backend =
            ExternalApiBackend::with_transport(config, transport.clone(), PromptBuilder::new());
        assert!(backend.start().await);
        (backend, transport)
    }

    #[tokio::test]
    async fn successful_call_parses_content_and_envelope_usage() {
        let content = json!({"assistant_message": "looks good", "task": "review_code"}).to_string();
        let (backend, _) = started_backend(
            vec![Ok(HttpReply {
                status: 200,
                body: completion_body(&content),
            })],
            2,
        )
        .await;

        let response = backend.send(&LlmRequest::new(LlmTask::ReviewCode)).await;
        assert!(response.success);
        assert_eq!(response.assistant_message, "looks good");
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn rate_limit_is_retried_then_succeeds() {
        tokio::time::pause();
        let content = json!({"assistant_message": "after retry"}).to_string();
        let (backend, transport) = started_backend(
            vec![
                Ok(HttpReply {
                    status: 429,
                    body: "slow down".to_string(),
                }),
                Ok(HttpReply {
                    status: 200,
                    body: completion_body(&content),
                }),
            ],
            2,
        )
        .await;

        let response = backend.send(&LlmRequest::new(LlmTask::AdHocChat)).await;
        assert!(response.success);
        assert_eq!(response.assistant_message, "after retry");
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn rate_limit_exhausting_the_budget_escalates_to_network_error() {
        tokio::time::pause();
        let limited = || {
            Ok(HttpReply {
                status: 429,
                body: "slow down".to_string(),
            })
        };
        let (backend, transport) = started_backend(vec![limited(), limited()], 1).await;

        let response = backend.send(&LlmRequest::new(LlmTask::AdHocChat)).await;
        assert!(!response.success);
        assert_eq!(response.failure_kind, Some(FailureKind::NetworkError));
        assert!(response.error_message.contains("API error: 429"));
        assert_eq!(*transport.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn timeout_is_terminal_for_the_attempt_but_still_retried() {
        let content = json!({"assistant_message": "ok"}).to_string();
        let (backend, _) = started_backend(
            vec![
                Err(TransportError::Timeout),
                Ok(HttpReply {
                    status: 200,
                    body: completion_body(&content),
                }),
            ],
            1,
        )
        .await;

        let response = backend.send(&LlmRequest::new(LlmTask::ReviewJson)).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn all_timeouts_surface_as_timeout() {
        let (backend, _) = started_backend(
            vec![Err(TransportError::Timeout), Err(TransportError::Timeout)],
            1,
        )
        .await;
        let response = backend.send(&LlmRequest::new(LlmTask::ReviewJson)).await;
        assert_eq!(response.failure_kind, Some(FailureKind::Timeout));
        assert_eq!(response.error_message, "Request timed out");
    }

    #[tokio::test]
    async fn missing_choices_is_an_empty_response() {
        let (backend, _) = started_backend(
            vec![Ok(HttpReply {
                status: 200,
                body: json!({"choices": []}).to_string(),
            })],
            0,
        )
        .await;
        let response = backend.send(&LlmRequest::new(LlmTask::ReviewJson)).await;
        assert_eq!(response.failure_kind, Some(FailureKind::EmptyResponse));
        assert_eq!(response.error_message, "No response choices returned");
    }

    #[tokio::test]
    async fn send_before_start_fails_without_calling_the_transport() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let backend = ExternalApiBackend::with_transport(
            ExternalApiConfig::new(),
            transport.clone(),
            PromptBuilder::new(),
        );
        let response = backend.send(&LlmRequest::new(LlmTask::ReviewJson)).await;
        assert_eq!(response.failure_kind, Some(FailureKind::TransportUnavailable));
        assert_eq!(*transport.calls.lock().unwrap(), 0);
    }
}
