use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::config::OpencodeConfig;
use crate::error::OpencodeApiError;

/// Optional cancellation signal checked around every blocking await.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for one sidecar server.
#[derive(Debug)]
pub struct OpencodeClient {
    http: Client,
    config: OpencodeConfig,
}

impl OpencodeClient {
    pub fn new(config: OpencodeConfig) -> Result<Self, OpencodeApiError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OpencodeConfig {
        &self.config
    }

    /// One probe of the health endpoint. Short timeout, never retries.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.config.server_url());
        match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                log::debug!("health check failed: {error}");
                false
            }
        }
    }

    /// Creates a conversation session and returns its id.
    pub async fn create_session(&self, title: &str) -> Result<String, OpencodeApiError> {
        let url = format!("{}/session", self.config.server_url());
        let response = self
            .http
            .post(&url)
            .timeout(SESSION_TIMEOUT)
            .json(&json!({"title": title}))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OpencodeApiError::Status(status, body));
        }
        let body: Value = response.json().await?;
        let session_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or(OpencodeApiError::MissingSessionId)?;
        log::info!("session created: {session_id}");
        Ok(session_id.to_string())
    }

    /// Sends one prompt to a session and returns the raw response body.
    ///
    /// Detects the provider's context-length-exceeded error shape and surfaces
    /// it as [`OpencodeApiError::ContextExceeded`] so callers can offer a
    /// session reset instead of a retry.
    pub async fn send_message(
        &self,
        session_id: &str,
        prompt: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, OpencodeApiError> {
        if is_cancelled(cancellation) {
            return Err(OpencodeApiError::Cancelled);
        }

        let mut body = json!({
            "parts": [{"type": "text", "text": prompt}],
        });
        if let Some(model) = &self.config.model {
            let (provider, model_id) = model
                .split_once('/')
                .ok_or_else(|| OpencodeApiError::InvalidModel(model.clone()))?;
            body["model"] = json!({"providerID": provider, "modelID": model_id});
        }

        let url = format!("{}/session/{session_id}/message", self.config.server_url());
        let response = self.http.post(&url).json(&body).send();
        let response = await_or_cancel(response, cancellation).await??;

        let status = response.status();
        let text = await_or_cancel(response.text(), cancellation).await??;
        log::debug!("message response: status={status}, {} chars", text.len());

        if !status.is_success() {
            return Err(OpencodeApiError::Status(status, text));
        }
        if text.is_empty() {
            log::error!("sidecar returned empty body for session {session_id} despite HTTP 200");
            return Err(OpencodeApiError::EmptyBody);
        }
        if is_context_exceeded(&text) {
            log::warn!("context length exceeded for session {session_id}");
            return Err(OpencodeApiError::ContextExceeded);
        }
        Ok(text)
    }
}

/// Provider-specific shape: `info.error.name == "UnknownError"` with a
/// `data.message` mentioning `context_length_exceeded`.
fn is_context_exceeded(body: &str) -> bool {
    let Ok(reply) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    let Some(error) = reply.get("info").and_then(|info| info.get("error")) else {
        return false;
    };
    if error.get("name").and_then(Value::as_str) != Some("UnknownError") {
        return false;
    }
    error
        .get("data")
        .and_then(|data| data.get("message"))
        .and_then(Value::as_str)
        .is_some_and(|message| message.contains("context_length_exceeded"))
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

pub(crate) async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, OpencodeApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(OpencodeApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(OpencodeApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
