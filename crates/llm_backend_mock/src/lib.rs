//! Deterministic scripted backend for session-level tests and local runs.
//!
//! No transport or parsing logic lives here; callers enqueue the exact
//! [`LlmResponse`] values to hand back, and every received request is
//! recorded for assertions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use llm_protocol::{FailureKind, LlmBackend, LlmRequest, LlmResponse};

/// Recovers the guard even if a panicking test poisoned the lock.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Replays a scripted sequence of responses, one per `send`.
pub struct MockBackend {
    script: Mutex<Vec<LlmResponse>>,
    requests: Mutex<Vec<LlmRequest>>,
    /// Simulated network latency before each reply, checked against cancel.
    delay: Option<Duration>,
    cancel_requested: Arc<AtomicBool>,
    running: AtomicBool,
}

impl MockBackend {
    #[must_use]
    pub fn new(script: Vec<LlmResponse>) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            delay: None,
            cancel_requested: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    /// Adds artificial latency so cancellation races can be exercised.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request seen so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }

    /// Appends another scripted response.
    pub fn push_response(&self, response: LlmResponse) {
        lock_unpoisoned(&self.script).push(response);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> bool {
        self.running.store(true, Ordering::Release);
        true
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn send(&self, request: &LlmRequest) -> LlmResponse {
        self.cancel_requested.store(false, Ordering::Release);
        lock_unpoisoned(&self.requests).push(request.clone());

        if let Some(delay) = self.delay {
            let deadline = tokio::time::Instant::now() + delay;
            while tokio::time::Instant::now() < deadline {
                if self.cancel_requested.load(Ordering::Acquire) {
                    return LlmResponse::failure(FailureKind::Cancelled, "Request cancelled");
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        if self.cancel_requested.load(Ordering::Acquire) {
            return LlmResponse::failure(FailureKind::Cancelled, "Request cancelled");
        }

        let mut script = lock_unpoisoned(&self.script);
        if script.is_empty() {
            return LlmResponse::failure(
                FailureKind::EmptyResponse,
                "mock script ran out of responses",
            );
        }
        script.remove(0)
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }
}
