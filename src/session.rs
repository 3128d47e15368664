//! Per-tab session: conditional context inclusion, transcript and token
//! accounting, working-notes updates, and contract enforcement around one
//! backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use sha2::{Digest, Sha256};

use llm_protocol::{
    validate_response, ArtifactKind, FailureKind, LlmBackend, LlmRequest, LlmResponse, LlmTask,
    TabContract,
};

use crate::history::{Message, Role, Transcript};
use crate::notes::SessionNotes;
use crate::store::{ArtifactStore, RuleSelection, RulesProvider};

/// Orchestrates LLM turns for one tab.
///
/// At most one turn is in flight at a time. A new send cancels the previous
/// turn and waits for it to return before building its request, so checksum
/// bookkeeping never interleaves.
pub struct TabSession {
    tab: TabContract,
    backend: Mutex<Arc<dyn LlmBackend>>,
    artifacts: Arc<dyn ArtifactStore>,
    rules: Arc<dyn RulesProvider>,
    state: Mutex<SessionState>,
    /// Serializes turns. Never held while the state mutex is held.
    turn_gate: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct SessionState {
    transcript: Transcript,
    notes: SessionNotes,
    cumulative_tokens: u64,
    /// Digest of each artifact as last included in a successful turn.
    checksums: HashMap<ArtifactKind, String>,
    rules_checksum: Option<String>,
    first_interaction: bool,
    rule_selection: RuleSelection,
    current_task: Option<LlmTask>,
}

/// Checksum updates computed at build time, applied only once the turn
/// succeeds. A failed or cancelled turn leaves the bookkeeping untouched so
/// the content is re-sent next time.
#[derive(Default)]
struct PendingChecksums {
    artifacts: Vec<(ArtifactKind, String)>,
    rules: Option<String>,
}

fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Recovers the guard even if a panic poisoned the lock; session state must
/// stay readable so failures keep surfacing as failed responses.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TabSession {
    #[must_use]
    pub fn new(
        tab: TabContract,
        backend: Arc<dyn LlmBackend>,
        artifacts: Arc<dyn ArtifactStore>,
        rules: Arc<dyn RulesProvider>,
    ) -> Self {
        Self {
            tab,
            backend: Mutex::new(backend),
            artifacts,
            rules,
            state: Mutex::new(SessionState {
                first_interaction: true,
                ..SessionState::default()
            }),
            turn_gate: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn tab(&self) -> TabContract {
        self.tab
    }

    fn backend(&self) -> Arc<dyn LlmBackend> {
        lock_unpoisoned(&self.backend).clone()
    }

    #[must_use]
    pub fn backend_name(&self) -> String {
        self.backend().name().to_string()
    }

    /// Swaps in a newly configured backend. The old one is cancelled and the
    /// inclusion bookkeeping is cleared: the fresh backend has seen nothing.
    pub fn update_backend(&self, backend: Arc<dyn LlmBackend>) {
        let previous = {
            let mut slot = lock_unpoisoned(&self.backend);
            std::mem::replace(&mut *slot, backend)
        };
        previous.cancel();
        let mut state = lock_unpoisoned(&self.state);
        state.checksums.clear();
        state.rules_checksum = None;
        state.first_interaction = true;
    }

    /// Runs one turn in strict or non-strict mode.
    pub async fn send(
        &self,
        task: LlmTask,
        user_message: Option<&str>,
        strict_mode: bool,
    ) -> LlmResponse {
        self.send_inner(task, user_message, strict_mode, false).await
    }

    /// Re-runs a task with every artifact and rule resent, demanding output.
    /// Force implies non-strict: the model must answer and document its
    /// assumptions instead of refusing.
    pub async fn send_forced(&self, task: LlmTask, user_message: Option<&str>) -> LlmResponse {
        self.send_inner(task, user_message, false, true).await
    }

    async fn send_inner(
        &self,
        task: LlmTask,
        user_message: Option<&str>,
        strict_mode: bool,
        force: bool,
    ) -> LlmResponse {
        // Abort whatever is in flight, then wait for it to release the gate.
        let backend = self.backend();
        backend.cancel();
        let _turn = self.turn_gate.lock().await;

        if !backend.is_running() && !backend.start().await {
            log::warn!("backend '{}' failed to start", backend.name());
        }

        let (request, pending) = self.build_request(task, user_message, strict_mode, force);

        if let Some(text) = user_message.filter(|text| !text.trim().is_empty()) {
            let mut state = lock_unpoisoned(&self.state);
            state.transcript.push(Message::new(Role::User, text));
        }

        let mut response = backend.send(&request).await;
        if response.success {
            validate_response(&mut response, self.tab, Some(task));
        }
        self.record_turn(&response, pending);
        response
    }

    fn build_request(
        &self,
        task: LlmTask,
        user_message: Option<&str>,
        strict_mode: bool,
        force: bool,
    ) -> (LlmRequest, PendingChecksums) {
        let mut state = lock_unpoisoned(&self.state);
        state.current_task = Some(task);

        let strict = if force { false } else { strict_mode };
        let mut request = LlmRequest::new(task)
            .with_strict_mode(strict)
            .with_output_contract(self.tab.contract_text())
            .with_session_summary(state.notes.summary());
        if let Some(text) = user_message {
            request = request.with_user_message(text);
        }

        let mut pending = PendingChecksums::default();

        if let Some(rules) = self.rules.concatenated_text(&state.rule_selection) {
            if !rules.trim().is_empty() {
                let checksum = fingerprint(&rules);
                let changed = state.rules_checksum.as_deref() != Some(checksum.as_str());
                if force || state.first_interaction || changed {
                    request = request.with_rules(rules);
                    pending.rules = Some(checksum);
                }
            }
        }

        // Tasks with a fixed input set only ever carry those kinds; open-ended
        // chat carries whatever the tab allows.
        let kinds = task
            .required_inputs()
            .unwrap_or_else(|| self.tab.allowed_kinds());
        for kind in kinds.iter().copied() {
            let Some(content) = self.artifacts.content(kind) else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            let checksum = fingerprint(&content);
            let unchanged =
                state.checksums.get(&kind).map(String::as_str) == Some(checksum.as_str());
            if force || state.first_interaction || !unchanged {
                request = request.with_artifact(kind, content);
                pending.artifacts.push((kind, checksum));
            }
        }

        log::debug!(
            "built request for '{}' on tab '{}': artifacts {:?}, rules {}",
            task,
            self.tab.id(),
            request.included_kinds(),
            if request.rules.is_some() { "included" } else { "omitted" },
        );
        (request, pending)
    }

    /// Validates and records a response obtained outside `send`, e.g. a turn
    /// executed by a batch runner against the same tab.
    pub fn record_response(&self, response: &mut LlmResponse) {
        if response.success {
            validate_response(response, self.tab, response.task);
        }
        self.record_turn(response, PendingChecksums::default());
    }

    fn record_turn(&self, response: &LlmResponse, pending: PendingChecksums) {
        let mut state = lock_unpoisoned(&self.state);
        if !response.success {
            log::info!(
                "turn failed on tab '{}': {} ({})",
                self.tab.id(),
                response
                    .failure_kind
                    .map(|kind| kind.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                response.error_message,
            );
            return;
        }

        for (kind, checksum) in pending.artifacts {
            state.checksums.insert(kind, checksum);
        }
        if let Some(checksum) = pending.rules {
            state.rules_checksum = Some(checksum);
        }
        state.first_interaction = false;

        state.cumulative_tokens += response.usage.total_tokens;

        if !response.assistant_message.is_empty() {
            let message = Message::new(Role::Assistant, response.assistant_message.clone())
                .with_full_response(response.raw_text.clone())
                .with_usage(response.usage);
            state.transcript.push(message);
        }

        if let Some(delta) = &response.session_delta {
            state.notes.apply_delta(delta);
        }
        state.notes.add_assumptions(&response.assumptions);
    }

    /// Cancels the in-flight turn, if any. The pending send returns a
    /// cancelled response; no transcript or checksum state changes.
    pub fn cancel(&self) {
        self.backend().cancel();
    }

    /// Appends a system entry to the transcript, e.g. "proposal accepted".
    pub fn add_system_message(&self, text: impl Into<String>) {
        let mut state = lock_unpoisoned(&self.state);
        state.transcript.push(Message::new(Role::System, text));
    }

    /// Invalidates the stored checksum so the next turn resends this
    /// artifact.
    pub fn mark_artifact_modified(&self, kind: ArtifactKind) {
        let mut state = lock_unpoisoned(&self.state);
        state.checksums.remove(&kind);
    }

    /// Selects an explicit subset of rule files.
    pub fn set_selected_rules(&self, names: Vec<String>) {
        self.set_rule_selection(RuleSelection::Named(names));
    }

    /// Changes which rule files feed the prompt. Always invalidates the rules
    /// checksum, even if the resulting text happens to match.
    pub fn set_rule_selection(&self, selection: RuleSelection) {
        let mut state = lock_unpoisoned(&self.state);
        state.rule_selection = selection;
        state.rules_checksum = None;
    }

    #[must_use]
    pub fn rule_selection(&self) -> RuleSelection {
        lock_unpoisoned(&self.state).rule_selection.clone()
    }

    /// Concatenated text of the currently selected rules.
    #[must_use]
    pub fn selected_rules_content(&self) -> Option<String> {
        let selection = self.rule_selection();
        self.rules.concatenated_text(&selection)
    }

    /// Clears the transcript, token counter, and all inclusion bookkeeping.
    /// The next turn behaves like a first interaction. Idempotent. Working
    /// notes survive; see [`clear_notes`](Self::clear_notes).
    pub fn reset_conversation(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.transcript.clear();
        state.cumulative_tokens = 0;
        state.checksums.clear();
        state.rules_checksum = None;
        state.first_interaction = true;
        state.current_task = None;
    }

    /// Drops the provider-side conversation as well, then resets local
    /// bookkeeping. Returns false when the backend could not recycle its
    /// session.
    pub async fn reset_backend(&self) -> bool {
        let recycled = self.backend().reset_session().await;
        self.reset_conversation();
        recycled
    }

    pub fn clear_notes(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.notes.clear();
    }

    #[must_use]
    pub fn notes_summary(&self) -> String {
        lock_unpoisoned(&self.state).notes.summary()
    }

    /// Snapshot of the transcript, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        lock_unpoisoned(&self.state).transcript.iter().cloned().collect()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        lock_unpoisoned(&self.state).transcript.len()
    }

    #[must_use]
    pub fn cumulative_tokens(&self) -> u64 {
        lock_unpoisoned(&self.state).cumulative_tokens
    }

    #[must_use]
    pub fn current_task(&self) -> Option<LlmTask> {
        lock_unpoisoned(&self.state).current_task
    }

    #[must_use]
    pub fn is_first_interaction(&self) -> bool {
        lock_unpoisoned(&self.state).first_interaction
    }

    /// Cancelled turns surface as failed responses; callers that want to
    /// distinguish them branch on this.
    #[must_use]
    pub fn was_cancelled(response: &LlmResponse) -> bool {
        response.failure_kind == Some(FailureKind::Cancelled)
    }
}
