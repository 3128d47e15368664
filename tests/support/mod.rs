#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use llm_backend_mock::MockBackend;
use workbench_llm::{
    ArtifactKind, ArtifactStore, LlmResponse, Proposal, ProposalMode, RuleSelection, RulesProvider,
    TabContract, TabSession, TokenUsage,
};

/// In-memory editor buffers, settable mid-test.
#[derive(Default)]
pub struct FakeArtifacts {
    contents: Mutex<HashMap<ArtifactKind, String>>,
}

impl FakeArtifacts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, kind: ArtifactKind, content: impl Into<String>) {
        self.contents.lock().unwrap().insert(kind, content.into());
    }

    pub fn clear(&self, kind: ArtifactKind) {
        self.contents.lock().unwrap().remove(&kind);
    }
}

impl ArtifactStore for FakeArtifacts {
    fn content(&self, kind: ArtifactKind) -> Option<String> {
        self.contents.lock().unwrap().get(&kind).cloned()
    }
}

/// Named rule files, concatenated per selection.
#[derive(Default)]
pub struct FakeRules {
    files: Mutex<Vec<(String, String)>>,
}

impl FakeRules {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, name: impl Into<String>, text: impl Into<String>) {
        self.files.lock().unwrap().push((name.into(), text.into()));
    }
}

impl RulesProvider for FakeRules {
    fn concatenated_text(&self, selection: &RuleSelection) -> Option<String> {
        let files = self.files.lock().unwrap();
        let texts: Vec<&str> = files
            .iter()
            .filter(|(name, _)| match selection {
                RuleSelection::All => true,
                RuleSelection::Named(names) => names.contains(name),
            })
            .map(|(_, text)| text.as_str())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n\n"))
        }
    }
}

pub struct Harness {
    pub session: Arc<TabSession>,
    pub backend: Arc<MockBackend>,
    pub artifacts: Arc<FakeArtifacts>,
    pub rules: Arc<FakeRules>,
}

/// A session over a scripted backend and empty fakes.
pub fn harness(tab: TabContract, script: Vec<LlmResponse>) -> Harness {
    let backend = Arc::new(MockBackend::new(script));
    let artifacts = FakeArtifacts::new();
    let rules = FakeRules::new();
    let session = Arc::new(TabSession::new(
        tab,
        backend.clone(),
        artifacts.clone(),
        rules.clone(),
    ));
    Harness {
        session,
        backend,
        artifacts,
        rules,
    }
}

pub fn ok_reply(message: &str) -> LlmResponse {
    LlmResponse {
        success: true,
        assistant_message: message.to_string(),
        raw_text: format!("{{\"assistant_message\": \"{message}\"}}"),
        ..LlmResponse::default()
    }
}

pub fn ok_reply_with_tokens(message: &str, total: u64) -> LlmResponse {
    let mut reply = ok_reply(message);
    reply.usage = TokenUsage {
        prompt_tokens: total / 2,
        completion_tokens: total - total / 2,
        total_tokens: total,
    };
    reply
}

/// A successful reply carrying one string proposal for `kind`.
pub fn reply_proposing(kind: ArtifactKind, content: &str) -> LlmResponse {
    let mut reply = ok_reply("proposal attached");
    let proposal = Some(Proposal {
        mode: ProposalMode::Replace,
        content: serde_json::Value::String(content.to_string()),
    });
    match kind {
        ArtifactKind::ProcedureText => reply.procedure_text = proposal,
        ArtifactKind::ProcedureJson => reply.procedure_json = proposal,
        ArtifactKind::TestCode => reply.test_code = proposal,
    }
    reply
}
