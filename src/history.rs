//! Conversation transcript kept per tab session.

use llm_protocol::TokenUsage;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Records user actions and system events for context, e.g. "proposal
    /// accepted".
    System,
}

/// One turn in the transcript.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    /// Text shown in the chat panel.
    pub content: String,
    /// Full raw reply, kept on assistant messages for debugging.
    pub full_response: Option<String>,
    pub usage: TokenUsage,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            full_response: None,
            usage: TokenUsage::default(),
        }
    }

    #[must_use]
    pub fn with_full_response(mut self, response: impl Into<String>) -> Self {
        self.full_response = Some(response.into());
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Append-only ordered message list.
///
/// The per-tab in-memory transcript is unbounded until reset; long-lived
/// transcripts can opt into rotation with [`Transcript::with_cap`].
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    cap: Option<usize>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the most recent `cap` messages.
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        Self {
            messages: Vec::new(),
            cap: Some(cap),
        }
    }

    pub fn push(&mut self, message: Message) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        if let Some(cap) = self.cap {
            if self.messages.len() > cap {
                let excess = self.messages.len() - cap;
                self.messages.drain(..excess);
            }
        }
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
