//! Seams the session pulls editor content through.

use llm_protocol::ArtifactKind;

/// Which rule files feed the prompt's Rules section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuleSelection {
    /// Every rule file the project carries.
    #[default]
    All,
    /// An explicit subset, by rule file name.
    Named(Vec<String>),
}

/// Read access to the current editor buffers, one per artifact kind.
pub trait ArtifactStore: Send + Sync {
    /// Current content for one artifact. `None` when the artifact does not
    /// exist yet; blank content is treated the same as absent by callers.
    fn content(&self, kind: ArtifactKind) -> Option<String>;
}

/// Read access to the project's rule files.
pub trait RulesProvider: Send + Sync {
    /// Concatenated text of the selected rule files, `None` when the
    /// selection matches nothing.
    fn concatenated_text(&self, selection: &RuleSelection) -> Option<String>;
}
