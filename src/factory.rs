//! Builds per-tab backends from user settings.
//!
//! Every OpenCode tab shares one sidecar server; each tab still gets its own
//! backend (and therefore its own provider session and cancellation flag).

use std::sync::{Arc, Mutex};

use crate::session::lock_unpoisoned;
use llm_backend_external::{ExternalApiBackend, ExternalApiConfig};
use llm_backend_opencode::OpencodeBackend;
use llm_protocol::{DisabledBackend, LlmBackend, PromptBuilder, TabContract, TaskInstructionSource};
use opencode_api::{OpencodeApiError, OpencodeConfig, SidecarServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Disabled,
    Opencode,
    ExternalApi,
}

/// User-facing backend settings, one value for the whole workbench.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub opencode: OpencodeConfig,
    pub external: ExternalApiConfig,
}

pub struct BackendFactory {
    settings: BackendSettings,
    instructions: Option<Arc<dyn TaskInstructionSource>>,
    /// Created on first OpenCode backend, shared by every later one.
    sidecar: Mutex<Option<Arc<SidecarServer>>>,
}

impl BackendFactory {
    #[must_use]
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings,
            instructions: None,
            sidecar: Mutex::new(None),
        }
    }

    /// Wires in the settings layer's custom task instructions.
    #[must_use]
    pub fn with_instruction_source(mut self, source: Arc<dyn TaskInstructionSource>) -> Self {
        self.instructions = Some(source);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Builds the configured backend for one tab. Construction failures fall
    /// back to the disabled stand-in so the tab stays usable; the failure is
    /// logged and every send explains how to fix the configuration.
    #[must_use]
    pub fn create_backend(&self, tab: TabContract) -> Arc<dyn LlmBackend> {
        let builder = self.prompt_builder_for(tab);
        match self.settings.kind {
            BackendKind::Disabled => Arc::new(DisabledBackend::new()),
            BackendKind::Opencode => match self.opencode_backend(builder) {
                Ok(backend) => backend,
                Err(error) => {
                    log::error!("failed to build OpenCode backend: {error}");
                    Arc::new(DisabledBackend::new())
                }
            },
            BackendKind::ExternalApi => {
                match ExternalApiBackend::new(self.settings.external.clone(), builder) {
                    Ok(backend) => Arc::new(backend),
                    Err(error) => {
                        log::error!("failed to build external API backend: {error}");
                        Arc::new(DisabledBackend::new())
                    }
                }
            }
        }
    }

    fn prompt_builder_for(&self, tab: TabContract) -> PromptBuilder {
        let mut builder = PromptBuilder::new().with_tab_id(tab.id());
        if let Some(source) = &self.instructions {
            builder = builder.with_instruction_source(source.clone());
        }
        builder
    }

    fn opencode_backend(
        &self,
        builder: PromptBuilder,
    ) -> Result<Arc<dyn LlmBackend>, OpencodeApiError> {
        let server = self.sidecar_server()?;
        Ok(Arc::new(OpencodeBackend::new(server, builder)?))
    }

    fn sidecar_server(&self) -> Result<Arc<SidecarServer>, OpencodeApiError> {
        let mut guard = lock_unpoisoned(&self.sidecar);
        if let Some(server) = guard.as_ref() {
            return Ok(server.clone());
        }
        let server = Arc::new(SidecarServer::new(self.settings.opencode.clone())?);
        *guard = Some(server.clone());
        Ok(server)
    }

    /// Stops the shared sidecar server if this factory spawned one. Backends
    /// created earlier keep failing over to transport-unavailable responses.
    pub async fn shutdown(&self) {
        let server = lock_unpoisoned(&self.sidecar).take();
        if let Some(server) = server {
            server.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_settings_produce_the_disabled_backend() {
        let factory = BackendFactory::new(BackendSettings::default());
        let backend = factory.create_backend(TabContract::TextJson);
        assert_eq!(backend.name(), "disabled");
    }

    #[test]
    fn external_settings_produce_a_model_named_backend() {
        let settings = BackendSettings {
            kind: BackendKind::ExternalApi,
            external: ExternalApiConfig::new().with_model("llama3.1"),
            ..BackendSettings::default()
        };
        let factory = BackendFactory::new(settings);
        let backend = factory.create_backend(TabContract::JsonCode);
        assert_eq!(backend.name(), "External API (llama3.1)");
    }

    #[test]
    fn opencode_tabs_share_one_sidecar_server() {
        let settings = BackendSettings {
            kind: BackendKind::Opencode,
            ..BackendSettings::default()
        };
        let factory = BackendFactory::new(settings);
        let first = factory.sidecar_server().unwrap();
        let second = factory.sidecar_server().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
