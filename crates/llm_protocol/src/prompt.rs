//! Prompt assembly with a fixed section order.
//!
//! Section order matters: the model treats later sections as overriding
//! earlier narrative, so the output format and the contract always come last.

use std::collections::HashMap;
use std::sync::Arc;

use crate::request::LlmRequest;
use crate::tasks::LlmTask;

/// Resolves a per-tab custom instruction template, if one is configured.
/// Implemented by the settings layer; `None` falls through to the defaults.
pub trait TaskInstructionSource: Send + Sync {
    fn instruction(&self, tab_id: &str, task: LlmTask) -> Option<String>;
}

/// Machine-readable reply schema appended to every prompt.
pub const DEFAULT_OUTPUT_FORMAT: &str = r#"## Required Response Format

You MUST respond with a valid JSON object following this schema:

```json
{
  "type": "llm_turn",
  "task": "<task_name>",
  "strict_mode": <true|false>,
  "assistant_message": "Human-readable message for the user.",
  "validation": {
    "status": "pass|warn|fail",
    "issues": [
      {
        "severity": "error|warning",
        "code": "ISSUE_CODE",
        "message": "Description of the issue",
        "location": "where in the artifact",
        "suggested_fix": "how to fix it"
      }
    ],
    "assumptions": ["any assumptions made"]
  },
  "proposals": {
    "procedure_json": {
      "mode": "replace",
      "content": { /* the full JSON object */ }
    },
    "test_code": {
      "mode": "replace",
      "content": "the full Python code"
    },
    "procedure_text": {
      "mode": "replace",
      "content": "the full markdown text"
    },
    "text_patches": [
      {
        "line_start": 1,
        "line_end": 3,
        "original": "original text",
        "proposed": "proposed replacement",
        "reason": "why this change"
      }
    ]
  },
  "session_delta": {
    "intent": "updated intent if changed",
    "open_questions": [],
    "resolved_questions": [],
    "decisions_added": []
  }
}
```

Rules:
- Always include "assistant_message" with a helpful message
- For review tasks, include validation.issues[] with problems found AND include proposals with the fixes
- For generation tasks, include proposals with the generated artifacts
- Set proposal mode to null if not providing that artifact
- Only UTF-8"#;

const STRICT_MODE_NOTE: &str = "Strict mode: You may refuse to generate output if the input is \
ambiguous or insufficient. Ask clarifying questions.";
const FORCE_MODE_NOTE: &str = "Force mode: You MUST generate output even if ambiguous. Document \
all assumptions and issues.";

/// Turns an [`LlmRequest`] into the final prompt string.
pub struct PromptBuilder {
    tab_id: Option<String>,
    instructions: Option<Arc<dyn TaskInstructionSource>>,
    /// Direct per-task overrides. Checked after the instruction source and
    /// before the built-in defaults.
    overrides: HashMap<LlmTask, String>,
    output_format: String,
}

impl PromptBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tab_id: None,
            instructions: None,
            overrides: HashMap::new(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }

    #[must_use]
    pub fn with_tab_id(mut self, tab_id: impl Into<String>) -> Self {
        self.tab_id = Some(tab_id.into());
        self
    }

    #[must_use]
    pub fn with_instruction_source(mut self, source: Arc<dyn TaskInstructionSource>) -> Self {
        self.instructions = Some(source);
        self
    }

    #[must_use]
    pub fn with_override(mut self, task: LlmTask, instruction: impl Into<String>) -> Self {
        self.overrides.insert(task, instruction.into());
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Instruction fallback chain: configured source, then direct override,
    /// then the task's built-in default. The registry is a closed enum with a
    /// default for every task, so the chain always resolves.
    fn instruction_for(&self, task: LlmTask) -> String {
        if let (Some(source), Some(tab_id)) = (&self.instructions, &self.tab_id) {
            if let Some(custom) = source.instruction(tab_id, task) {
                log::debug!("using configured instruction for task '{task}'");
                return custom;
            }
        }
        if let Some(custom) = self.overrides.get(&task) {
            log::debug!("using override instruction for task '{task}'");
            return custom.clone();
        }
        task.default_instruction().to_string()
    }

    /// Assembles the prompt. Only sections with non-empty source data appear;
    /// the optional contract text, when given, is always the final section.
    #[must_use]
    pub fn build(&self, request: &LlmRequest, contract: Option<&str>) -> String {
        let mut sections: Vec<String> = Vec::new();

        sections.push(format!("# Task\n{}", self.instruction_for(request.task)));

        let (mode, note) = if request.strict_mode {
            ("STRICT", STRICT_MODE_NOTE)
        } else {
            ("FORCE", FORCE_MODE_NOTE)
        };
        sections.push(format!("## Mode: {mode}\n\n{note}"));

        if !request.session_summary.is_empty() {
            sections.push(format!("# Session Context\n{}", request.session_summary));
        }

        if let Some(rules) = non_empty(request.rules.as_deref()) {
            sections.push(format!("# Rules\n{rules}"));
        }

        if let Some(json) = non_empty(request.procedure_json.as_deref()) {
            sections.push(format!("# Current procedure.json\n```json\n{json}\n```"));
        }
        if let Some(code) = non_empty(request.test_code.as_deref()) {
            sections.push(format!("# Current test.py\n```python\n{code}\n```"));
        }
        if let Some(text) = non_empty(request.procedure_text.as_deref()) {
            sections.push(format!(
                "# Current procedure_text.md\n```markdown\n{text}\n```"
            ));
        }

        if !request.user_message.is_empty() {
            sections.push(format!("# User Message\n{}", request.user_message));
        }

        sections.push(self.output_format.clone());

        if let Some(contract) = contract.filter(|text| !text.is_empty()) {
            sections.push(contract.to_string());
        }

        sections.join("\n\n")
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}
