//! Closed task registry and artifact kinds.
//!
//! Every lookup here is an exhaustive `match` so adding a task variant forces
//! the instruction, input, and output tables to be revisited at compile time.

use std::fmt;

/// One of the editable content types a tab works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    ProcedureText,
    ProcedureJson,
    TestCode,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::ProcedureText,
        ArtifactKind::ProcedureJson,
        ArtifactKind::TestCode,
    ];

    /// Wire name used in prompts, replies, and contract messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProcedureText => "procedure_text",
            Self::ProcedureJson => "procedure_json",
            Self::TestCode => "test_code",
        }
    }

    /// Parses a wire name back into a kind.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "procedure_text" => Some(Self::ProcedureText),
            "procedure_json" => Some(Self::ProcedureJson),
            "test_code" => Some(Self::TestCode),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of LLM operation requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmTask {
    DeriveJsonFromText,
    RenderTextFromJson,
    ReviewTextProcedure,
    ReviewJson,
    ReviewTextVsJson,
    GenerateCodeFromJson,
    DeriveJsonFromCode,
    ReviewCode,
    ReviewCodeVsJson,
    AdHocChat,
}

impl LlmTask {
    pub const ALL: [LlmTask; 10] = [
        LlmTask::DeriveJsonFromText,
        LlmTask::RenderTextFromJson,
        LlmTask::ReviewTextProcedure,
        LlmTask::ReviewJson,
        LlmTask::ReviewTextVsJson,
        LlmTask::GenerateCodeFromJson,
        LlmTask::DeriveJsonFromCode,
        LlmTask::ReviewCode,
        LlmTask::ReviewCodeVsJson,
        LlmTask::AdHocChat,
    ];

    /// Wire id carried in prompts and replies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeriveJsonFromText => "derive_json_from_text",
            Self::RenderTextFromJson => "render_text_from_json",
            Self::ReviewTextProcedure => "review_text_procedure",
            Self::ReviewJson => "review_json",
            Self::ReviewTextVsJson => "review_text_vs_json",
            Self::GenerateCodeFromJson => "generate_code_from_json",
            Self::DeriveJsonFromCode => "derive_json_from_code",
            Self::ReviewCode => "review_code",
            Self::ReviewCodeVsJson => "review_code_vs_json",
            Self::AdHocChat => "ad_hoc_chat",
        }
    }

    /// Parses a wire id; unknown ids yield `None` rather than an error so
    /// callers can ignore unrecognized values in model replies.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|task| task.as_str() == value)
    }

    /// Input artifacts this task consumes.
    ///
    /// `None` means "everything the tab allows" (open-ended chat).
    #[must_use]
    pub fn required_inputs(self) -> Option<&'static [ArtifactKind]> {
        match self {
            Self::DeriveJsonFromText => Some(&[ArtifactKind::ProcedureText]),
            Self::RenderTextFromJson => Some(&[ArtifactKind::ProcedureJson]),
            Self::ReviewTextProcedure => Some(&[ArtifactKind::ProcedureText]),
            Self::ReviewJson => Some(&[ArtifactKind::ProcedureJson]),
            Self::ReviewTextVsJson => {
                Some(&[ArtifactKind::ProcedureText, ArtifactKind::ProcedureJson])
            }
            Self::GenerateCodeFromJson => Some(&[ArtifactKind::ProcedureJson]),
            Self::DeriveJsonFromCode => Some(&[ArtifactKind::TestCode]),
            Self::ReviewCode => Some(&[ArtifactKind::TestCode]),
            Self::ReviewCodeVsJson => {
                Some(&[ArtifactKind::ProcedureJson, ArtifactKind::TestCode])
            }
            Self::AdHocChat => None,
        }
    }

    /// Output artifacts this task is expected to propose.
    ///
    /// `None` defers to the tab-level contract (open-ended chat).
    #[must_use]
    pub fn expected_outputs(self) -> Option<&'static [ArtifactKind]> {
        match self {
            Self::DeriveJsonFromText => Some(&[ArtifactKind::ProcedureJson]),
            Self::RenderTextFromJson => Some(&[ArtifactKind::ProcedureText]),
            Self::ReviewTextProcedure => Some(&[ArtifactKind::ProcedureText]),
            Self::ReviewJson => Some(&[ArtifactKind::ProcedureJson]),
            Self::ReviewTextVsJson => {
                Some(&[ArtifactKind::ProcedureText, ArtifactKind::ProcedureJson])
            }
            Self::GenerateCodeFromJson => Some(&[ArtifactKind::TestCode]),
            Self::DeriveJsonFromCode => Some(&[ArtifactKind::ProcedureJson]),
            Self::ReviewCode => Some(&[ArtifactKind::TestCode]),
            Self::ReviewCodeVsJson => {
                Some(&[ArtifactKind::ProcedureJson, ArtifactKind::TestCode])
            }
            Self::AdHocChat => None,
        }
    }

    /// Built-in instruction used when no custom template is configured.
    #[must_use]
    pub fn default_instruction(self) -> &'static str {
        match self {
            Self::DeriveJsonFromText => {
                "Task: Derive procedure.json from procedure text.\n\n\
                 Convert the natural language procedure text into a structured procedure.json.\n\
                 Extract and structure:\n\
                 - Test name and description\n\
                 - Equipment requirements\n\
                 - Step-by-step procedure\n\
                 - Expected results and pass/fail criteria\n\n\
                 IMPORTANT: In your response, ONLY include a 'procedure_json' proposal.\n\
                 Do NOT generate 'test_code' or 'procedure_text' proposals for this task."
            }
            Self::RenderTextFromJson => {
                "Task: Render procedure.json as human-readable text.\n\n\
                 Convert the structured JSON into a clear, readable procedure document.\n\
                 Format as markdown with:\n\
                 - Title and description\n\
                 - Equipment list\n\
                 - Numbered steps with clear instructions\n\
                 - Expected results"
            }
            Self::ReviewTextProcedure => {
                "Task: Review procedure text for correctness and completeness.\n\n\
                 Analyze the provided procedure text and identify:\n\
                 - Ambiguous or unclear steps\n\
                 - Missing equipment specifications\n\
                 - Missing measurement parameters\n\
                 - Rule violations (if rules provided)\n\n\
                 Report issues in validation.issues[] with severity, code, message, location, and suggested_fix.\n\
                 If you find issues, include a procedure_text proposal with the corrected version.\n\
                 You may ask clarifying questions if needed.\n\n\
                 IMPORTANT: In your response, ONLY include a 'procedure_text' proposal if needed.\n\
                 Do NOT generate 'procedure_json' or 'test_code' proposals for this task."
            }
            Self::ReviewJson => {
                "Task: Review procedure.json for correctness and completeness.\n\n\
                 Analyze the provided procedure.json and identify:\n\
                 - Missing required fields\n\
                 - Incomplete step descriptions\n\
                 - Equipment specification issues\n\
                 - Any violations of the rules (if provided)\n\n\
                 Report issues in validation.issues[] with severity, code, message, location, and suggested_fix.\n\
                 If you find issues, include a procedure_json proposal with the corrected version.\n\
                 You may ask clarifying questions if needed."
            }
            Self::ReviewTextVsJson => {
                "Task: Check coherence between procedure text and procedure.json.\n\n\
                 Compare the procedure text with the procedure JSON and identify:\n\
                 - Step count mismatches\n\
                 - Step content/intent mismatches\n\
                 - Equipment list differences\n\
                 - Expected result differences\n\n\
                 Report issues in validation.issues[] with severity, code, message, location, and suggested_fix.\n\
                 If you find issues, include proposals (procedure_text and/or procedure_json) with the corrected versions.\n\
                 You may ask clarifying questions if needed."
            }
            Self::GenerateCodeFromJson => {
                "Task: Generate test code from procedure.json.\n\n\
                 Generate Python test code that implements the procedure described in the JSON.\n\
                 Requirements:\n\
                 - Include # Step N markers for each step\n\
                 - Follow the equipment and measurement specifications\n\
                 - Handle errors appropriately"
            }
            Self::DeriveJsonFromCode => {
                "Task: Derive procedure.json from test code.\n\n\
                 Analyze the provided Python test code and create a structured procedure.json \
                 that describes the test procedure.\n\
                 Extract:\n\
                 - Test name and description\n\
                 - Board/equipment requirements\n\
                 - Test steps (from # Step N markers or inferred from code)\n\
                 - Expected results"
            }
            Self::ReviewCode => {
                "Task: Review test code for correctness and rule compliance.\n\n\
                 Analyze the provided Python test code and identify:\n\
                 - Missing or incorrect step markers\n\
                 - Equipment handling issues\n\
                 - Measurement structure problems\n\
                 - Error handling gaps\n\
                 - Rule violations (if rules provided)\n\
                 - Code quality issues\n\n\
                 Report issues in validation.issues[] with severity, code, message, location, and suggested_fix.\n\
                 If you find issues, include a test_code proposal with the corrected version.\n\
                 You may ask clarifying questions if needed.\n\n\
                 IMPORTANT: In your response, ONLY include a 'test_code' proposal if needed.\n\
                 Do NOT generate 'procedure_json' or 'procedure_text' proposals for this task."
            }
            Self::ReviewCodeVsJson => {
                "Task: Check coherence between procedure.json and test code.\n\n\
                 Compare the procedure JSON with the test code and identify:\n\
                 - Steps in JSON without corresponding code blocks\n\
                 - Code blocks without corresponding JSON steps\n\
                 - Equipment mismatches\n\
                 - Measurement/expectation mismatches\n\
                 - Rule violations in either artifact\n\n\
                 Report issues in validation.issues[] with severity, code, message, location, and suggested_fix.\n\
                 If you find issues, include proposals (procedure_json and/or test_code) with the corrected versions.\n\
                 You may ask clarifying questions if needed."
            }
            Self::AdHocChat => {
                "Task: Respond to user question or request.\n\n\
                 The user is asking a question or making a request related to test procedure authoring.\n\
                 Respond helpfully based on the context provided.\n\
                 If the user asks for changes to an artifact, include a proposal in your response.\n\
                 If the user asks a question, answer it without modifying artifacts."
            }
        }
    }
}

impl fmt::Display for LlmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_round_trip_for_every_task() {
        for task in LlmTask::ALL {
            assert_eq!(LlmTask::from_wire(task.as_str()), Some(task));
        }
        assert_eq!(LlmTask::from_wire("not_a_task"), None);
    }

    #[test]
    fn artifact_wire_names_round_trip() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(ArtifactKind::from_wire("diagram"), None);
    }

    #[test]
    fn only_ad_hoc_chat_defers_to_the_tab_contract() {
        for task in LlmTask::ALL {
            let open_ended = task == LlmTask::AdHocChat;
            assert_eq!(task.required_inputs().is_none(), open_ended, "{task}");
            assert_eq!(task.expected_outputs().is_none(), open_ended, "{task}");
        }
    }

    #[test]
    fn generate_code_expects_only_code_output() {
        assert_eq!(
            LlmTask::GenerateCodeFromJson.expected_outputs(),
            Some(&[ArtifactKind::TestCode][..])
        );
        assert_eq!(
            LlmTask::GenerateCodeFromJson.required_inputs(),
            Some(&[ArtifactKind::ProcedureJson][..])
        );
    }

    #[test]
    fn every_task_has_a_nonempty_default_instruction() {
        for task in LlmTask::ALL {
            assert!(task.default_instruction().starts_with("Task:"), "{task}");
        }
    }
}
