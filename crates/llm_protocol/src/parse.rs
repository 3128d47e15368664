//! Defensive extraction of one structured reply from unreliable model text.
//!
//! The model is asked for bare JSON but routinely wraps it in markdown fences,
//! prose, or the sidecar's message envelope. Extraction is an ordered list of
//! strategies tried in sequence; the first one that yields a parseable object
//! wins. Field mapping afterwards never fails: missing optional fields default,
//! unknown task ids are ignored, half-formed proposals read as "no proposal".

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::response::{
    FailureKind, LlmResponse, Proposal, ProposalMode, SessionDelta, Severity, TextPatch,
    ValidationIssue, ValidationStatus,
};
use crate::tasks::LlmTask;
use crate::usage::TokenUsage;

const EXCERPT_LIMIT: usize = 500;

/// Outcome of one extraction strategy.
enum Extraction {
    /// A parsed JSON object to map into a response.
    Object(Value),
    /// The strategy recognized the shape but found no usable object inside;
    /// later strategies must not reinterpret the same text.
    Exhausted,
    /// Not this strategy's shape, try the next one.
    NoMatch,
}

type Strategy = fn(&str) -> Extraction;

/// Strategies in priority order: sidecar envelope, leading object, `json`
/// fence, plain fence, greedy first-to-last brace span.
const STRATEGIES: [Strategy; 5] = [
    extract_from_envelope,
    extract_leading_object,
    extract_json_fence,
    extract_plain_fence,
    extract_greedy_span,
];

/// Maps raw transport text into an [`LlmResponse`].
#[derive(Debug, Default)]
pub struct ResponseParser;

impl ResponseParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parses one reply. `expected_task` is only cross-checked for logging;
    /// the session keeps its own notion of the running task.
    #[must_use]
    pub fn parse(&self, raw: &str, expected_task: Option<LlmTask>) -> LlmResponse {
        let mut response = LlmResponse {
            raw_text: raw.to_string(),
            ..LlmResponse::default()
        };

        if raw.trim().is_empty() {
            response.fail_with(FailureKind::EmptyResponse, "Empty response from backend");
            return response;
        }

        for strategy in STRATEGIES {
            match strategy(raw) {
                Extraction::Object(data) => {
                    map_reply(&data, &mut response, expected_task);
                    return response;
                }
                Extraction::Exhausted => break,
                Extraction::NoMatch => {}
            }
        }

        response.fail_with(FailureKind::ParseFailure, "No valid JSON found in response");
        response.assistant_message = fallback_text(raw);
        response
    }
}

/// Sidecar message envelope: a JSON object with a `parts` array whose
/// thinking or text blocks may carry the actual reply object.
fn extract_from_envelope(raw: &str) -> Extraction {
    let Ok(envelope) = serde_json::from_str::<Value>(raw.trim()) else {
        return Extraction::NoMatch;
    };
    let Some(parts) = envelope.get("parts").and_then(Value::as_array) else {
        return Extraction::NoMatch;
    };

    for part in parts {
        match part.get("type").and_then(Value::as_str) {
            Some("thinking") => {
                if let Some(content) = part.get("content").and_then(Value::as_str) {
                    if content.starts_with('{') {
                        if let Ok(object @ Value::Object(_)) = serde_json::from_str(content) {
                            return Extraction::Object(object);
                        }
                    }
                }
            }
            Some("text") => match part.get("text") {
                // Some sidecar builds deliver the reply pre-parsed.
                Some(object @ Value::Object(_)) => return Extraction::Object(object.clone()),
                Some(Value::String(text)) if text.trim_start().starts_with('{') => {
                    if let Ok(object @ Value::Object(_)) = serde_json::from_str(text) {
                        return Extraction::Object(object);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    // An envelope with no reply inside is a final answer; parsing the
    // envelope wrapper itself would be wrong.
    Extraction::Exhausted
}

/// Text that starts with `{`: scan for the matching close brace, skipping
/// string literals, and parse that span.
fn extract_leading_object(raw: &str) -> Extraction {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return Extraction::NoMatch;
    }

    let mut depth = 0u32;
    let mut in_string = false;
    let mut escaped = false;
    for (at, ch) in trimmed.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let span = &trimmed[..at + ch.len_utf8()];
                    return match serde_json::from_str::<Value>(span) {
                        Ok(object @ Value::Object(_)) => Extraction::Object(object),
                        _ => Extraction::NoMatch,
                    };
                }
            }
            _ => {}
        }
    }
    Extraction::NoMatch
}

fn extract_json_fence(raw: &str) -> Extraction {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```json\s*\n(.*?)\n```").unwrap());
    extract_with(fence, raw)
}

fn extract_plain_fence(raw: &str) -> Extraction {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```\s*\n(.*?)\n```").unwrap());
    extract_with(fence, raw)
}

/// Last resort: everything from the first `{` to the last `}`.
fn extract_greedy_span(raw: &str) -> Extraction {
    static SPAN: OnceLock<Regex> = OnceLock::new();
    let span = SPAN.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap());
    match span.find(raw) {
        Some(found) => match serde_json::from_str::<Value>(found.as_str()) {
            Ok(object @ Value::Object(_)) => Extraction::Object(object),
            _ => Extraction::NoMatch,
        },
        None => Extraction::NoMatch,
    }
}

fn extract_with(fence: &Regex, raw: &str) -> Extraction {
    let Some(captures) = fence.captures(raw) else {
        return Extraction::NoMatch;
    };
    let Some(body) = captures.get(1) else {
        return Extraction::NoMatch;
    };
    match serde_json::from_str::<Value>(body.as_str()) {
        Ok(object @ Value::Object(_)) => Extraction::Object(object),
        _ => Extraction::NoMatch,
    }
}

/// Best-effort plain-text excerpt for the transcript when no JSON parsed.
fn fallback_text(raw: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<Value>(raw.trim()) {
        if let Some(parts) = envelope.get("parts").and_then(Value::as_array) {
            let mut texts = Vec::new();
            for part in parts {
                if part.get("type").and_then(Value::as_str) != Some("text") {
                    continue;
                }
                match part.get("text") {
                    Some(Value::Object(object)) => {
                        if let Some(message) =
                            object.get("assistant_message").and_then(Value::as_str)
                        {
                            texts.push(message.to_string());
                        }
                    }
                    Some(Value::String(text)) if !text.is_empty() => texts.push(text.clone()),
                    _ => {}
                }
            }
            if !texts.is_empty() {
                return texts.join("\n\n");
            }
        }
    }

    static FENCES: OnceLock<Regex> = OnceLock::new();
    let fences = FENCES.get_or_init(|| Regex::new(r"(?s)```.*?```").unwrap());
    let stripped = fences.replace_all(raw, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return "Received response but could not parse it.".to_string();
    }
    let end = stripped
        .char_indices()
        .map(|(at, _)| at)
        .find(|at| *at >= EXCERPT_LIMIT)
        .unwrap_or(stripped.len());
    stripped[..end].to_string()
}

fn map_reply(data: &Value, response: &mut LlmResponse, expected_task: Option<LlmTask>) {
    response.success = true;
    response.assistant_message = str_field(data, "assistant_message");
    response.strict_mode = data
        .get("strict_mode")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    response.usage = TokenUsage::from_reply(data);

    let task_id = str_field(data, "task");
    if !task_id.is_empty() {
        response.task = LlmTask::from_wire(&task_id);
        if response.task.is_none() {
            log::debug!("ignoring unknown task id in reply: '{task_id}'");
        }
    }
    if let (Some(got), Some(expected)) = (response.task, expected_task) {
        if got != expected {
            log::warn!("reply labeled task '{got}' but '{expected}' was requested");
        }
    }

    if let Some(validation) = data.get("validation") {
        response.validation_status = match validation.get("status").and_then(Value::as_str) {
            Some("pass") => Some(ValidationStatus::Pass),
            Some("warn") => Some(ValidationStatus::Warn),
            Some("fail") => Some(ValidationStatus::Fail),
            _ => None,
        };
        if let Some(assumptions) = validation.get("assumptions").and_then(Value::as_array) {
            response.assumptions = assumptions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        if let Some(issues) = validation.get("issues").and_then(Value::as_array) {
            response.issues = issues.iter().map(issue_from).collect();
        }
    }

    if let Some(proposals) = data.get("proposals") {
        response.procedure_json = proposal_from(proposals.get("procedure_json"));
        response.test_code = proposal_from(proposals.get("test_code"));
        response.procedure_text = proposal_from(proposals.get("procedure_text"));
        if let Some(patches) = proposals.get("text_patches").and_then(Value::as_array) {
            response.text_patches = patches.iter().map(patch_from).collect();
        }
    }

    if let Some(delta) = data.get("session_delta") {
        let delta: SessionDelta = serde_json::from_value(delta.clone()).unwrap_or_default();
        if !delta.is_empty() {
            response.session_delta = Some(delta);
        }
    }
}

fn proposal_from(value: Option<&Value>) -> Option<Proposal> {
    let value = value?;
    let mode = ProposalMode::from_wire(value.get("mode")?.as_str()?)?;
    let content = value.get("content")?;
    if content.is_null() {
        return None;
    }
    Some(Proposal {
        mode,
        content: content.clone(),
    })
}

fn issue_from(value: &Value) -> ValidationIssue {
    ValidationIssue {
        severity: match value.get("severity").and_then(Value::as_str) {
            Some("error") => Severity::Error,
            _ => Severity::Warning,
        },
        code: str_field(value, "code"),
        message: str_field(value, "message"),
        location: str_field(value, "location"),
        suggested_fix: str_field(value, "suggested_fix"),
    }
}

fn patch_from(value: &Value) -> TextPatch {
    let line = |key| {
        value
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|line| u32::try_from(line).ok())
            .unwrap_or(0)
    };
    TextPatch {
        line_start: line("line_start"),
        line_end: line("line_end"),
        original: str_field(value, "original"),
        proposed: str_field(value, "proposed"),
        reason: str_field(value, "reason"),
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
