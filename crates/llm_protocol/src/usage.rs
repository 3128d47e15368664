//! Tolerant token accounting across provider reply shapes.

use serde_json::Value;

/// Token counts for one turn. Zeroed when the provider reports nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Pulls counts out of a provider reply object.
    ///
    /// Two shapes are recognized: the OpenAI `usage` object with
    /// `prompt_tokens`/`completion_tokens`/`total_tokens`, and the sidecar
    /// `tokens` object (possibly nested under `info`) with
    /// `input`/`output`/`reasoning`, where total is the sum of all three.
    /// Anything else reads as all zeros. Never fails.
    #[must_use]
    pub fn from_reply(reply: &Value) -> Self {
        if let Some(usage) = reply.get("usage") {
            if usage.get("prompt_tokens").is_some() {
                let usage = Self {
                    prompt_tokens: count(usage, "prompt_tokens"),
                    completion_tokens: count(usage, "completion_tokens"),
                    total_tokens: count(usage, "total_tokens"),
                };
                log::debug!(
                    "token usage (openai shape): {} total ({} prompt + {} completion)",
                    usage.total_tokens,
                    usage.prompt_tokens,
                    usage.completion_tokens
                );
                return usage;
            }
        }

        let tokens = reply
            .get("tokens")
            .or_else(|| reply.get("info").and_then(|info| info.get("tokens")));
        if let Some(tokens) = tokens {
            if tokens.get("input").is_some() || tokens.get("output").is_some() {
                let prompt_tokens = count(tokens, "input");
                let completion_tokens = count(tokens, "output");
                let reasoning_tokens = count(tokens, "reasoning");
                let usage = Self {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens + reasoning_tokens,
                };
                log::debug!(
                    "token usage (sidecar shape): {} total ({} input + {} output + {} reasoning)",
                    usage.total_tokens,
                    prompt_tokens,
                    completion_tokens,
                    reasoning_tokens
                );
                return usage;
            }
        }

        log::debug!("no token usage data in reply");
        Self::default()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

fn count(object: &Value, key: &str) -> u64 {
    object.get(key).and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_the_openai_usage_shape() {
        let reply = json!({
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        });
        let usage = TokenUsage::from_reply(&reply);
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn reads_the_sidecar_tokens_shape_and_sums_reasoning() {
        let reply = json!({
            "info": {"tokens": {"input": 100, "output": 40, "reasoning": 10}}
        });
        let usage = TokenUsage::from_reply(&reply);
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.completion_tokens, 40);
        assert_eq!(usage.total_tokens, 150);

        // Same shape, not nested under "info".
        let reply = json!({"tokens": {"input": 5, "output": 7}});
        assert_eq!(TokenUsage::from_reply(&reply).total_tokens, 12);
    }

    #[test]
    fn unknown_shapes_degrade_to_zero() {
        assert!(TokenUsage::from_reply(&json!({})).is_zero());
        assert!(TokenUsage::from_reply(&json!({"usage": {"chars": 9}})).is_zero());
        assert!(TokenUsage::from_reply(&json!({"tokens": {"spent": 3}})).is_zero());
        assert!(TokenUsage::from_reply(&json!("not an object")).is_zero());
    }

    #[test]
    fn negative_or_non_numeric_counts_read_as_zero() {
        let reply = json!({
            "usage": {"prompt_tokens": -5, "completion_tokens": "many", "total_tokens": 3}
        });
        let usage = TokenUsage::from_reply(&reply);
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, 3);
    }
}
