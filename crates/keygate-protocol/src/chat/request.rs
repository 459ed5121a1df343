use serde::{Deserialize, Serialize};

use crate::chat::types::{ChatMessage, ReasoningEffort, ThinkingDirective};

/// Unified inbound request. `model` and `messages` are required;
/// everything else is optional. The three reasoning-control shapes
/// accept both snake_case and the legacy camelCase spellings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(
        default,
        alias = "reasoningEffort",
        skip_serializing_if = "Option::is_none"
    )]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingDirective>,
    #[serde(
        default,
        alias = "enableThinking",
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_thinking: Option<bool>,
    #[serde(
        default,
        alias = "thinkingBudget",
        skip_serializing_if = "Option::is_none"
    )]
    pub thinking_budget: Option<u64>,
}

impl ChatCompletionRequestBody {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::MessageContent;

    #[test]
    fn rejects_missing_model_and_messages() {
        let err = serde_json::from_str::<ChatCompletionRequestBody>(r#"{"messages":[]}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<ChatCompletionRequestBody>(r#"{"model":"gpt-4o"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn accepts_camel_case_reasoning_fields() {
        let body: ChatCompletionRequestBody = serde_json::from_str(
            r#"{
                "model": "claude-sonnet-4",
                "messages": [{"role": "user", "content": "hi"}],
                "reasoningEffort": "medium",
                "enableThinking": true,
                "thinkingBudget": 1234
            }"#,
        )
        .unwrap();
        assert_eq!(body.reasoning_effort, Some(ReasoningEffort::Medium));
        assert_eq!(body.enable_thinking, Some(true));
        assert_eq!(body.thinking_budget, Some(1234));
    }

    #[test]
    fn accepts_multi_part_content() {
        let body: ChatCompletionRequestBody = serde_json::from_str(
            r#"{
                "model": "gpt-4o",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "what is this?"},
                        {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
                    ]
                }]
            }"#,
        )
        .unwrap();
        match &body.messages[0].content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
