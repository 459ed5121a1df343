use serde::{Deserialize, Serialize};

use crate::chat::types::{ChatRole, CompletionUsage, FinishReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatCompletionChunkObjectType {
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatCompletionStreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionStreamChoice {
    pub index: i64,
    pub delta: ChatCompletionStreamDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChatCompletionStreamResponse {
    pub id: String,
    pub object: ChatCompletionChunkObjectType,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl CreateChatCompletionStreamResponse {
    pub fn new(id: impl Into<String>, created: i64, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: ChatCompletionChunkObjectType::ChatCompletionChunk,
            created,
            model: model.into(),
            choices: Vec::new(),
            usage: None,
        }
    }

    pub fn with_delta(mut self, delta: ChatCompletionStreamDelta) -> Self {
        self.choices = vec![ChatCompletionStreamChoice {
            index: 0,
            delta,
            finish_reason: None,
        }];
        self
    }

    pub fn with_finish(mut self, reason: FinishReason, usage: Option<CompletionUsage>) -> Self {
        self.choices = vec![ChatCompletionStreamChoice {
            index: 0,
            delta: ChatCompletionStreamDelta::default(),
            finish_reason: Some(reason),
        }];
        self.usage = usage;
        self
    }
}
