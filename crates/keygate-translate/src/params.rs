use serde::{Deserialize, Serialize};

use keygate_protocol::chat::request::ChatCompletionRequestBody;
use keygate_protocol::chat::types::ReasoningEffort;

use crate::provider::Provider;

/// Thinking budgets for the unified effort levels.
const EFFORT_BUDGETS: [(ReasoningEffort, u64); 3] = [
    (ReasoningEffort::Low, 4000),
    (ReasoningEffort::Medium, 8000),
    (ReasoningEffort::High, 16000),
];

/// A budget never exceeds this share of `max_tokens`.
const BUDGET_MAX_SHARE: f64 = 0.8;

const DEFAULT_THINKING_BUDGET: u64 = 8000;

pub fn effort_budget(effort: ReasoningEffort) -> u64 {
    EFFORT_BUDGETS
        .iter()
        .find(|(e, _)| *e == effort)
        .map(|(_, budget)| *budget)
        .unwrap_or(DEFAULT_THINKING_BUDGET)
}

/// Provider-specific options attached to the outbound gateway call,
/// keyed by provider name on the wire (`{"anthropic": {...}}`). Each
/// variant holds only the fields that provider accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOptions {
    Anthropic {
        thinking: AnthropicThinking,
    },
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(rename = "reasoningEffort")]
        reasoning_effort: ReasoningEffort,
    },
    Google {
        #[serde(rename = "thinkingConfig")]
        thinking_config: GoogleThinkingConfig,
    },
    Xai {
        #[serde(rename = "reasoningEffort")]
        reasoning_effort: XaiReasoningEffort,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicThinking {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "budgetTokens")]
    pub budget_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    pub thinking_budget: u64,
    #[serde(rename = "includeThoughts")]
    pub include_thoughts: bool,
}

/// xAI collapses the three-level knob to two: medium and high both
/// become high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XaiReasoningEffort {
    Low,
    High,
}

/// Generation controls forwarded unchanged; non-finite values are
/// dropped so they never reach the downstream call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationControls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

pub fn generation_controls(request: &ChatCompletionRequestBody) -> GenerationControls {
    GenerationControls {
        temperature: request.temperature.filter(|v| v.is_finite()),
        top_p: request.top_p.filter(|v| v.is_finite()),
        max_tokens: request.max_tokens,
    }
}

fn has_reasoning_controls(request: &ChatCompletionRequestBody) -> bool {
    request.reasoning_effort.is_some()
        || request.thinking.is_some()
        || (request.enable_thinking == Some(true) && request.thinking_budget.is_some())
}

/// Effective thinking budget from whichever control shape is present,
/// in precedence order: effort level, raw thinking object, legacy
/// enable+budget pair. Clamped to 80% of `max_tokens` when set.
pub fn resolve_thinking_budget(request: &ChatCompletionRequestBody) -> Option<u64> {
    let raw = if let Some(effort) = request.reasoning_effort {
        Some(effort_budget(effort))
    } else if let Some(budget) = request.thinking.as_ref().and_then(|t| t.budget_tokens) {
        Some(budget)
    } else if request.enable_thinking == Some(true) {
        request.thinking_budget
    } else {
        None
    };
    raw.map(|budget| clamp_budget(budget, request.max_tokens))
}

fn clamp_budget(budget: u64, max_tokens: Option<u64>) -> u64 {
    match max_tokens {
        Some(max) => budget.min((max as f64 * BUDGET_MAX_SHARE) as u64),
        None => budget,
    }
}

/// Maps the unified reasoning controls onto the provider's schema.
/// Returns `None` when no control is present or the provider has no
/// reasoning surface for this model.
pub fn translate_options(
    request: &ChatCompletionRequestBody,
    provider: Provider,
    bare_model: &str,
) -> Option<ProviderOptions> {
    if !has_reasoning_controls(request) {
        return None;
    }

    match provider {
        Provider::Anthropic => {
            if let Some(thinking) = &request.thinking {
                // Explicit thinking objects pass through verbatim,
                // only defaulting the type when absent.
                let budget_tokens = thinking
                    .budget_tokens
                    .or_else(|| resolve_thinking_budget(request))
                    .unwrap_or(DEFAULT_THINKING_BUDGET);
                return Some(ProviderOptions::Anthropic {
                    thinking: AnthropicThinking {
                        kind: thinking.kind.clone().unwrap_or_else(|| "enabled".to_string()),
                        budget_tokens,
                    },
                });
            }
            resolve_thinking_budget(request).map(|budget_tokens| ProviderOptions::Anthropic {
                thinking: AnthropicThinking {
                    kind: "enabled".to_string(),
                    budget_tokens,
                },
            })
        }
        Provider::OpenAi => {
            let effort = request.reasoning_effort?;
            if is_openai_reasoning_model(bare_model) {
                Some(ProviderOptions::OpenAi {
                    reasoning_effort: effort,
                })
            } else {
                None
            }
        }
        Provider::Google => {
            resolve_thinking_budget(request).map(|budget| ProviderOptions::Google {
                thinking_config: GoogleThinkingConfig {
                    thinking_budget: budget,
                    include_thoughts: true,
                },
            })
        }
        Provider::Xai => {
            let effort = match request.reasoning_effort {
                Some(ReasoningEffort::Low) => XaiReasoningEffort::Low,
                _ => XaiReasoningEffort::High,
            };
            Some(ProviderOptions::Xai {
                reasoning_effort: effort,
            })
        }
        Provider::Unknown => None,
    }
}

fn is_openai_reasoning_model(bare_model: &str) -> bool {
    let lower = bare_model.to_ascii_lowercase();
    lower.starts_with("o1") || lower.starts_with("o3") || lower.contains("gpt-5")
}
