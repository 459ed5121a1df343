use serde::Deserialize;
use serde_json::Value as JsonValue;

use keygate_protocol::chat::types::CompletionUsage;

/// Events the upstream gateway stream is decoded into before
/// normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    ReasoningDelta(String),
    TextDelta(String),
    Finish { usage: Option<RawUsage> },
}

/// Usage as reported upstream. Counts arrive in several shapes (raw
/// number, `{total}`, `{count}`), so fields stay loosely typed until
/// extraction.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawUsage {
    #[serde(default, alias = "promptTokens")]
    pub prompt_tokens: Option<JsonValue>,
    #[serde(default, alias = "completionTokens")]
    pub completion_tokens: Option<JsonValue>,
    #[serde(default, alias = "totalTokens")]
    pub total_tokens: Option<JsonValue>,
}

pub type UsageTotals = CompletionUsage;

/// Normalized three-kind output sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Reasoning(String),
    Text(String),
    Done(UsageTotals),
}

/// Streaming projection over the upstream event sequence: forwards
/// non-empty deltas one at a time and emits exactly one `Done` when a
/// finish event arrives. If the upstream closes without one, no
/// `Done` is produced and stream closure is the implicit terminator.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    done_emitted: bool,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: UpstreamEvent) -> Option<StreamItem> {
        match event {
            UpstreamEvent::ReasoningDelta(text) => {
                if text.is_empty() {
                    None
                } else {
                    Some(StreamItem::Reasoning(text))
                }
            }
            UpstreamEvent::TextDelta(text) => {
                if text.is_empty() {
                    None
                } else {
                    Some(StreamItem::Text(text))
                }
            }
            UpstreamEvent::Finish { usage } => {
                if self.done_emitted {
                    return None;
                }
                self.done_emitted = true;
                Some(StreamItem::Done(usage_totals(usage.as_ref())))
            }
        }
    }
}

/// Defensive token-count extraction: raw number first, then `.total`,
/// then `.count`, defaulting to 0.
pub fn token_count(value: &JsonValue) -> u64 {
    if let Some(n) = as_count(value) {
        return n;
    }
    if let Some(object) = value.as_object() {
        for key in ["total", "count"] {
            if let Some(n) = object.get(key).and_then(as_count) {
                return n;
            }
        }
    }
    0
}

fn as_count(value: &JsonValue) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

/// Totals are the sum of prompt and completion counts unless the
/// upstream independently reported a non-zero total.
pub fn usage_totals(usage: Option<&RawUsage>) -> UsageTotals {
    let Some(usage) = usage else {
        return UsageTotals::default();
    };
    let prompt_tokens = usage.prompt_tokens.as_ref().map(token_count).unwrap_or(0);
    let completion_tokens = usage
        .completion_tokens
        .as_ref()
        .map(token_count)
        .unwrap_or(0);
    let reported_total = usage.total_tokens.as_ref().map(token_count).unwrap_or(0);
    UsageTotals {
        prompt_tokens,
        completion_tokens,
        total_tokens: if reported_total != 0 {
            reported_total
        } else {
            prompt_tokens + completion_tokens
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reassembles_and_drops_empty_deltas() {
        let mut machine = StreamReassembler::new();
        let events = vec![
            UpstreamEvent::ReasoningDelta("a".to_string()),
            UpstreamEvent::TextDelta(String::new()),
            UpstreamEvent::TextDelta("b".to_string()),
            UpstreamEvent::Finish {
                usage: Some(RawUsage {
                    prompt_tokens: Some(json!(3)),
                    completion_tokens: Some(json!(2)),
                    total_tokens: None,
                }),
            },
        ];
        let items: Vec<StreamItem> = events
            .into_iter()
            .filter_map(|event| machine.push(event))
            .collect();
        assert_eq!(
            items,
            vec![
                StreamItem::Reasoning("a".to_string()),
                StreamItem::Text("b".to_string()),
                StreamItem::Done(UsageTotals {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                }),
            ]
        );
    }

    #[test]
    fn empty_reasoning_delta_is_swallowed() {
        let mut machine = StreamReassembler::new();
        assert_eq!(
            machine.push(UpstreamEvent::ReasoningDelta(String::new())),
            None
        );
    }

    #[test]
    fn done_is_emitted_at_most_once() {
        let mut machine = StreamReassembler::new();
        assert!(machine.push(UpstreamEvent::Finish { usage: None }).is_some());
        assert!(machine.push(UpstreamEvent::Finish { usage: None }).is_none());
    }

    #[test]
    fn token_counts_extract_from_all_shapes() {
        assert_eq!(token_count(&json!(7)), 7);
        assert_eq!(token_count(&json!(7.9)), 7);
        assert_eq!(token_count(&json!({"total": 11})), 11);
        assert_eq!(token_count(&json!({"count": 13})), 13);
        assert_eq!(token_count(&json!({"total": 11, "count": 13})), 11);
        assert_eq!(token_count(&json!("eleven")), 0);
        assert_eq!(token_count(&json!(null)), 0);
    }

    #[test]
    fn reported_non_zero_total_wins_over_sum() {
        let usage = RawUsage {
            prompt_tokens: Some(json!(3)),
            completion_tokens: Some(json!(2)),
            total_tokens: Some(json!(9)),
        };
        assert_eq!(usage_totals(Some(&usage)).total_tokens, 9);

        let usage = RawUsage {
            total_tokens: Some(json!(0)),
            ..usage
        };
        assert_eq!(usage_totals(Some(&usage)).total_tokens, 5);
    }
}
