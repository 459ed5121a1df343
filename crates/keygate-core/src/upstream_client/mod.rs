use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use wreq::{Client, Method, Proxy};

use keygate_protocol::sse::SseParser;
use keygate_translate::{RawUsage, UpstreamEvent};

use crate::gateway::{InvokeError, InvokeOutcome, InvokeRequest, ModelGateway, TextResult};

#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    /// Base URL of the vendor gateway, e.g. `https://gateway.example.com`.
    pub base_url: String,
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl GatewayClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(86400),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// `ModelGateway` implementation speaking OpenAI-compatible JSON and
/// SSE to the vendor gateway.
#[derive(Clone)]
pub struct WreqModelGateway {
    config: GatewayClientConfig,
    client: Client,
}

impl WreqModelGateway {
    pub fn new(config: GatewayClientConfig) -> Result<Self, wreq::Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .read_timeout(config.stream_idle_timeout);
        if let Some(proxy) = config.proxy.as_deref() {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ModelGateway for WreqModelGateway {
    async fn invoke(
        &self,
        request: InvokeRequest,
        credential: &str,
    ) -> Result<InvokeOutcome, InvokeError> {
        let body = build_body(&request);
        let response = self
            .client
            .request(Method::POST, self.endpoint())
            .header("authorization", format!("Bearer {credential}"))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|err| InvokeError::new(None, err.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.bytes().await.unwrap_or_default();
            let message = if body.is_empty() {
                format!("upstream returned status {status}")
            } else {
                String::from_utf8_lossy(&body).into_owned()
            };
            return Err(InvokeError::new(Some(status), message));
        }

        if request.stream {
            Ok(InvokeOutcome::Stream(Box::pin(event_stream(
                response,
                self.config.stream_idle_timeout,
            ))))
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| InvokeError::new(None, err.to_string()))?;
            let parsed: GatewayChatResponse = serde_json::from_slice(&bytes)
                .map_err(|err| InvokeError::new(None, format!("invalid upstream response: {err}")))?;
            Ok(InvokeOutcome::Text(text_result(parsed)))
        }
    }
}

fn build_body(request: &InvokeRequest) -> JsonValue {
    let mut body = serde_json::Map::new();
    body.insert("model".into(), JsonValue::String(request.gateway_model.clone()));
    body.insert(
        "messages".into(),
        serde_json::to_value(&request.messages).unwrap_or(JsonValue::Array(Vec::new())),
    );
    body.insert("stream".into(), JsonValue::Bool(request.stream));

    if let Ok(JsonValue::Object(controls)) = serde_json::to_value(request.controls) {
        body.extend(controls);
    }
    // Provider options ride the request keyed by provider name.
    if let Some(options) = &request.provider_options
        && let Ok(JsonValue::Object(options)) = serde_json::to_value(options)
    {
        body.extend(options);
    }
    JsonValue::Object(body)
}

fn event_stream(
    response: wreq::Response,
    idle_timeout: Duration,
) -> impl futures_util::Stream<Item = Result<UpstreamEvent, InvokeError>> {
    stream! {
        let mut bytes = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut pending_usage: Option<RawUsage> = None;
        loop {
            let next = match tokio::time::timeout(idle_timeout, bytes.next()).await {
                Ok(next) => next,
                Err(_) => {
                    yield Err(InvokeError::new(None, "upstream stream idle timeout"));
                    return;
                }
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(InvokeError::new(None, err.to_string()));
                    return;
                }
            };
            for event in parser.push_bytes(&chunk) {
                for out in decode_chunk(&event.data, &mut pending_usage) {
                    yield Ok(out);
                }
            }
        }
        for event in parser.finish() {
            for out in decode_chunk(&event.data, &mut pending_usage) {
                yield Ok(out);
            }
        }
    }
}

/// Decodes one upstream SSE data payload into zero or more events.
/// Usage may arrive on a chunk of its own ahead of the finish marker,
/// so it is carried forward until a finish reason shows up.
fn decode_chunk(data: &str, pending_usage: &mut Option<RawUsage>) -> Vec<UpstreamEvent> {
    if data.trim() == "[DONE]" || data.is_empty() {
        return Vec::new();
    }
    let Ok(chunk) = serde_json::from_str::<GatewayStreamChunk>(data) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let mut finished = false;
    for choice in &chunk.choices {
        if let Some(reasoning) = &choice.delta.reasoning_content {
            events.push(UpstreamEvent::ReasoningDelta(reasoning.clone()));
        }
        if let Some(content) = &choice.delta.content {
            events.push(UpstreamEvent::TextDelta(content.clone()));
        }
        if choice.finish_reason.is_some() {
            finished = true;
        }
    }
    if let Some(usage) = chunk.usage {
        *pending_usage = Some(usage);
    }
    if finished {
        events.push(UpstreamEvent::Finish {
            usage: pending_usage.take(),
        });
    }
    events
}

fn text_result(parsed: GatewayChatResponse) -> TextResult {
    let choice = parsed.choices.into_iter().next();
    TextResult {
        content: choice
            .as_ref()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default(),
        reasoning: choice.and_then(|c| c.message.reasoning_content),
        usage: parsed.usage,
    }
}

#[derive(Debug, Deserialize)]
struct GatewayChatResponse {
    #[serde(default)]
    choices: Vec<GatewayChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct GatewayChoice {
    message: GatewayMessage,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayStreamChunk {
    #[serde(default)]
    choices: Vec<GatewayStreamChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct GatewayStreamChoice {
    #[serde(default)]
    delta: GatewayStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_protocol::chat::types::{ChatMessage, ChatRole, MessageContent, ReasoningEffort};
    use keygate_translate::{GenerationControls, Provider, ProviderOptions};

    fn request() -> InvokeRequest {
        InvokeRequest {
            provider: Provider::OpenAi,
            gateway_model: "openai/o3-mini".to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: MessageContent::Text("hi".to_string()),
                name: None,
            }],
            controls: GenerationControls {
                temperature: Some(0.2),
                top_p: None,
                max_tokens: Some(512),
            },
            provider_options: Some(ProviderOptions::OpenAi {
                reasoning_effort: ReasoningEffort::High,
            }),
            stream: true,
        }
    }

    #[test]
    fn body_merges_controls_and_provider_options() {
        let body = build_body(&request());
        assert_eq!(body["model"], "openai/o3-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["openai"]["reasoningEffort"], "high");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn decode_chunk_carries_usage_to_finish() {
        let mut pending = None;
        let events = decode_chunk(
            r#"{"choices":[{"delta":{"content":"hi"}}],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#,
            &mut pending,
        );
        assert_eq!(events, vec![UpstreamEvent::TextDelta("hi".to_string())]);
        assert!(pending.is_some());

        let events = decode_chunk(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            &mut pending,
        );
        match &events[0] {
            UpstreamEvent::Finish { usage: Some(usage) } => {
                assert_eq!(usage.prompt_tokens, Some(serde_json::json!(3)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(pending.is_none());
    }

    #[test]
    fn decode_chunk_ignores_done_and_garbage() {
        let mut pending = None;
        assert!(decode_chunk("[DONE]", &mut pending).is_empty());
        assert!(decode_chunk("not json", &mut pending).is_empty());
    }
}
