use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use keygate_pool::{KeyStore, mask_secret};
use keygate_protocol::chat::request::ChatCompletionRequestBody;
use keygate_protocol::chat::response::{
    ChatCompletionChoice, ChatCompletionObjectType, ChatCompletionResponseMessage,
    CreateChatCompletionResponse,
};
use keygate_protocol::chat::stream::{ChatCompletionStreamDelta, CreateChatCompletionStreamResponse};
use keygate_protocol::chat::types::{ChatRole, FinishReason};
use keygate_protocol::sse;
use keygate_translate::stream::usage_totals;
use keygate_translate::{
    StreamItem, StreamReassembler, UsageTotals, ensure_gateway_model_id, generation_controls,
    split_gateway_model_id, translate_options,
};

use crate::classify::{FailureKind, classify_failure};
use crate::error::ProxyError;
use crate::gateway::{EventStream, InvokeError, InvokeOutcome, InvokeRequest, ModelGateway, TextResult};

pub enum ChatOutcome {
    Completion(CreateChatCompletionResponse),
    Stream(BoxStream<'static, Result<Bytes, Infallible>>),
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completion(resp) => f.debug_tuple("Completion").field(resp).finish(),
            Self::Stream(_) => f.debug_struct("Stream").finish_non_exhaustive(),
        }
    }
}

/// Composes the pool, the translator, and the gateway collaborator.
/// Failure classification and credential health updates happen here
/// and nowhere else; no cross-credential retry within a request.
pub struct Orchestrator {
    store: Arc<KeyStore>,
    gateway: Arc<dyn ModelGateway>,
}

impl Orchestrator {
    pub fn new(store: Arc<KeyStore>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    pub async fn chat_completion(
        &self,
        body: ChatCompletionRequestBody,
    ) -> Result<ChatOutcome, ProxyError> {
        let Some(secret) = self.store.select().await else {
            return Err(ProxyError::service_unavailable(
                "no upstream credentials available",
            ));
        };

        let gateway_model = ensure_gateway_model_id(&body.model);
        let (provider, bare_model) = split_gateway_model_id(&gateway_model);
        let provider_options = translate_options(&body, provider, bare_model);
        let controls = generation_controls(&body);
        let is_stream = body.is_stream();

        let request = InvokeRequest {
            provider,
            gateway_model: gateway_model.clone(),
            messages: body.messages,
            controls,
            provider_options,
            stream: is_stream,
        };

        let completion_id = format!("chatcmpl-{}", Uuid::new_v4().simple());
        let created = OffsetDateTime::now_utc().unix_timestamp();
        info!(
            event = "upstream_call",
            model = %gateway_model,
            provider = %provider.as_str(),
            key = %mask_secret(&secret),
            is_stream
        );

        match self.gateway.invoke(request, &secret).await {
            Err(err) => Err(self.record_failure(&secret, &err)),
            Ok(InvokeOutcome::Text(result)) => {
                self.store.mark_success(&secret);
                Ok(ChatOutcome::Completion(batch_response(
                    completion_id,
                    created,
                    gateway_model,
                    result,
                )))
            }
            Ok(InvokeOutcome::Stream(events)) => Ok(ChatOutcome::Stream(self.forward_stream(
                completion_id,
                created,
                gateway_model,
                secret,
                events,
            ))),
        }
    }

    fn record_failure(&self, secret: &str, err: &InvokeError) -> ProxyError {
        match classify_failure(err.status, &err.message) {
            FailureKind::RateLimited => {
                self.store.mark_failure(secret);
                ProxyError::rate_limited(&err.message)
            }
            FailureKind::Upstream => {
                warn!(
                    event = "upstream_error",
                    key = %mask_secret(secret),
                    status = ?err.status,
                    error = %err.message
                );
                ProxyError::upstream(&err.message)
            }
        }
    }

    /// Re-segments the upstream event stream into outbound SSE
    /// frames: role announcement, one frame per non-empty delta, a
    /// finish frame, then the terminator. The credential is marked
    /// healthy only after the stream drains completely; dropping the
    /// returned stream (client disconnect) records nothing.
    fn forward_stream(
        &self,
        id: String,
        created: i64,
        model: String,
        secret: String,
        mut events: EventStream,
    ) -> BoxStream<'static, Result<Bytes, Infallible>> {
        let store = self.store.clone();
        Box::pin(stream! {
            let role_chunk = CreateChatCompletionStreamResponse::new(&id, created, &model)
                .with_delta(ChatCompletionStreamDelta {
                    role: Some(ChatRole::Assistant),
                    content: None,
                    reasoning_content: None,
                });
            yield Ok(sse::data_frame(&role_chunk));

            let mut machine = StreamReassembler::new();
            let mut usage: Option<UsageTotals> = None;
            let mut errored = false;
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let Some(item) = machine.push(event) else {
                            continue;
                        };
                        match item {
                            StreamItem::Reasoning(delta) => {
                                let chunk = CreateChatCompletionStreamResponse::new(&id, created, &model)
                                    .with_delta(ChatCompletionStreamDelta {
                                        role: None,
                                        content: None,
                                        reasoning_content: Some(delta),
                                    });
                                yield Ok(sse::data_frame(&chunk));
                            }
                            StreamItem::Text(delta) => {
                                let chunk = CreateChatCompletionStreamResponse::new(&id, created, &model)
                                    .with_delta(ChatCompletionStreamDelta {
                                        role: None,
                                        content: Some(delta),
                                        reasoning_content: None,
                                    });
                                yield Ok(sse::data_frame(&chunk));
                            }
                            StreamItem::Done(totals) => {
                                usage = Some(totals);
                            }
                        }
                    }
                    Err(err) => {
                        errored = true;
                        if classify_failure(err.status, &err.message) == FailureKind::RateLimited {
                            store.mark_failure(&secret);
                        }
                        warn!(
                            event = "stream_error",
                            key = %mask_secret(&secret),
                            error = %err.message
                        );
                        let chunk = CreateChatCompletionStreamResponse::new(&id, created, &model)
                            .with_delta(ChatCompletionStreamDelta {
                                role: None,
                                content: Some(format!("\n\nupstream error: {}", err.message)),
                                reasoning_content: None,
                            });
                        yield Ok(sse::data_frame(&chunk));
                        break;
                    }
                }
            }

            if !errored {
                let finish = CreateChatCompletionStreamResponse::new(&id, created, &model)
                    .with_finish(FinishReason::Stop, usage);
                yield Ok(sse::data_frame(&finish));
                store.mark_success(&secret);
            }
            yield Ok(sse::done_frame());
        })
    }
}

fn batch_response(
    id: String,
    created: i64,
    model: String,
    result: TextResult,
) -> CreateChatCompletionResponse {
    let usage = result.usage.as_ref().map(|raw| usage_totals(Some(raw)));
    CreateChatCompletionResponse {
        id,
        object: ChatCompletionObjectType::ChatCompletion,
        created,
        model,
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionResponseMessage {
                role: ChatRole::Assistant,
                content: Some(result.content),
                reasoning_content: result.reasoning,
            },
            finish_reason: FinishReason::Stop,
        }],
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use keygate_pool::{KeyPoolConfig, TieredKeySource};
    use keygate_protocol::chat::types::{ChatMessage, MessageContent};
    use keygate_translate::{RawUsage, UpstreamEvent};
    use serde_json::json;

    enum Script {
        Fail(InvokeError),
        Text(String),
        Stream(Vec<Result<UpstreamEvent, InvokeError>>),
    }

    struct ScriptedGateway {
        script: Script,
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn invoke(
            &self,
            _request: InvokeRequest,
            _credential: &str,
        ) -> Result<InvokeOutcome, InvokeError> {
            match &self.script {
                Script::Fail(err) => Err(err.clone()),
                Script::Text(content) => Ok(InvokeOutcome::Text(TextResult {
                    content: content.clone(),
                    reasoning: None,
                    usage: Some(RawUsage {
                        prompt_tokens: Some(json!(3)),
                        completion_tokens: Some(json!(2)),
                        total_tokens: None,
                    }),
                })),
                Script::Stream(events) => {
                    Ok(InvokeOutcome::Stream(Box::pin(futures_util::stream::iter(
                        events.clone(),
                    ))))
                }
            }
        }
    }

    fn request_body(model: &str, stream: bool) -> ChatCompletionRequestBody {
        ChatCompletionRequestBody {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: MessageContent::Text("hi".to_string()),
                name: None,
            }],
            stream: Some(stream),
            temperature: None,
            top_p: None,
            max_tokens: None,
            reasoning_effort: None,
            thinking: None,
            enable_thinking: None,
            thinking_budget: None,
        }
    }

    fn orchestrator(dir: &tempfile::TempDir, script: Script) -> Orchestrator {
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "sk-test-00000001\n").unwrap();
        let store = Arc::new(KeyStore::new(
            TieredKeySource::new(vec![path]),
            KeyPoolConfig::default(),
        ));
        Orchestrator::new(store, Arc::new(ScriptedGateway { script }))
    }

    async fn collect_frames(outcome: ChatOutcome) -> Vec<String> {
        match outcome {
            ChatOutcome::Stream(mut frames) => {
                let mut out = Vec::new();
                while let Some(frame) = frames.next().await {
                    out.push(String::from_utf8(frame.unwrap().to_vec()).unwrap());
                }
                out
            }
            ChatOutcome::Completion(_) => panic!("expected a stream outcome"),
        }
    }

    #[tokio::test]
    async fn batch_success_marks_key_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir, Script::Text("hello".to_string()));
        orch.store().reload().await;
        orch.store().mark_failure("sk-test-00000001");

        let outcome = orch
            .chat_completion(request_body("gpt-4o", false))
            .await
            .unwrap();
        let ChatOutcome::Completion(response) = outcome else {
            panic!("expected a batch outcome");
        };
        assert_eq!(response.model, "openai/gpt-4o");
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(response.choices[0].finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.unwrap().total_tokens, 5);
        assert!(response.id.starts_with("chatcmpl-"));

        let status = orch.store().detailed_status();
        assert_eq!(status[0].fail_count, 0);
        assert!(!status[0].cooling);
    }

    #[tokio::test]
    async fn rate_limited_failure_cools_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            Script::Fail(InvokeError::new(Some(429), "Too Many Requests")),
        );
        let err = orch
            .chat_completion(request_body("gpt-4o", false))
            .await
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(orch.store().stats().cooling, 1);
    }

    #[tokio::test]
    async fn generic_failure_leaves_key_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            Script::Fail(InvokeError::new(Some(500), "internal blowup")),
        );
        let err = orch
            .chat_completion(request_body("gpt-4o", false))
            .await
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::BAD_GATEWAY);
        assert_eq!(orch.store().stats().cooling, 0);
    }

    #[tokio::test]
    async fn empty_pool_is_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "# nothing usable\n").unwrap();
        let store = Arc::new(KeyStore::new(
            TieredKeySource::new(vec![path]),
            KeyPoolConfig::default(),
        ));
        let orch = Orchestrator::new(
            store,
            Arc::new(ScriptedGateway {
                script: Script::Text("unreachable".to_string()),
            }),
        );
        let err = orch
            .chat_completion(request_body("gpt-4o", false))
            .await
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn stream_emits_role_deltas_finish_and_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            Script::Stream(vec![
                Ok(UpstreamEvent::ReasoningDelta("mull".to_string())),
                Ok(UpstreamEvent::TextDelta(String::new())),
                Ok(UpstreamEvent::TextDelta("answer".to_string())),
                Ok(UpstreamEvent::Finish {
                    usage: Some(RawUsage {
                        prompt_tokens: Some(json!({"total": 4})),
                        completion_tokens: Some(json!({"count": 6})),
                        total_tokens: None,
                    }),
                }),
            ]),
        );
        let outcome = orch
            .chat_completion(request_body("claude-sonnet-4", true))
            .await
            .unwrap();
        let frames = collect_frames(outcome).await;

        assert_eq!(frames.len(), 5);
        assert!(frames[0].contains("\"role\":\"assistant\""));
        assert!(frames[1].contains("\"reasoning_content\":\"mull\""));
        assert!(frames[2].contains("\"content\":\"answer\""));
        assert!(frames[3].contains("\"finish_reason\":\"stop\""));
        assert!(frames[3].contains("\"total_tokens\":10"));
        assert_eq!(frames[4], "data: [DONE]\n\n");

        // Drained without error: key recorded healthy.
        assert_eq!(orch.store().stats().cooling, 0);
    }

    #[tokio::test]
    async fn stream_error_appends_marker_and_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            &dir,
            Script::Stream(vec![
                Ok(UpstreamEvent::TextDelta("partial".to_string())),
                Err(InvokeError::new(None, "quota exceeded")),
            ]),
        );
        let outcome = orch
            .chat_completion(request_body("gpt-4o", true))
            .await
            .unwrap();
        let frames = collect_frames(outcome).await;

        assert!(frames[1].contains("partial"));
        assert!(frames[2].contains("upstream error: quota exceeded"));
        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");

        // The quota message matched the rate/quota heuristic.
        assert_eq!(orch.store().stats().cooling, 1);
    }
}
