use async_trait::async_trait;
use futures_util::stream::BoxStream;

use keygate_protocol::chat::types::ChatMessage;
use keygate_translate::{GenerationControls, Provider, ProviderOptions, RawUsage, UpstreamEvent};

/// Outbound call handed to the external model-call collaborator.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub provider: Provider,
    /// Normalized `provider/name` id.
    pub gateway_model: String,
    pub messages: Vec<ChatMessage>,
    pub controls: GenerationControls,
    pub provider_options: Option<ProviderOptions>,
    pub stream: bool,
}

/// Failure reported by the gateway collaborator. The status is the
/// HTTP-equivalent code when one exists; transport errors carry none.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct InvokeError {
    pub status: Option<u16>,
    pub message: String,
}

impl InvokeError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Final text result of a non-streaming call.
#[derive(Debug, Clone)]
pub struct TextResult {
    pub content: String,
    pub reasoning: Option<String>,
    pub usage: Option<RawUsage>,
}

pub type EventStream = BoxStream<'static, Result<UpstreamEvent, InvokeError>>;

pub enum InvokeOutcome {
    Text(TextResult),
    Stream(EventStream),
}

/// The black-box `invokeModel` collaborator: yields either a final
/// text or an async sequence of delta/finish events.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(
        &self,
        request: InvokeRequest,
        credential: &str,
    ) -> Result<InvokeOutcome, InvokeError>;
}
