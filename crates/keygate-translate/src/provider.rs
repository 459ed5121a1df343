use serde::{Deserialize, Serialize};

/// Upstream model vendor behind the gateway. Closed set; anything the
/// gateway cannot name maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    Google,
    Xai,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Google => "google",
            Provider::Xai => "xai",
            Provider::Unknown => "unknown",
        }
    }

    fn from_prefix(prefix: &str) -> Provider {
        match prefix {
            "anthropic" => Provider::Anthropic,
            "openai" => Provider::OpenAi,
            "google" => Provider::Google,
            "xai" => Provider::Xai,
            _ => Provider::Unknown,
        }
    }
}

/// Ordered fragment table for bare model names. Order matters:
/// vendor-distinctive fragments come before the generic OpenAI ones.
const MODEL_FRAGMENTS: &[(&str, Provider)] = &[
    ("claude", Provider::Anthropic),
    ("gemini", Provider::Google),
    ("grok", Provider::Xai),
    ("gpt", Provider::OpenAi),
    ("o1", Provider::OpenAi),
    ("o3", Provider::OpenAi),
];

/// Infers the vendor for a bare model name. Defaults to OpenAI when
/// nothing matches.
pub fn infer_provider(name: &str) -> Provider {
    let lower = name.to_ascii_lowercase();
    for (fragment, provider) in MODEL_FRAGMENTS {
        if lower.contains(fragment) {
            return *provider;
        }
    }
    Provider::OpenAi
}

/// Splits a `provider/name` id; a bare name gets its provider
/// inferred and returned alongside the unchanged name.
pub fn split_gateway_model_id(model: &str) -> (Provider, &str) {
    match model.split_once('/') {
        Some((prefix, name)) => (Provider::from_prefix(prefix), name),
        None => (infer_provider(model), model),
    }
}

/// Normalizes a model id to the gateway's `provider/name` form.
/// Idempotent: ids that already carry a prefix pass through.
pub fn ensure_gateway_model_id(model: &str) -> String {
    if model.contains('/') {
        return model.to_string();
    }
    let provider = match infer_provider(model) {
        Provider::Unknown => Provider::OpenAi,
        provider => provider,
    };
    format!("{}/{}", provider.as_str(), model)
}
