//! Translation layer between the unified request shape and the
//! provider-specific parameter sets the vendor gateway expects, plus
//! the state machine that normalizes upstream token streams.

pub mod params;
pub mod provider;
pub mod stream;

pub use params::{
    GenerationControls, ProviderOptions, generation_controls, resolve_thinking_budget,
    translate_options,
};
pub use provider::{Provider, ensure_gateway_model_id, infer_provider, split_gateway_model_id};
pub use stream::{RawUsage, StreamItem, StreamReassembler, UpstreamEvent, UsageTotals, token_count};
