//! Request orchestration: key selection, parameter translation,
//! the outbound gateway call, outcome classification, and outbound
//! wire formatting.

pub mod auth;
pub mod classify;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod upstream_client;

pub use auth::{AuthError, AuthProvider, NoopAuth, StaticTokenAuth};
pub use classify::{FailureKind, classify_failure};
pub use error::ProxyError;
pub use gateway::{EventStream, InvokeError, InvokeOutcome, InvokeRequest, ModelGateway, TextResult};
pub use orchestrator::{ChatOutcome, Orchestrator};
pub use upstream_client::{GatewayClientConfig, WreqModelGateway};
