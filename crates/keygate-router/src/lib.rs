//! HTTP surface: the OpenAI-compatible proxy route plus the admin
//! pool-management routes.

pub mod admin;
pub mod proxy;

use std::sync::Arc;

use axum::Router;

use keygate_core::{AuthProvider, Orchestrator};
use keygate_pool::KeyStore;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<KeyStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(proxy::proxy_router(state.clone()))
        .nest("/admin", admin::admin_router(state))
}
