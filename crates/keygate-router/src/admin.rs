use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};

use crate::AppState;

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/pool/stats", get(pool_stats))
        .route("/pool/status", get(pool_status))
        .route("/pool/reload", post(pool_reload))
        .route("/pool/reset", post(pool_reset))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth))
        .with_state(state)
}

async fn admin_auth(
    State(state): State<AppState>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if let Err(err) = state.auth.authenticate(req.headers()) {
        return Err((err.status, err.body).into_response());
    }
    Ok(next.run(req).await)
}

async fn pool_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.stats())
}

/// Per-key view with masked secrets.
async fn pool_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "keys": state.store.detailed_status() }))
}

async fn pool_reload(State(state): State<AppState>) -> impl IntoResponse {
    state.store.reload().await;
    (StatusCode::OK, Json(serde_json::json!({ "ok": true, "stats": state.store.stats() })))
}

async fn pool_reset(State(state): State<AppState>) -> impl IntoResponse {
    state.store.reset_all();
    (StatusCode::OK, Json(serde_json::json!({ "ok": true, "stats": state.store.stats() })))
}
