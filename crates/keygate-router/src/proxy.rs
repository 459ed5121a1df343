use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;

use keygate_core::{ChatOutcome, ProxyError};
use keygate_protocol::chat::request::ChatCompletionRequestBody;

use crate::AppState;

pub fn proxy_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
}

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = state.auth.authenticate(&headers) {
        return (err.status, err.body).into_response();
    }

    let request: ChatCompletionRequestBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(ProxyError::bad_request(&format!(
                "invalid request body: {err}"
            )));
        }
    };

    match state.orchestrator.chat_completion(request).await {
        Ok(ChatOutcome::Completion(response)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            serde_json::to_vec(&response).unwrap_or_default(),
        )
            .into_response(),
        Ok(ChatOutcome::Stream(frames)) => {
            let mut response = Response::new(Body::from_stream(frames));
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/event-stream"),
            );
            headers.insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static("no-cache"),
            );
            headers.insert(
                header::CONNECTION,
                header::HeaderValue::from_static("keep-alive"),
            );
            response
        }
        Err(err) => error_response(err),
    }
}

fn error_response(err: ProxyError) -> Response {
    (
        err.status,
        [(header::CONTENT_TYPE, "application/json")],
        err.body,
    )
        .into_response()
}
