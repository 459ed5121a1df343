use bytes::Bytes;
use http::StatusCode;

/// Error surfaced at the HTTP boundary, already shaped as an
/// OpenAI-style error body.
#[derive(Debug)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    fn json(status: StatusCode, kind: &str, message: &str) -> Self {
        let body = serde_json::json!({
            "error": { "type": kind, "message": message }
        });
        Self {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::json(StatusCode::BAD_REQUEST, "invalid_request_error", message)
    }

    pub fn service_unavailable(message: &str) -> Self {
        Self::json(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
    }

    pub fn rate_limited(message: &str) -> Self {
        Self::json(StatusCode::TOO_MANY_REQUESTS, "rate_limit_error", message)
    }

    pub fn upstream(message: &str) -> Self {
        Self::json(StatusCode::BAD_GATEWAY, "upstream_error", message)
    }
}
