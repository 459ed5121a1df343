use bytes::Bytes;
use http::{HeaderMap, StatusCode};

#[derive(Debug)]
pub struct AuthError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl AuthError {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

pub trait AuthProvider: Send + Sync {
    #[allow(clippy::result_large_err)]
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError>;
}

#[derive(Debug, Default)]
pub struct NoopAuth;

impl AuthProvider for NoopAuth {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Single static bearer token covering the whole surface.
#[derive(Debug)]
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AuthProvider for StaticTokenAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let token = extract_api_key(headers)
            .ok_or_else(|| AuthError::new(StatusCode::UNAUTHORIZED, "missing api key"))?;
        if token != self.token {
            return Err(AuthError::new(StatusCode::FORBIDDEN, "invalid api key"));
        }
        Ok(())
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = header_value(headers, "x-api-key") {
        return Some(value);
    }

    let auth = header_value(headers, "authorization")?;
    let auth = auth.trim();
    let prefix = "Bearer ";
    if auth.len() > prefix.len() && auth[..prefix.len()].eq_ignore_ascii_case(prefix) {
        return Some(auth[prefix.len()..].trim().to_string());
    }
    None
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}
