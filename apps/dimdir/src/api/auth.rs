//! # Authentication Module
//!
//! Bearer API key for the HTTP API. Enabled when `DIMDIR_API_KEY` is set;
//! `/health` stays open for load balancer checks.
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The configured key, shared by every request.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Token from `Authorization`, with or without the `Bearer ` prefix.
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// Constant-time key comparison.
///
/// Both sides are padded to a common length so the comparison always runs
/// over the same number of bytes; the length check comes after.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let len = provided.len().max(expected.len());
    let mut a = vec![0u8; len];
    let mut b = vec![0u8; len];
    a[..provided.len()].copy_from_slice(provided);
    b[..expected.len()].copy_from_slice(expected);
    let same: bool = a.ct_eq(&b).into();
    same && provided.len() == expected.len()
}

pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    match presented_token(request.headers()) {
        Some(token) if keys_match(token.as_bytes(), key.0.as_bytes()) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                "Authentication failed: invalid API key"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn key_comparison() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secret", b"secreT"));
        assert!(!keys_match(b"secret", b"secret\0"));
        assert!(!keys_match(b"", b"secret"));
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer k1"));
        assert_eq!(presented_token(&headers), Some("k1"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("k2"));
        assert_eq!(presented_token(&headers), Some("k2"));
    }

    #[test]
    fn debug_redacts_key() {
        assert!(!format!("{:?}", ApiKey::new("hunter2")).contains("hunter2"));
    }
}
