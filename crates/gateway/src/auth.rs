use std::sync::Arc;

use {
    axum::{
        extract::{Request, State},
        http::header::AUTHORIZATION,
        middleware::Next,
        response::{IntoResponse, Response},
    },
    subtle::ConstantTimeEq,
    tracing::debug,
};

use crate::{error::ApiError, state::GatewayState};

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No key configured; every request is let through.
    Open,
    Bearer,
}

/// Resolved API auth configuration.
#[derive(Debug, Clone)]
pub struct ResolvedAuth {
    pub mode: AuthMode,
    api_key: Option<String>,
}

/// Result of an authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub ok: bool,
    pub reason: Option<&'static str>,
}

impl AuthResult {
    fn allow() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn deny(reason: &'static str) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// An empty or missing key means open access.
pub fn resolve_auth(api_key: Option<&str>) -> ResolvedAuth {
    match api_key.filter(|k| !k.is_empty()) {
        Some(key) => ResolvedAuth {
            mode: AuthMode::Bearer,
            api_key: Some(key.to_string()),
        },
        None => ResolvedAuth {
            mode: AuthMode::Open,
            api_key: None,
        },
    }
}

/// Check an `Authorization` header value against the configured key.
pub fn authorize(auth: &ResolvedAuth, header: Option<&str>) -> AuthResult {
    let Some(expected) = auth.api_key.as_deref() else {
        return AuthResult::allow();
    };
    let Some(header) = header else {
        return AuthResult::deny("token_missing");
    };
    let Some(given) = header.strip_prefix("Bearer ") else {
        return AuthResult::deny("invalid_scheme");
    };
    if !safe_equal(given.trim(), expected) {
        return AuthResult::deny("token_mismatch");
    }
    AuthResult::allow()
}

/// Route layer guarding the `/api/*` routes.
pub async fn require_bearer(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let result = authorize(&state.auth, header);
    if !result.ok {
        debug!(
            path = %request.uri().path(),
            reason = result.reason.unwrap_or("unknown"),
            "rejected unauthenticated request"
        );
        return ApiError::unauthorized().into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_when_no_key() {
        for key in [None, Some("")] {
            let auth = resolve_auth(key);
            assert_eq!(auth.mode, AuthMode::Open);
            assert!(authorize(&auth, None).ok);
            assert!(authorize(&auth, Some("Bearer anything")).ok);
        }
    }

    #[test]
    fn bearer_match() {
        let auth = resolve_auth(Some("s3cret"));
        assert_eq!(auth.mode, AuthMode::Bearer);
        assert!(authorize(&auth, Some("Bearer s3cret")).ok);
    }

    #[test]
    fn bearer_rejections() {
        let auth = resolve_auth(Some("s3cret"));
        let cases = [
            (None, "token_missing"),
            (Some("s3cret"), "invalid_scheme"),
            (Some("Basic s3cret"), "invalid_scheme"),
            (Some("Bearer wrong!"), "token_mismatch"),
            (Some("Bearer s3cre"), "token_mismatch"),
        ];
        for (header, reason) in cases {
            let result = authorize(&auth, header);
            assert!(!result.ok, "{header:?}");
            assert_eq!(result.reason, Some(reason));
        }
    }

    #[test]
    fn safe_equal_basics() {
        assert!(safe_equal("abc", "abc"));
        assert!(!safe_equal("abc", "abd"));
        assert!(!safe_equal("abc", "abcd"));
    }
}
