//! 共享令牌认证。
//!
//! 未配置令牌时所有请求放行，仅适用于开发环境。

use axum::http::HeaderMap;
use tracing::warn;

use crate::config::UPLOAD_TOKEN_HEADER;
use crate::error::ApiError;

#[derive(Debug, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl AuthConfig {
    /// Empty tokens count as unset.
    pub fn new(token: &str) -> Self {
        let token = token.trim();
        Self {
            token: (!token.is_empty()).then(|| token.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

/// 校验请求头中的令牌。
pub fn authorize(configured: Option<&str>, provided: Option<&str>) -> bool {
    let Some(expected) = configured.filter(|token| !token.is_empty()) else {
        return true;
    };
    let provided = provided.map(str::trim).unwrap_or_default();
    if provided.is_empty() {
        return false;
    }
    constant_time_eq(provided.as_bytes(), expected.as_bytes())
}

/// 处理器内的认证检查，失败返回 401。
pub fn ensure_authorized(auth: &AuthConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get(UPLOAD_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if authorize(auth.token.as_deref(), provided) {
        return Ok(());
    }
    warn!(token_present = provided.is_some(), "rejected upload token");
    Err(ApiError::Unauthorized)
}

/// Compares two byte strings without short-circuiting on content or length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = (a.len() ^ b.len()) as u64;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= u64::from(x ^ y);
    }
    std::hint::black_box(diff) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn unset_token_authorizes_everything() {
        assert!(authorize(None, None));
        assert!(authorize(Some(""), None));
        assert!(authorize(None, Some("anything")));
    }

    #[test]
    fn configured_token_requires_exact_match() {
        assert!(authorize(Some("s3cret"), Some("s3cret")));
        assert!(authorize(Some("s3cret"), Some("  s3cret\t")));
        assert!(!authorize(Some("s3cret"), None));
        assert!(!authorize(Some("s3cret"), Some("   ")));
        assert!(!authorize(Some("s3cret"), Some("s3cre")));
        assert!(!authorize(Some("s3cret"), Some("s3cret2")));
        assert!(!authorize(Some("s3cret"), Some("S3CRET")));
    }

    #[test]
    fn constant_time_eq_matches_slice_equality() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abc\0"));
        assert!(!constant_time_eq(b"", b"a"));
    }

    #[test]
    fn ensure_authorized_reads_upload_token_header() {
        let auth = AuthConfig::new("s3cret");
        assert!(auth.is_enabled());

        let mut headers = HeaderMap::new();
        assert!(matches!(
            ensure_authorized(&auth, &headers),
            Err(ApiError::Unauthorized)
        ));

        headers.insert("X-Upload-Token", HeaderValue::from_static("s3cret"));
        assert!(ensure_authorized(&auth, &headers).is_ok());
    }

    #[test]
    fn blank_configured_token_disables_auth() {
        let auth = AuthConfig::new("  ");
        assert!(!auth.is_enabled());
        assert!(ensure_authorized(&auth, &HeaderMap::new()).is_ok());
    }
}
