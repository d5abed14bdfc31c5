//! Authenticated identity boundary.
//!
//! Authentication itself happens upstream (a reverse proxy or SSO gateway);
//! this service trusts the identity headers that proxy injects.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity {
    /// Stable unique key.
    pub key: String,
    pub email: String,
}

impl Identity {
    pub fn new(key: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            email: email.into(),
        }
    }
}

/// Resolves the identity behind a request.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in identity, if any.
    fn current_identity(&self, headers: &HeaderMap) -> Option<Identity>;

    /// Where to send an unauthenticated user so they come back to `return_path`.
    fn login_url(&self, return_path: &str) -> String;
}

/// Identity header configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub user_header: String,
    pub email_header: String,
    pub login_url: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_header: "x-auth-user".to_string(),
            email_header: "x-auth-email".to_string(),
            login_url: "/login".to_string(),
        }
    }
}

impl IdentityConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_header: std::env::var("REMINDER_AUTH_USER_HEADER")
                .unwrap_or(defaults.user_header)
                .to_lowercase(),
            email_header: std::env::var("REMINDER_AUTH_EMAIL_HEADER")
                .unwrap_or(defaults.email_header)
                .to_lowercase(),
            login_url: std::env::var("REMINDER_LOGIN_URL").unwrap_or(defaults.login_url),
        }
    }
}

/// Reads the identity from headers set by a trusted authenticating proxy.
pub struct HeaderIdentityProvider {
    config: IdentityConfig,
}

impl HeaderIdentityProvider {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }
}

impl IdentityProvider for HeaderIdentityProvider {
    fn current_identity(&self, headers: &HeaderMap) -> Option<Identity> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let key = header(&self.config.user_header)?;
        let email = header(&self.config.email_header)?;
        Some(Identity::new(key, email))
    }

    fn login_url(&self, return_path: &str) -> String {
        let sep = if self.config.login_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{sep}continue={}",
            self.config.login_url,
            encode_query_value(return_path)
        )
    }
}

fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn secrets_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Anything that can hand out an identity provider (the web state does).
pub trait HasIdentityProvider {
    fn identity_provider(&self) -> &dyn IdentityProvider;
}

/// Extractor for routes that require a signed-in user.
pub struct CurrentUser(pub Identity);

/// Rejection returned to unauthenticated callers.
#[derive(Debug, Serialize)]
pub struct LoginRequired {
    pub error: &'static str,
    pub login_url: String,
}

impl IntoResponse for LoginRequired {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: HasIdentityProvider + Send + Sync,
{
    type Rejection = LoginRequired;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let provider = state.identity_provider();
        match provider.current_identity(&parts.headers) {
            Some(identity) => Ok(CurrentUser(identity)),
            None => {
                let path = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(LoginRequired {
                    error: "login required",
                    login_url: provider.login_url(path),
                })
            }
        }
    }
}
