//! Session presence checks and the redirect-to-login guard.
//!
//! The proxy serves no pages of its own: a request that passes the guard
//! reaches the application's fallback (404 here). The guard is meant for a
//! deployment where the page routes are merged into the same router, or
//! where this binary fronts them; on its own it only decides between the
//! login redirect and pass-through.

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::headers::{cookie_entries, cookie_name};
use crate::metrics;
use crate::router::RouteMatcher;
use axum::{
    extract::{Request, State},
    http::{header::COOKIE, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::{ExposeSecret, Secret, SecretString};
use std::sync::Arc;
use tracing::debug;

/// Cookie carrying the session token; must start with
/// [`crate::headers::SESSION_COOKIE_PREFIX`] or it would never be forwarded.
pub const SESSION_TOKEN_COOKIE: &str = "__Secure-neon-auth.session_token";

/// Session token read from the caller's cookies
#[derive(Debug, Clone)]
pub struct SessionCookie {
    token: SecretString,
}

impl SessionCookie {
    /// Find a non-empty session token in any `Cookie` header line
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(COOKIE)
            .iter()
            .flat_map(|v| cookie_entries(v.as_bytes()))
            .filter(|entry| cookie_name(entry) == SESSION_TOKEN_COOKIE.as_bytes())
            .map(|entry| &entry[SESSION_TOKEN_COOKIE.len()..])
            .filter_map(|rest| rest.strip_prefix(b"="))
            .find(|value| !value.is_empty())
            .map(|value| Self {
                token: Secret::new(String::from_utf8_lossy(value).into_owned()),
            })
    }

    pub fn token_len(&self) -> usize {
        self.token.expose_secret().len()
    }
}

/// Redirects requests for guarded routes to the login page when no session
/// cookie is present.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    matcher: RouteMatcher,
    login_url: String,
    login_path: Option<String>,
    auth_prefix: String,
}

impl SessionGuard {
    pub fn new(
        matcher: RouteMatcher,
        login_url: impl Into<String>,
        auth_prefix: impl Into<String>,
    ) -> Self {
        let login_url = login_url.into();
        let login_path = login_url
            .starts_with('/')
            .then(|| login_url.split(&['?', '#'][..]).next().unwrap_or_default().to_string());

        Self {
            matcher,
            login_url,
            login_path,
            auth_prefix: auth_prefix.into(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let matcher = RouteMatcher::new(&config.guard.matched_routes)?;
        Ok(Self::new(
            matcher,
            config.guard.login_url.clone(),
            config.auth.prefix.clone(),
        ))
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Guarded pattern for `path`; auth routes and the login page are never guarded
    pub fn guarded_pattern(&self, path: &str) -> Option<&str> {
        if self.is_auth_path(path) || self.login_path.as_deref() == Some(path) {
            return None;
        }

        self.matcher.matches(path)
    }

    fn is_auth_path(&self, path: &str) -> bool {
        path.strip_prefix(self.auth_prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Middleware enforcing [`SessionGuard`]
pub async fn session_guard(
    State(guard): State<Arc<SessionGuard>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(pattern) = guard.guarded_pattern(req.uri().path()) {
        match SessionCookie::from_headers(req.headers()) {
            Some(session) => debug!(
                path = %req.uri().path(),
                pattern = %pattern,
                token_len = session.token_len(),
                "Session cookie present"
            ),
            None => {
                debug!(
                    path = %req.uri().path(),
                    pattern = %pattern,
                    login_url = %guard.login_url(),
                    "No session cookie, redirecting to login"
                );
                metrics::record_guard_redirect(pattern);
                return Redirect::temporary(guard.login_url()).into_response();
            }
        }
    }

    next.run(req).await
}
