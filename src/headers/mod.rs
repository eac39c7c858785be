//! Outbound header computation for the auth upstream.
//!
//! Only a fixed safelist of inbound headers crosses the boundary, only
//! session cookies are forwarded, and `Origin` is always set so the auth
//! service can run its origin checks against the browser-facing origin.

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT},
    HeaderMap, HeaderName, HeaderValue,
};
use url::Url;

/// Name prefix of the cookies owned by the auth service
pub const SESSION_COOKIE_PREFIX: &str = "__Secure-neon-auth";

/// Inbound headers copied verbatim when present
pub static FORWARDED_HEADERS: [HeaderName; 3] = [USER_AGENT, AUTHORIZATION, REFERER];

static SENSITIVE_HEADERS: [HeaderName; 3] = [COOKIE, AUTHORIZATION, SET_COOKIE];

/// Compute the exact header set sent upstream.
///
/// Always contains `content-type: application/json`, `origin` and `cookie`
/// (empty when the caller sent no session cookie, so a stale session is
/// never forwarded implicitly).
pub fn compute_outbound_headers(inbound: &HeaderMap, request_url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(FORWARDED_HEADERS.len() + 3);

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for name in FORWARDED_HEADERS.iter() {
        if let Some(value) = inbound.get(name).filter(|v| !v.is_empty()) {
            headers.insert(name.clone(), value.clone());
        }
    }

    headers.insert(ORIGIN, resolve_origin(inbound, request_url));
    headers.insert(COOKIE, session_cookie_header(inbound));

    headers
}

/// Origin in priority order: inbound `Origin`, scheme+host of `Referer`,
/// origin of the request's own URL.
pub fn resolve_origin(inbound: &HeaderMap, request_url: &Url) -> HeaderValue {
    if let Some(origin) = inbound.get(ORIGIN).filter(|v| !v.is_empty()) {
        return origin.clone();
    }

    let from_referer = inbound
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .map(origin_from_referer)
        .filter(|origin| !origin.is_empty())
        .and_then(|origin| HeaderValue::from_str(&origin).ok());
    if let Some(origin) = from_referer {
        return origin;
    }

    HeaderValue::from_str(&request_url.origin().ascii_serialization())
        .unwrap_or_else(|_| HeaderValue::from_static("null"))
}

/// First three `/`-delimited parts of a referer, e.g.
/// `https://app.example.com:8443/page?q` -> `https://app.example.com:8443`
pub fn origin_from_referer(referer: &str) -> String {
    referer.split('/').take(3).collect::<Vec<_>>().join("/")
}

/// Keep only `;`-separated entries whose name starts with the session prefix,
/// in their original order, joined with `;`.
pub fn filter_session_cookies(cookie_header: &str) -> String {
    let kept = join_entries(session_entries(cookie_header.as_bytes()));
    // Entries are split on ASCII bytes, so they stay valid UTF-8
    String::from_utf8_lossy(&kept).into_owned()
}

// Cookie lines are handled as bytes: a non-UTF-8 value in an unrelated
// cookie must not hide the session cookie next to it.
fn session_cookie_header(inbound: &HeaderMap) -> HeaderValue {
    let kept = join_entries(
        inbound
            .get_all(COOKIE)
            .iter()
            .flat_map(|v| session_entries(v.as_bytes())),
    );

    HeaderValue::from_bytes(&kept).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn session_entries(cookie_header: &[u8]) -> impl Iterator<Item = &[u8]> {
    cookie_entries(cookie_header)
        .filter(|entry| cookie_name(entry).starts_with(SESSION_COOKIE_PREFIX.as_bytes()))
}

fn join_entries<'a>(entries: impl Iterator<Item = &'a [u8]>) -> Vec<u8> {
    entries.collect::<Vec<_>>().join(&b';')
}

/// Trimmed `;`-separated entries of one `Cookie` header line
pub(crate) fn cookie_entries(cookie_header: &[u8]) -> impl Iterator<Item = &[u8]> {
    cookie_header.split(|b| *b == b';').map(<[u8]>::trim_ascii)
}

/// Cookie name: the part before the first `=`, or the whole entry
pub(crate) fn cookie_name(entry: &[u8]) -> &[u8] {
    entry
        .iter()
        .position(|b| *b == b'=')
        .map_or(entry, |eq| &entry[..eq])
}

/// Render headers for logs with credential-bearing values masked
pub fn redact(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| {
            if SENSITIVE_HEADERS.contains(name) {
                format!("{}: <redacted>", name)
            } else {
                format!("{}: {}", name, value.to_str().unwrap_or("<binary>"))
            }
        })
        .collect()
}
