use crate::error::{ProxyError, Result};
use matchit::Router as MatchitRouter;

/// Upstream-relative path captured below the auth prefix
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthPath {
    segments: Vec<String>,
}

impl AuthPath {
    /// Resolve the raw request path (still percent-encoded) below `prefix`.
    ///
    /// `/api/auth` resolves to zero segments, `/api/auth/v1/session` to
    /// `["v1", "session"]`. A single trailing slash is dropped.
    pub fn from_request_path(prefix: &str, path: &str) -> Result<Self> {
        let tail = path
            .strip_prefix(prefix)
            .ok_or_else(|| ProxyError::InvalidPath(path.to_string()))?;

        let tail = if tail.is_empty() {
            tail
        } else {
            tail.strip_prefix('/')
                .ok_or_else(|| ProxyError::InvalidPath(path.to_string()))?
        };

        let tail = tail.strip_suffix('/').unwrap_or(tail);
        if tail.is_empty() {
            return Ok(Self::default());
        }

        Self::from_segments(tail.split('/').map(str::to_string).collect())
            .map_err(|_| ProxyError::InvalidPath(path.to_string()))
    }

    /// Build from already captured segments, rejecting ones that would
    /// produce a malformed upstream URL or escape the upstream base path.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        for segment in &segments {
            if segment.is_empty() {
                return Err(ProxyError::InvalidPath("empty path segment".to_string()));
            }
            if is_dot_segment(segment) {
                return Err(ProxyError::InvalidPath(format!(
                    "dot segment '{}' is not allowed",
                    segment
                )));
            }
            if segment.contains('\\') {
                return Err(ProxyError::InvalidPath(format!(
                    "backslash in segment '{}' is not allowed",
                    segment
                )));
            }
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Join the segments with `/`; zero segments join to the empty string
    pub fn join(&self) -> String {
        self.segments.join("/")
    }
}

/// `.` and `..` in any percent-encoded spelling; URL parsers normalize all of them
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Matches request paths against configured route patterns
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    /// Path-based router using matchit; the value is the configured pattern
    matcher: MatchitRouter<String>,
    patterns: Vec<String>,
}

impl RouteMatcher {
    /// Compile route patterns (`/dashboard`, `/orgs/:id`, `/account/*rest`)
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut matcher = MatchitRouter::new();
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !pattern.starts_with('/') {
                return Err(ProxyError::InvalidRoute(format!(
                    "Route pattern must start with '/': {}",
                    pattern
                )));
            }

            // Convert path syntax from :param to {param} and *path to {*path}
            let matchit_path = convert_path_syntax(pattern);

            matcher
                .insert(matchit_path, pattern.to_string())
                .map_err(|e| {
                    ProxyError::InvalidRoute(format!("Failed to insert route '{}': {}", pattern, e))
                })?;
            compiled.push(pattern.to_string());
        }

        Ok(Self {
            matcher,
            patterns: compiled,
        })
    }

    /// The configured pattern matching `path`, if any
    pub fn matches(&self, path: &str) -> Option<&str> {
        self.matcher.at(path).ok().map(|matched| matched.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Convert path syntax from Express-style (:param, *path) to matchit syntax ({param}, {*path})
fn convert_path_syntax(path: &str) -> String {
    let mut result = String::with_capacity(path.len() + 4);
    let mut chars = path.chars().peekable();

    while let Some(ch) = chars.next() {
        let open = match ch {
            ':' => "{",
            '*' => "{*",
            _ => {
                result.push(ch);
                continue;
            }
        };

        result.push_str(open);
        while let Some(&next_ch) = chars.peek() {
            if next_ch.is_alphanumeric() || next_ch == '_' {
                result.push(next_ch);
                chars.next();
            } else {
                break;
            }
        }
        result.push('}');
    }

    result
}
