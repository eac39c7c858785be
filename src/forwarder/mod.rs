use crate::error::{ProxyError, Result};
use crate::headers::redact;
use crate::metrics;
use axum::{
    body::Body,
    http::{header::SET_COOKIE, HeaderMap, Method, Response},
    response::IntoResponse,
};
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Issues the single upstream call for a proxied request
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl Forwarder {
    /// Create a forwarder for `base_url`. Redirects are never followed so
    /// upstream 3xx responses (and their cookies) reach the caller as-is.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ProxyError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Use a preconfigured client
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `<base>/<path>`, plus `?<query>` when one is given
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// Forward the request. Transport failures become a plain 500.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Response<Body> {
        let target = self.target_url(path, query);

        match self.send(method.clone(), &target, headers, body).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    method = %method,
                    upstream_url = %target,
                    error = %e,
                    "Upstream request failed"
                );
                e.into_response()
            }
        }
    }

    /// Send one request upstream and relay the response without buffering
    pub async fn send(
        &self,
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Response<Body>> {
        debug!(
            method = %method,
            upstream_url = %target,
            headers = ?redact(&headers),
            "Forwarding request"
        );

        let mut upstream_req = self.client.request(method, target).headers(headers);
        if let Some(body) = body {
            upstream_req = upstream_req.body(body);
        }

        let upstream = upstream_req.send().await.map_err(|e| {
            if e.is_timeout() {
                metrics::record_upstream_failure("timeout");
                ProxyError::Timeout(format!("Upstream request timed out: {}", e))
            } else if e.is_connect() {
                metrics::record_upstream_failure("connect");
                ProxyError::Upstream(format!("Failed to connect to upstream: {}", e))
            } else {
                metrics::record_upstream_failure("request");
                ProxyError::Upstream(format!("Upstream request failed: {}", e))
            }
        })?;

        let status = upstream.status();
        debug!(
            status = %status,
            set_cookies = upstream.headers().get_all(SET_COOKIE).iter().count(),
            headers = ?redact(upstream.headers()),
            "Upstream response"
        );

        let mut response_builder = Response::builder().status(status);

        // Copy response headers, all values of repeated ones included
        for (name, value) in upstream.headers().iter() {
            if !is_hop_by_hop_header(name.as_str()) {
                response_builder = response_builder.header(name, value);
            }
        }

        let stream = upstream
            .bytes_stream()
            .inspect_err(|e| warn!(error = %e, "Upstream body stream interrupted"));

        response_builder
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::Internal(format!("Failed to build response: {}", e)))
    }
}

/// Check if a header is a hop-by-hop header that should not be relayed
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}
