use crate::config::{AuthConfig, ProxyConfig};
use crate::error::{ProxyError, Result};
use crate::forwarder::Forwarder;
use crate::headers::{compute_outbound_headers, redact};
use crate::metrics;
use crate::router::AuthPath;
use axum::{
    body::Body,
    extract::State,
    http::{header::HOST, request::Parts, uri::Authority, HeaderMap, Method, Request, Response},
    response::IntoResponse,
    routing::{get, MethodRouter},
    Router,
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Proxy handler state; everything in it is immutable after startup
#[derive(Clone)]
pub struct ProxyState {
    pub forwarder: Forwarder,
    pub auth: Arc<AuthConfig>,
    /// Authority used to rebuild the request URL when no `Host` header is present
    pub fallback_authority: Arc<str>,
}

impl ProxyState {
    pub fn new(forwarder: Forwarder, auth: AuthConfig, fallback_authority: &str) -> Self {
        Self {
            forwarder,
            auth: Arc::new(auth),
            fallback_authority: Arc::from(fallback_authority),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let timeout = config.auth.timeout_secs.map(Duration::from_secs);
        let forwarder = Forwarder::new(&config.auth.base_url, timeout)?;

        Ok(Self::new(
            forwarder,
            config.auth.clone(),
            &config.server.bind_address(),
        ))
    }
}

/// Per-request view of the inbound call
#[derive(Debug)]
pub struct IncomingRequest {
    pub method: Method,
    pub path: AuthPath,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Query string exactly as it appeared in the request target
    pub query: Option<String>,
    /// Absolute URL the caller addressed, used for the origin fallback
    pub url: Url,
}

impl IncomingRequest {
    /// Resolve the path below the auth prefix and buffer the body
    pub async fn from_request(req: Request<Body>, state: &ProxyState) -> Result<Self> {
        let (parts, body) = req.into_parts();

        let path = AuthPath::from_request_path(&state.auth.prefix, parts.uri.path())?;
        let url = request_url(&parts, &state.fallback_authority)?;
        let query = parts.uri.query().map(str::to_string);
        let body = read_body(body, state.auth.max_body_bytes).await?;

        Ok(Self {
            method: parts.method,
            path,
            headers: parts.headers,
            body,
            query,
            url,
        })
    }
}

/// Rebuild the absolute request URL from the URI, `Host` and `X-Forwarded-Proto`
fn request_url(parts: &Parts, fallback_authority: &str) -> Result<Url> {
    let uri = &parts.uri;

    let scheme = uri
        .scheme_str()
        .or_else(|| {
            parts
                .headers
                .get(FORWARDED_PROTO)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|proto| *proto == "http" || *proto == "https")
        })
        .unwrap_or("http");

    // A Host that is not a bare authority could smuggle a path or query into the URL
    let authority = uri
        .authority()
        .map(|a| a.as_str())
        .or_else(|| {
            parts
                .headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .filter(|host| host.parse::<Authority>().is_ok())
        })
        .unwrap_or(fallback_authority);

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Url::parse(&format!("{}://{}{}", scheme, authority, path_and_query))
        .or_else(|_| Url::parse(&format!("{}://{}{}", scheme, fallback_authority, path_and_query)))
        .map_err(|e| ProxyError::InvalidPath(format!("{}: {}", uri, e)))
}

/// Buffer the inbound body; an empty body is forwarded as no body
async fn read_body(body: Body, limit: usize) -> Result<Option<Bytes>> {
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ProxyError::PayloadTooLarge(limit)
            } else {
                ProxyError::Internal(format!("Failed to read request body: {}", e))
            }
        })?
        .to_bytes();

    Ok((!bytes.is_empty()).then_some(bytes))
}

/// Handler bound to every supported verb below the auth prefix
#[axum::debug_handler]
pub async fn auth_proxy_handler(
    State(state): State<ProxyState>,
    req: Request<Body>,
) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let timer = metrics::Timer::new(method.to_string(), path.clone());

    info!(method = %method, path = %path, "Incoming request");

    let response = match proxy_request(&state, req).await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, path = %path, "Rejected request");
            e.into_response()
        }
    };

    info!(
        status = %response.status(),
        latency_ms = timer.elapsed() * 1000.0,
        "Request completed"
    );
    timer.record(response.status().as_u16());

    response
}

/// receive -> filter headers -> forward -> relay
async fn proxy_request(state: &ProxyState, req: Request<Body>) -> Result<Response<Body>> {
    let incoming = IncomingRequest::from_request(req, state).await?;

    let headers = compute_outbound_headers(&incoming.headers, &incoming.url);
    debug!(
        upstream_path = %incoming.path.join(),
        headers = ?redact(&headers),
        body_bytes = incoming.body.as_ref().map_or(0, Bytes::len),
        "Computed outbound request"
    );

    let query = if state.auth.forward_query {
        incoming.query.as_deref()
    } else {
        None
    };

    Ok(state
        .forwarder
        .forward(incoming.method, &incoming.path.join(), query, headers, incoming.body)
        .await)
}

/// One adapter per supported verb; other verbs get 405 from the method router
fn verb_adapters() -> MethodRouter<ProxyState> {
    get(auth_proxy_handler)
        .post(auth_proxy_handler)
        .put(auth_proxy_handler)
        .delete(auth_proxy_handler)
        .patch(auth_proxy_handler)
}

/// Routes for `<prefix>` and `<prefix>/*path`
pub fn auth_routes(state: ProxyState) -> Router {
    let prefix = state.auth.prefix.clone();

    Router::new()
        .route(&prefix, verb_adapters())
        .route(&format!("{}/*path", prefix), verb_adapters())
        .with_state(state)
}
