pub mod config;
pub mod error;
pub mod forwarder;
pub mod headers;
pub mod metrics;
pub mod observability;
pub mod proxy;
pub mod router;
pub mod session;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::proxy::{auth_routes, ProxyState};
use crate::session::{session_guard, SessionGuard};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    routing::get,
    Router as AxumRouter,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub use crate::observability::init_tracing;

/// Assemble the application from its parts
pub fn app(state: ProxyState, guard: SessionGuard) -> AxumRouter {
    AxumRouter::new()
        .merge(auth_routes(state))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(Arc::new(guard), session_guard))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(observability::request_id_middleware)),
        )
}

/// Build the application described by `config`
pub fn build_app(config: &ProxyConfig) -> Result<AxumRouter> {
    config.validate()?;

    let state = ProxyState::from_config(config)?;
    let guard = SessionGuard::from_config(config)?;

    Ok(app(state, guard))
}

/// Initialize and run the proxy server until shutdown
pub async fn init_proxy(config: ProxyConfig) -> Result<()> {
    config.validate()?;

    info!("Starting auth proxy");
    info!(
        upstream = %config.auth.base_url,
        prefix = %config.auth.prefix,
        forward_query = config.auth.forward_query,
        guarded_routes = config.guard.matched_routes.len(),
        "Proxy configured"
    );

    let mut app = build_app(&config)?;

    if config.metrics.enabled {
        let metrics_service = MetricsService::new()?;
        app = app.merge(
            AxumRouter::new()
                .route(&config.metrics.path, get(metrics_handler))
                .with_state(metrics_service),
        );
        info!(path = %config.metrics.path, "Metrics endpoint enabled");
    }

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ProxyError::Io)?;

    info!(address = %addr, "Auth proxy ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ProxyError::Internal(format!("Server error: {}", e)))?;

    info!("Auth proxy stopped");

    Ok(())
}

async fn not_found(req: Request) -> StatusCode {
    debug!(path = %req.uri().path(), "No route");
    StatusCode::NOT_FOUND
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
