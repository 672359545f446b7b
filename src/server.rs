//! HTTP server assembly.
//!
//! Route layout:
//!
//! ```text
//! TraceLayer
//!   CORS
//!     GET|POST <endpoint>   identity gate -> graphql_handler
//!     GET      /healthz     liveness, no gate
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::{RuntimeConfig, ServerConfig};
use crate::error::Error;
use crate::gate::{cors_layer, identity_gate, Gate};
use crate::graphql::graphql_handler;
use crate::identity;
use crate::properties::RequestProperties;
use crate::runtime::RemoteRuntime;

/// Shared state for the GraphQL handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Per-request view of the configuration
    pub runtime: Arc<RuntimeConfig>,
    /// Properties every request starts from
    pub baseline: Arc<RequestProperties>,
    /// Remote dispatch
    pub remote: Arc<RemoteRuntime>,
}

impl AppState {
    /// Creates state from its parts.
    pub fn new(runtime: RuntimeConfig, baseline: RequestProperties, remote: RemoteRuntime) -> Self {
        Self {
            runtime: Arc::new(runtime),
            baseline: Arc::new(baseline),
            remote: Arc::new(remote),
        }
    }

    /// Builds state from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.runtime_config(),
            config.baseline.clone(),
            RemoteRuntime::from_config(config),
        )
    }
}

/// Assembles the router: the gated GraphQL endpoint plus `/healthz`.
pub fn router(state: AppState, gate: Gate) -> Router {
    let endpoint = state.runtime.endpoint_path.clone();
    Router::new()
        .route(&endpoint, get(graphql_handler).post(graphql_handler))
        .route_layer(from_fn_with_state(gate, identity_gate))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Builds the router described by `config`.
///
/// # Errors
///
/// Returns `Error::Identity` if the identity provider cannot be built.
pub fn build_router(config: &ServerConfig) -> Result<Router, Error> {
    let provider = identity::from_config(config)?;
    let gate = Gate::new(provider, config.gate_mode);
    Ok(router(AppState::from_config(config), gate))
}

/// Binds `0.0.0.0:PORT` and serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the router cannot be built or the listener fails.
pub async fn serve(config: ServerConfig) -> Result<(), Error> {
    let app = build_router(&config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        "listening at http://localhost:{}{}",
        config.port,
        config.endpoint_path
    );
    tracing::info!(
        remote = %config.remote_url,
        auth_provider = ?config.auth_provider,
        gate_mode = ?config.gate_mode,
        "forwarding to remote agent endpoint"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::error!("failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
