// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use zapline_config::model::GatewayConfig;
use zapline_core::{JobQueue, PluginAdapter, ZaplineError};
use zapline_session::SessionRegistry;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Inputs for the unauthenticated `/health` endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Adapters whose health is reported, typically storage and transport.
    pub components: Vec<Arc<dyn PluginAdapter>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub jobs: Arc<dyn JobQueue>,
    pub auth: AuthConfig,
    pub health: HealthState,
    /// Prepended to national destinations, e.g. `"55"`.
    pub default_country_code: Option<String>,
}

impl GatewayState {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<SessionRegistry>,
        jobs: Arc<dyn JobQueue>,
        components: Vec<Arc<dyn PluginAdapter>>,
    ) -> Self {
        Self {
            registry,
            jobs,
            auth: AuthConfig {
                bearer_token: config.bearer_token.clone(),
            },
            health: HealthState {
                start_time: std::time::Instant::now(),
                components,
            },
            default_country_code: config.default_country_code.clone(),
        }
    }
}

/// Assemble the gateway routes.
///
/// `/health` is public; everything under `/v1` requires the bearer token.
pub fn build_router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/sessions", get(handlers::list_sessions))
        .route(
            "/v1/sessions/{id}",
            get(handlers::get_session).delete(handlers::teardown_session),
        )
        .route("/v1/sessions/{id}/start", post(handlers::start_session))
        .route("/v1/sessions/{id}/qr", get(handlers::get_qr))
        .route(
            "/v1/sessions/{id}/pairing-code",
            post(handlers::request_pairing_code),
        )
        .route("/v1/sessions/{id}/reconnect", post(handlers::reconnect_session))
        .route("/v1/sessions/{id}/cleanup", post(handlers::cleanup_session))
        .route("/v1/sessions/{id}/messages", post(handlers::send_message))
        .route(
            "/v1/jobs",
            get(handlers::list_jobs).post(handlers::schedule_job),
        )
        .route("/v1/jobs/{id}", get(handlers::get_job))
        .route("/v1/jobs/{id}/cancel", post(handlers::cancel_job))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the configured host and port.
pub async fn bind(config: &GatewayConfig) -> Result<TcpListener, ZaplineError> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| ZaplineError::Config(format!("failed to bind gateway to {addr}: {e}")))
}

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), ZaplineError> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| ZaplineError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
