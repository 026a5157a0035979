//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, request deadline, security headers)
//! - Buffer request bodies up to the configured limit
//! - Hand matched requests to the pipeline and render its decision
//! - Run background tasks (state sweeper, config reload) until shutdown

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::http::request::{request_id_of, MakeBridgeRequestId};
use crate::http::response::{decision_response, Rejection};
use crate::http::timeout::request_timeout_middleware;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::{BridgeComponents, Dispatcher, Pipeline, PipelineSettings, RequestContext};
use crate::routing::RouteTable;
use crate::security::client_ip::resolve_client_ip;
use crate::security::sweeper::StateSweeper;
use crate::time::{Clock, SystemClock};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub routes: Arc<RouteTable>,
    pub trusted_proxies: Arc<[IpAddr]>,
    pub max_body_size: usize,
    pub admin_api_key: Arc<str>,
    pub started_at: Instant,
}

/// HTTP server for the bridge.
pub struct HttpServer {
    router: Router,
    config: BridgeConfig,
    pipeline: Arc<Pipeline>,
}

impl HttpServer {
    /// Create a server with in-memory stores and the system clock.
    pub fn new(config: BridgeConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let components = BridgeComponents::in_memory(&config, clock);
        Self::from_parts(config, components, dispatcher)
    }

    /// Create a server around caller-provided components.
    pub fn from_parts(config: BridgeConfig, components: BridgeComponents, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let pipeline = Arc::new(Pipeline::new(
            components,
            dispatcher,
            PipelineSettings::from_config(&config),
        ));

        let trusted_proxies: Vec<IpAddr> = config
            .security
            .trusted_proxies
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect();

        let state = AppState {
            pipeline: pipeline.clone(),
            routes: Arc::new(RouteTable::from_config(&config.routes.0)),
            trusted_proxies: trusted_proxies.into(),
            max_body_size: config.security.max_body_size,
            admin_api_key: config.admin.api_key.as_str().into(),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            pipeline,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &BridgeConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state.clone());

        if config.admin.enabled {
            router = router.merge(admin::setup_admin_router(state));
        }

        router = router.layer(from_fn_with_state(
            Duration::from_secs(config.timeouts.request_secs),
            request_timeout_middleware,
        ));

        if config.security.enable_headers {
            router = router
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeBridgeRequestId))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Apply validated configuration updates until shutdown.
    ///
    /// Rate-limit ceilings take effect immediately; any other change is
    /// logged as requiring a restart.
    pub fn spawn_config_updates(
        &self,
        mut updates: mpsc::UnboundedReceiver<BridgeConfig>,
        shutdown: &Shutdown,
    ) -> tokio::task::JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let mut current = self.config.clone();
        let mut shutdown_rx = shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(new_config) = update else { break };
                        if new_config.rate_limit != current.rate_limit {
                            pipeline.components().limiter.update_config(new_config.rate_limit.clone());
                        }
                        if restart_required(&current, &new_config) {
                            tracing::warn!("Configuration changed outside [rate_limit]; restart to apply");
                        }
                        current = new_config;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.config.routes.0.len(),
            "HTTP server starting"
        );

        let components = self.pipeline.components();
        let sweeper = StateSweeper::new(
            components.limiter.clone(),
            components.replay.clone(),
            Duration::from_secs(self.config.timeouts.sweep_interval_secs.max(1)),
        );
        tokio::spawn(sweeper.run(shutdown.subscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut shutdown_rx = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

fn restart_required(old: &BridgeConfig, new: &BridgeConfig) -> bool {
    let mut old = old.clone();
    old.rate_limit = new.rate_limit.clone();
    serde_json::to_value(&old).ok() != serde_json::to_value(new).ok()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Entry point for every non-admin request.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id_of(request.headers());
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let Some(route) = state.routes.match_request(&parts.method, &path) else {
        tracing::debug!(request_id = %request_id, method = %parts.method, path = %path, "No route matched");
        metrics::record_rejection(BridgeError::RouteNotFound.code());
        metrics::record_request("none", 404, start);
        return Rejection::new(BridgeError::RouteNotFound, request_id).into_response();
    };

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, route = %route.name, error = %e, "Request body rejected");
            let error = BridgeError::PayloadTooLarge {
                limit: state.max_body_size,
            };
            metrics::record_rejection(error.code());
            metrics::record_request(&route.name, error.status().as_u16(), start);
            return Rejection::new(error, request_id).into_response();
        }
    };

    let ctx = RequestContext {
        request_id,
        method: parts.method,
        client_ip: resolve_client_ip(peer, &parts.headers, &state.trusted_proxies),
        path,
        headers: parts.headers,
        body,
    };

    let decision = state.pipeline.process(route, ctx).await;
    let response = decision_response(decision);
    metrics::record_request(&route.name, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_required_ignores_rate_limits() {
        let old = BridgeConfig::default();

        let mut new = old.clone();
        new.rate_limit.classes.login.per_minute = 10;
        assert!(!restart_required(&old, &new));

        new.webhook.tolerance_secs = 60;
        assert!(restart_required(&old, &new));
    }
}
