//! HTTP surface for the Keel controller.
//!
//! JSON request/response under `/api/v1`, CORS per configuration, and an
//! HS256 JWT guard available for routes that become tenant-private.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use keel_config::Config;
use keel_core::Supervisor;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

pub mod auth;
pub mod dto;
pub mod handlers;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub config: Arc<Config>,
}

/// Build the `/api/v1` router.
pub fn router(state: ApiState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/api/v1/healthz", get(handlers::healthz))
        .route(
            "/api/v1/asgs",
            post(handlers::create_asg).delete(handlers::remove_asg),
        )
        .route("/api/v1/asg", get(handlers::read_asg))
        .route("/api/v1/metrics", post(handlers::add_metrics))
        .route("/api/v1/policies", post(handlers::change_policy))
        .route(
            "/api/v1/nodes",
            get(handlers::read_nodes)
                .post(handlers::add_node)
                .delete(handlers::remove_node),
        )
        .layer(cors)
        .with_state(state)
}

/// Wrap a sub-router in the JWT guard. No core route opts in today; this
/// is the hook for routes that become tenant-private.
pub fn protect(router: Router<ApiState>, state: ApiState) -> Router<ApiState> {
    router.route_layer(middleware::from_fn_with_state(state, auth::require_jwt))
}

/// Translate the configured CORS options into a [`CorsLayer`].
fn cors_layer(config: &Config) -> CorsLayer {
    let mut layer = CorsLayer::new();

    let wildcard = config.cors_allowed_origins.iter().any(|o| o == "*");
    if wildcard {
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer = layer.allow_origin(origins);
    }

    let methods: Vec<Method> = config
        .cors_allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    layer = layer.allow_methods(methods);

    let headers: Vec<HeaderName> = config
        .cors_allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    layer = layer.allow_headers(headers);

    let exposed: Vec<HeaderName> = config
        .cors_exposed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    layer = layer.expose_headers(exposed);

    // Credentials are incompatible with a wildcard origin.
    if config.cors_allow_credentials && !wildcard {
        layer = layer.allow_credentials(true);
    }

    if config.cors_debug || config.cors_options_passthrough {
        debug!(
            passthrough = config.cors_options_passthrough,
            "cors debug options set"
        );
    }

    layer.max_age(Duration::from_secs(config.cors_max_age))
}
