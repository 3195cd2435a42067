//! HTTP application wiring.
//!
//! - `services.rs`: store selection and the personnel service
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request parsing and JSON shaping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (used by `main.rs` and the black-box tests).
pub async fn build_app(config: ApiConfig) -> anyhow::Result<Router> {
    let jwt = Arc::new(nominalroll_auth::Hs256JwtValidator::new(
        config.jwt_secret.clone().into_bytes(),
    ));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services(&config).await?);

    // Everything except /health requires a bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
}
