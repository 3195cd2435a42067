use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use nominalroll_auth::JwtValidator;

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Role gate: verify the bearer token and attach the resolved principal.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map_err(unauthenticated)?;

    let principal = state.jwt.authenticate(token, Utc::now()).map_err(|e| {
        tracing::warn!(error = %e, path = %req.uri().path(), "rejected bearer token");
        unauthenticated(e.to_string())
    })?;

    req.extensions_mut().insert(PrincipalContext::new(principal));
    Ok(next.run(req).await)
}

fn unauthenticated(message: impl Into<String>) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("missing authorization header")?;

    let header = header.to_str().map_err(|_| "malformed authorization header")?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or("expected a bearer token")?
        .trim();
    if token.is_empty() {
        return Err("empty bearer token");
    }

    Ok(token)
}
