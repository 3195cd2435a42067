use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    // Tokens may be minted for subjects without a stored account.
    let username = match services.personnel.find_user(ctx.user_id()).await {
        Ok(account) => account.map(|a| a.username),
        Err(e) => return errors::service_error_to_response(e),
    };
    Json(serde_json::json!({
        "user_id": ctx.user_id().to_string(),
        "username": username,
        "role": ctx.role().as_str(),
        "scope": ctx.scope(),
        "capabilities": ctx.principal().capabilities(),
    }))
    .into_response()
}

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    match services
        .personnel
        .dashboard(ctx.principal(), Utc::now().date_naive())
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
