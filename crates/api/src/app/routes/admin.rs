//! Administration endpoints: user accounts, the audit trail and retirement runs.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;

use nominalroll_core::UserId;
use nominalroll_infra::services::{NewUser, RoleChange};
use nominalroll_personnel::{AuditQuery, parse_date};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn users_router() -> Router {
    Router::new()
        .route("/", post(register_user).get(list_users))
        .route("/:id/role", put(change_role))
}

pub fn router() -> Router {
    Router::new()
        .route("/audit-logs", get(query_audit))
        .route("/retirements/process", post(process_retirements))
}

pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewUser>,
) -> Response {
    match services.personnel.register_user(ctx.principal(), body, Utc::now()).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(params): Query<dto::UserParams>,
) -> Response {
    match services.personnel.list_users(ctx.principal(), params.role).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<RoleChange>,
) -> Response {
    let id: UserId = match errors::parse_id(&id, "user") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services
        .personnel
        .change_user_role(ctx.principal(), id, body, Utc::now())
        .await
    {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn query_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(query): Query<AuditQuery>,
) -> Response {
    match services.personnel.query_audit(ctx.principal(), query).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn process_retirements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    body: Option<Json<dto::RetirementRequest>>,
) -> Response {
    let now = Utc::now();
    let on = match body.and_then(|Json(b)| b.on) {
        Some(raw) => match parse_date(&raw) {
            Ok(d) => d,
            Err(e) => return errors::domain_error_to_response(e),
        },
        None => now.date_naive(),
    };
    match services.personnel.process_retirements(ctx.principal(), on, now).await {
        Ok(processed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "processed": processed, "on": on })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
