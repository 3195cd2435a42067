use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;

use nominalroll_core::LeaveId;
use nominalroll_infra::store::LeaveQuery;
use nominalroll_personnel::NewLeave;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(request_leave).get(list_leaves))
        .route("/:id/approve", post(approve_leave))
        .route("/:id/reject", post(reject_leave))
}

pub async fn request_leave(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewLeave>,
) -> Response {
    match services.personnel.request_leave(ctx.principal(), body, Utc::now()).await {
        Ok(leave) => (StatusCode::CREATED, Json(leave)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_leaves(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(query): Query<LeaveQuery>,
) -> Response {
    match services.personnel.list_leaves(ctx.principal(), query).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn approve_leave(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ResolveRequest>>,
) -> Response {
    decide(services, ctx, id, body, true).await
}

pub async fn reject_leave(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ResolveRequest>>,
) -> Response {
    decide(services, ctx, id, body, false).await
}

async fn decide(
    services: Arc<AppServices>,
    ctx: PrincipalContext,
    id: String,
    body: Option<Json<dto::ResolveRequest>>,
    approve: bool,
) -> Response {
    let id: LeaveId = match errors::parse_id(&id, "leave") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let note = body.and_then(|Json(b)| b.note);
    let result = if approve {
        services.personnel.approve_leave(ctx.principal(), id, note, Utc::now()).await
    } else {
        services.personnel.reject_leave(ctx.principal(), id, note, Utc::now()).await
    };
    match result {
        Ok(leave) => (StatusCode::OK, Json(leave)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
