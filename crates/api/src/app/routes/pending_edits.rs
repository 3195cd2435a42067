use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use nominalroll_core::PendingEditId;
use nominalroll_infra::store::EditQuery;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_edit).get(list_edits))
        .route("/:id", get(get_edit))
        .route("/:id/approve", post(approve_edit))
        .route("/:id/reject", post(reject_edit))
}

pub async fn submit_edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::SubmitEditRequest>,
) -> Response {
    match services
        .personnel
        .submit_edit(ctx.principal(), body.staff_id, body.changes, Utc::now())
        .await
    {
        Ok(edit) => (StatusCode::CREATED, Json(edit)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_edits(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(query): Query<EditQuery>,
) -> Response {
    match services.personnel.list_pending_edits(ctx.principal(), query).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: PendingEditId = match errors::parse_id(&id, "pending edit") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.get_pending_edit(ctx.principal(), id).await {
        Ok(edit) => (StatusCode::OK, Json(edit)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn approve_edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ResolveRequest>>,
) -> Response {
    let id: PendingEditId = match errors::parse_id(&id, "pending edit") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let note = body.and_then(|Json(b)| b.note);
    match services.personnel.approve_edit(ctx.principal(), id, note, Utc::now()).await {
        Ok((edit, staff)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "edit": edit,
                "staff": dto::staff_to_json(ctx.principal(), &staff),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reject_edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ResolveRequest>>,
) -> Response {
    let id: PendingEditId = match errors::parse_id(&id, "pending edit") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let note = body.and_then(|Json(b)| b.note);
    match services.personnel.reject_edit(ctx.principal(), id, note, Utc::now()).await {
        Ok(edit) => (StatusCode::OK, Json(edit)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
