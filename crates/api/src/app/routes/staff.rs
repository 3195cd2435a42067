use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Map, Value};

use nominalroll_core::StaffId;
use nominalroll_infra::services::{MoveOutcome, MoveTarget};
use nominalroll_personnel::NewStaff;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_staff).get(list_staff))
        .route("/:id", get(get_staff).patch(update_staff).delete(delete_staff))
        .route("/:id/move", post(move_staff))
        .route("/:id/movements", get(list_movements))
}

pub async fn create_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewStaff>,
) -> Response {
    match services.personnel.create_staff(ctx.principal(), body, Utc::now()).await {
        Ok(staff) => (StatusCode::CREATED, Json(dto::staff_to_json(ctx.principal(), &staff))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(params): Query<dto::StaffListParams>,
) -> Response {
    let filter = match params.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.personnel.list_staff(ctx.principal(), filter).await {
        Ok(rows) => {
            let items: Vec<Value> = rows.iter().map(|s| dto::staff_to_json(ctx.principal(), s)).collect();
            (StatusCode::OK, Json(dto::items(&items))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: StaffId = match errors::parse_id(&id, "staff") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.get_staff(ctx.principal(), id).await {
        Ok(staff) => (StatusCode::OK, Json(dto::staff_to_json(ctx.principal(), &staff))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Response {
    let id: StaffId = match errors::parse_id(&id, "staff") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let (delta, expected) = match dto::staff_patch(body) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services
        .personnel
        .update_staff(ctx.principal(), id, delta, expected, Utc::now())
        .await
    {
        Ok(staff) => (StatusCode::OK, Json(dto::staff_to_json(ctx.principal(), &staff))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: StaffId = match errors::parse_id(&id, "staff") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.delete_staff(ctx.principal(), id, Utc::now()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn move_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(target): Json<MoveTarget>,
) -> Response {
    let id: StaffId = match errors::parse_id(&id, "staff") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.move_staff(ctx.principal(), id, target, Utc::now()).await {
        Ok(MoveOutcome::Moved { staff, movement }) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "moved": true,
                "staff": dto::staff_to_json(ctx.principal(), &staff),
                "movement": movement,
            })),
        )
            .into_response(),
        Ok(MoveOutcome::Unchanged(staff)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "moved": false,
                "staff": dto::staff_to_json(ctx.principal(), &staff),
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(params): Query<dto::MovementParams>,
) -> Response {
    let id: StaffId = match errors::parse_id(&id, "staff") {
        Ok(v) => v,
        Err(res) => return res,
    };
    let kind = match params.kind() {
        Ok(k) => k,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.personnel.list_movements(ctx.principal(), id, kind).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
