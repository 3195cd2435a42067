//! Formation and office CRUD.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use nominalroll_core::{FormationId, OfficeId};
use nominalroll_infra::services::{NewFormation, NewOffice, OfficePatch};
use nominalroll_personnel::FormationPatch;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn formations_router() -> Router {
    Router::new()
        .route("/", post(create_formation).get(list_formations))
        .route("/:id", get(get_formation).patch(update_formation).delete(delete_formation))
}

pub fn offices_router() -> Router {
    Router::new()
        .route("/", post(create_office).get(list_offices))
        .route("/:id", get(get_office).patch(update_office).delete(delete_office))
}

pub async fn create_formation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewFormation>,
) -> Response {
    match services.personnel.create_formation(ctx.principal(), body, Utc::now()).await {
        Ok(f) => (StatusCode::CREATED, Json(f)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_formations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    match services.personnel.list_formations(ctx.principal()).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_formation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: FormationId = match errors::parse_id(&id, "formation") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.get_formation(ctx.principal(), id).await {
        Ok(f) => (StatusCode::OK, Json(f)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_formation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(patch): Json<FormationPatch>,
) -> Response {
    let id: FormationId = match errors::parse_id(&id, "formation") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services
        .personnel
        .update_formation(ctx.principal(), id, patch, Utc::now())
        .await
    {
        Ok(f) => (StatusCode::OK, Json(f)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_formation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: FormationId = match errors::parse_id(&id, "formation") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.delete_formation(ctx.principal(), id, Utc::now()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_office(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<NewOffice>,
) -> Response {
    match services.personnel.create_office(ctx.principal(), body, Utc::now()).await {
        Ok(o) => (StatusCode::CREATED, Json(o)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_offices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(params): Query<dto::OfficeParams>,
) -> Response {
    match services.personnel.list_offices(ctx.principal(), params.formation_id).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_office(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: OfficeId = match errors::parse_id(&id, "office") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.get_office(ctx.principal(), id).await {
        Ok(o) => (StatusCode::OK, Json(o)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_office(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(patch): Json<OfficePatch>,
) -> Response {
    let id: OfficeId = match errors::parse_id(&id, "office") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.update_office(ctx.principal(), id, patch, Utc::now()).await {
        Ok(o) => (StatusCode::OK, Json(o)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_office(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: OfficeId = match errors::parse_id(&id, "office") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.delete_office(ctx.principal(), id, Utc::now()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
