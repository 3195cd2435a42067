use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;

use nominalroll_infra::services::ImportTarget;

use crate::app::errors;
use crate::app::routes::export::attachment;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/template", get(template))
        .route("/xlsx", post(import_xlsx))
}

pub async fn template(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.personnel.import_template() {
        Ok(file) => attachment(file),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// The request body is the raw workbook.
pub async fn import_xlsx(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(target): Query<ImportTarget>,
    body: Bytes,
) -> Response {
    match services
        .personnel
        .import_staff(ctx.principal(), &body, target, Utc::now())
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
