use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use nominalroll_core::NotificationId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_read))
}

pub async fn list_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(params): Query<dto::NotificationParams>,
) -> Response {
    match services.personnel.list_notifications(ctx.principal(), params.unread).await {
        Ok(rows) => (StatusCode::OK, Json(dto::items(&rows))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn mark_read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id: NotificationId = match errors::parse_id(&id, "notification") {
        Ok(v) => v,
        Err(res) => return res,
    };
    match services.personnel.mark_notification_read(ctx.principal(), id).await {
        Ok(n) => (StatusCode::OK, Json(n)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
