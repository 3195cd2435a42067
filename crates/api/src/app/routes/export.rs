use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;

use nominalroll_infra::{ExportFormat, ExportedFile};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/xlsx", get(export_xlsx))
        .route("/pdf", get(export_pdf))
}

pub async fn export_xlsx(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(filter): Query<dto::StaffListParams>,
    Query(params): Query<dto::ExportParams>,
) -> Response {
    export(services, ctx, filter, params, ExportFormat::Xlsx).await
}

pub async fn export_pdf(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(filter): Query<dto::StaffListParams>,
    Query(params): Query<dto::ExportParams>,
) -> Response {
    export(services, ctx, filter, params, ExportFormat::Pdf).await
}

async fn export(
    services: Arc<AppServices>,
    ctx: PrincipalContext,
    filter: dto::StaffListParams,
    params: dto::ExportParams,
    format: ExportFormat,
) -> Response {
    let filter = match filter.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let file = match services
        .personnel
        .export_staff(
            ctx.principal(),
            filter,
            params.columns.as_deref(),
            format,
            &services.export_heading,
            Utc::now().date_naive(),
        )
        .await
    {
        Ok(f) => f,
        Err(e) => return errors::service_error_to_response(e),
    };
    attachment(file)
}

/// Serve a rendered file as a download.
pub(crate) fn attachment(file: ExportedFile) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.bytes,
    )
        .into_response()
}
