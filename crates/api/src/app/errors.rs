use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use nominalroll_core::DomainError;
use nominalroll_infra::{ServiceError, StoreError};

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) => json_error(StatusCode::BAD_REQUEST, "validation_error", message),
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", message),
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        DomainError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
        DomainError::Unauthenticated => json_error(StatusCode::UNAUTHORIZED, "unauthenticated", message),
        DomainError::Forbidden(_) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(StoreError::NotFound(msg)) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ServiceError::Store(StoreError::Conflict(msg)) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(StoreError::Invalid(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ServiceError::Store(StoreError::Backend(msg)) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage backend failure")
        }
        ServiceError::Export(e) => {
            tracing::error!(error = %e, "export failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "export_error", e.to_string())
        }
    }
}

/// Parse a path segment into a typed identifier.
pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
