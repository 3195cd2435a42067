//! Read-only reference data for staff forms.

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use nominalroll_personnel::origin;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_states))
        .route("/:id/lgas", get(list_lgas))
}

pub async fn list_states() -> Response {
    let states: Vec<_> = origin::states().collect();
    (StatusCode::OK, Json(dto::items(&states))).into_response()
}

pub async fn list_lgas(Path(id): Path<String>) -> Response {
    let id: u16 = match errors::parse_id(&id, "state") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match origin::state(id) {
        Some(state) => {
            let lgas: Vec<_> = state.lgas().collect();
            (StatusCode::OK, Json(dto::items(&lgas))).into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("state {id}")),
    }
}
