use axum::{Router, routing::get};

pub mod admin;
pub mod export;
pub mod import;
pub mod leave;
pub mod notifications;
pub mod org;
pub mod pending_edits;
pub mod reference;
pub mod staff;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/dashboard", get(system::dashboard))
        .nest("/staff", staff::router())
        .nest("/pending-edits", pending_edits::router())
        .nest("/formations", org::formations_router())
        .nest("/offices", org::offices_router())
        .nest("/leaves", leave::router())
        .nest("/notifications", notifications::router())
        .nest("/users", admin::users_router())
        .nest("/export", export::router())
        .nest("/import", import::router())
        .nest("/states", reference::router())
        .merge(admin::router())
}
