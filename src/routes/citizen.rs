use crate::{AppState, handlers, policy::Resource, routes::gated};
use axum::{Router, routing::post};

/// Citizen Router Module
///
/// Concern submission. Staff accounts are refused with 403 even though they
/// are authenticated.
pub fn citizen_routes() -> Router<AppState> {
    gated(
        Resource::SubmitConcern,
        Router::new().route("/concerns", post(handlers::create_concern)),
    )
}
