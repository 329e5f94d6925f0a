use crate::{AppState, handlers, policy::Resource, routes::gated};
use axum::{Router, routing::put};

/// Staff Router Module
///
/// Concern triage for Officers, Department Heads, Admins and Super Admins.
/// Status changes go through the lifecycle service, which re-checks the role
/// and the transition graph before anything is written.
pub fn staff_routes() -> Router<AppState> {
    gated(
        Resource::ConcernTriage,
        Router::new()
            // PUT /concerns/{id}/status
            // 409 when the concern moved on since `expected_version`.
            .route(
                "/concerns/{id}/status",
                put(handlers::update_concern_status),
            )
            .route(
                "/concerns/{id}/assignment",
                put(handlers::assign_concern),
            ),
    )
}
