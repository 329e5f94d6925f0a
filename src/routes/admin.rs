use crate::{AppState, handlers, policy::Resource, routes::gated};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Nested under `/admin`. Each group is gated by its own resource, so a
/// Department Head can read analytics but not manage departments, and only a
/// Super Admin can change roles.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/analytics
        // Totals by status, category, region and SDG, plus average resolution time.
        .merge(gated(
            Resource::Analytics,
            Router::new().route("/analytics", get(handlers::get_analytics)),
        ))
        .merge(gated(
            Resource::DepartmentAdmin,
            Router::new()
                .route("/departments", post(handlers::create_department))
                .route("/departments/{id}", put(handlers::update_department)),
        ))
        // PUT /admin/users/{id}/role
        // Role grants. Self-service role changes are refused in the handler.
        .merge(gated(
            Resource::UserAdmin,
            Router::new()
                .route("/users", get(handlers::list_users))
                .route("/users/{id}/role", put(handlers::update_user_role)),
        ))
}
