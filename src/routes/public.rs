use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Handlers that render concerns take an
/// optional `AuthUser` so staff and submitters still see the submitter of an
/// anonymous concern when they are signed in.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Account creation at the identity provider plus the local Citizen profile.
        .route("/register", post(handlers::register_user))
        // POST /login
        // Password login; returns the access token and the landing page.
        .route("/login", post(handlers::login))
        // GET /access/{resource}
        // Client route guard: Admit, or Redirect to the caller's landing page.
        .route("/access/{resource}", get(handlers::check_access))
        // GET /concerns?status=...&category=...&region=...&search=...
        .route("/concerns", get(handlers::list_concerns))
        .route("/concerns/{id}", get(handlers::get_concern))
        // GET /concerns/{id}/updates
        // Status audit trail, oldest first.
        .route("/concerns/{id}/updates", get(handlers::get_concern_updates))
        .route("/concerns/{id}/comments", get(handlers::get_comments))
        .route("/departments", get(handlers::list_departments))
        // GET /sdg/metrics
        // Concern totals per Sustainable Development Goal, for the public dashboard.
        .route("/sdg/metrics", get(handlers::get_sdg_metrics))
}
