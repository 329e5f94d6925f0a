use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Features open to every signed-in role. The router is mounted behind
/// `auth_middleware`, so each handler receives a resolved `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /me
        // The caller's profile with its landing page; partial profile update.
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        .route("/me/landing", get(handlers::get_landing))
        .route("/me/concerns", get(handlers::get_my_concerns))
        // GET /me/rewards
        // Reward ledger written by the submission and resolution triggers.
        .route("/me/rewards", get(handlers::get_my_rewards))
        // POST /upload/presigned
        // Short-lived S3 PUT URL for a concern attachment.
        .route("/upload/presigned", post(handlers::get_presigned_url))
        // POST /concerns/{id}/vote
        // One vote per user per concern, enforced by the concern_votes primary key.
        .route("/concerns/{id}/vote", post(handlers::vote_concern))
        .route("/concerns/{id}/comments", post(handlers::add_comment))
        .route("/notifications", get(handlers::get_notifications))
        // PATCH /notifications/{id}/read
        // Only the recipient may mark a notification read.
        .route(
            "/notifications/{id}/read",
            patch(handlers::mark_notification_read),
        )
}
