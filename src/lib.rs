use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain core: access policy, concern lifecycle, analytics.
pub mod analytics;
pub mod lifecycle;
pub mod policy;

// Services and infrastructure.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod notifications;
pub mod repository;
pub mod storage;

// Routing, split by who may call it.
pub mod routes;
use routes::{admin, authenticated, citizen, public, staff};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use identity::{GoTrueClient, IdentityState, MockIdentityProvider};
pub use notifications::{MockDispatcher, NotifierState, StoredNotifier};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json` with a
/// Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::check_access,
        handlers::list_concerns, handlers::get_concern, handlers::get_concern_updates,
        handlers::get_comments, handlers::list_departments, handlers::get_sdg_metrics,
        handlers::get_me, handlers::update_me, handlers::get_landing, handlers::get_my_concerns,
        handlers::get_my_rewards, handlers::vote_concern, handlers::add_comment,
        handlers::get_notifications, handlers::mark_notification_read,
        handlers::get_presigned_url, handlers::create_concern, handlers::update_concern_status,
        handlers::assign_concern, handlers::get_analytics, handlers::create_department,
        handlers::update_department, handlers::list_users, handlers::update_user_role
    ),
    components(
        schemas(
            models::User, models::Concern, models::ConcernView, models::ConcernUpdate,
            models::ConcernComment, models::CommentView, models::Department, models::UserNotification,
            models::NotificationKind, models::RewardEntry, models::RewardSummary,
            models::CreateConcernRequest, models::UpdateStatusRequest,
            models::AssignConcernRequest, models::CreateCommentRequest, models::VoteRequest,
            models::RegisterUserRequest, models::LoginRequest, models::LoginResponse,
            models::UpdateProfileRequest, models::UpdateRoleRequest,
            models::CreateDepartmentRequest, models::UpdateDepartmentRequest,
            models::PresignedUrlRequest, models::PresignedUrlResponse, models::UserProfile,
            models::LandingResponse, models::StatusCount, models::GroupCount, models::SdgMetric,
            models::AnalyticsSummary, lifecycle::ConcernStatus, policy::Role, policy::Resource,
            policy::Landing, policy::GuardOutcome,
        )
    ),
    tags(
        (name = "citizen-sphere", description = "Citizen concern reporting and triage API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence (Postgres in deployment, in-memory in tests).
    pub repo: RepositoryState,
    /// Presigned attachment uploads (S3/MinIO).
    pub storage: StorageState,
    /// In-app notifications sent after status changes, comments and assignments.
    pub notifier: NotifierState,
    /// Password signup/login; issues the JWTs `AuthUser` validates.
    pub identity: IdentityState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for NotifierState {
    fn from_ref(app_state: &AppState) -> NotifierState {
        app_state.notifier.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles all routers, the auth and role layers, and the observability stack.
///
/// Layer order matters: `route_layer`s added later run first, so
/// `auth_middleware` (added last) resolves the session before any
/// `require_access` layer reads it.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = Router::new()
        .merge(authenticated::authenticated_routes())
        .merge(citizen::citizen_routes())
        .merge(staff::staff_routes())
        .nest("/admin", admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with its `x-request-id` so every log line
/// of the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
