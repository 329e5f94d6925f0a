use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    lifecycle,
    models::{
        AnalyticsSummary, AssignConcernRequest, CommentView, Concern, ConcernComment, ConcernFilter,
        ConcernUpdate, ConcernView, CreateCommentRequest, CreateConcernRequest,
        CreateDepartmentRequest, Department, LandingResponse, LoginRequest, LoginResponse,
        NewNotification, NotificationKind, PresignedUrlRequest, PresignedUrlResponse,
        RegisterUserRequest, RewardSummary, SdgMetric, UpdateDepartmentRequest,
        UpdateProfileRequest, UpdateRoleRequest, UpdateStatusRequest, User, UserNotification,
        UserProfile, VoteRequest,
    },
    policy::{GuardOutcome, Resource, Role, authorize, guard, landing_for},
    storage::attachment_key,
};

/// Re-checks the resource table inside the handler. The router layer already
/// did this; handlers called directly (tests, future routers) stay safe.
fn ensure_access(user: &AuthUser, resource: Resource) -> AppResult<()> {
    if authorize(user.role, resource).is_permit() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "{} may not access {resource:?}",
            user.role.display_name()
        )))
    }
}

async fn load_concern(state: &AppState, id: Uuid) -> AppResult<Concern> {
    state
        .repo
        .get_concern(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("concern {id}")))
}

// --- Public Handlers ---

/// register_user
///
/// [Public Route] Creates the account at the identity provider, then the local
/// profile under the same id. Self-registration always yields a Citizen.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 400, description = "Invalid payload or rejected by the identity provider"),
        (status = 503, description = "Identity provider unavailable")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    payload.validate()?;

    let id = state
        .identity
        .sign_up(&payload.email, &payload.password)
        .await?;

    let user = state
        .repo
        .create_user(User {
            id,
            email: payload.email,
            full_name: payload.full_name,
            phone: payload.phone,
            address: payload.address,
            region: payload.region,
            ward: payload.ward,
            role: Role::Citizen,
            is_verified: false,
            department_id: None,
            created_at: Utc::now(),
            last_login_at: None,
        })
        .await?;

    tracing::info!(user_id = %user.id, "citizen registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// login
///
/// [Public Route] Password login through the identity provider. Returns the
/// access token together with the profile and the landing page for its role.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let session = state
        .identity
        .sign_in(&payload.email, &payload.password)
        .await?;

    // Credentials without a profile cannot use the portal.
    let user = state
        .repo
        .record_login(session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(LoginResponse {
        access_token: session.access_token,
        expires_in: session.expires_in,
        landing: landing_for(Some(user.role)),
        user,
    }))
}

/// check_access
///
/// [Public Route] The client route guard. Answers whether the caller may open
/// `resource` and, if not, where to send them. Anonymous callers are redirected
/// to the login page.
#[utoipa::path(
    get,
    path = "/access/{resource}",
    params(("resource" = Resource, Path, description = "Portal area, kebab-case")),
    responses((status = 200, description = "Guard decision", body = GuardOutcome))
)]
pub async fn check_access(
    viewer: Option<AuthUser>,
    Path(resource): Path<Resource>,
) -> Json<GuardOutcome> {
    Json(guard(viewer.as_ref(), resource))
}

/// list_concerns
///
/// [Public Route] Lists concerns, newest first. Submitter ids of anonymous
/// concerns are withheld unless the caller is staff or the submitter.
#[utoipa::path(
    get,
    path = "/concerns",
    params(ConcernFilter),
    responses((status = 200, description = "Concerns", body = [ConcernView]))
)]
pub async fn list_concerns(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Query(mut filter): Query<ConcernFilter>,
) -> AppResult<Json<Vec<ConcernView>>> {
    filter.citizen_id = None;
    let concerns = state.repo.list_concerns(filter).await?;
    Ok(Json(
        concerns
            .into_iter()
            .map(|c| ConcernView::for_viewer(c, viewer.as_ref()))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/concerns/{id}",
    params(("id" = Uuid, Path, description = "Concern ID")),
    responses(
        (status = 200, description = "Found", body = ConcernView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_concern(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ConcernView>> {
    let concern = load_concern(&state, id).await?;
    Ok(Json(ConcernView::for_viewer(concern, viewer.as_ref())))
}

/// get_concern_updates
///
/// [Public Route] The status audit trail of a concern, oldest first.
#[utoipa::path(
    get,
    path = "/concerns/{id}/updates",
    params(("id" = Uuid, Path, description = "Concern ID")),
    responses((status = 200, description = "Status history", body = [ConcernUpdate]))
)]
pub async fn get_concern_updates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ConcernUpdate>>> {
    load_concern(&state, id).await?;
    Ok(Json(state.repo.list_updates(id).await?))
}

#[utoipa::path(
    get,
    path = "/concerns/{id}/comments",
    params(("id" = Uuid, Path, description = "Concern ID")),
    responses((status = 200, description = "Comments", body = [CommentView]))
)]
pub async fn get_comments(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<CommentView>>> {
    let concern = load_concern(&state, id).await?;
    let comments = state.repo.list_comments(id).await?;
    Ok(Json(
        comments
            .into_iter()
            .map(|c| CommentView::for_viewer(c, &concern, viewer.as_ref()))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/departments",
    responses((status = 200, description = "Departments", body = [Department]))
)]
pub async fn list_departments(State(state): State<AppState>) -> AppResult<Json<Vec<Department>>> {
    Ok(Json(state.repo.list_departments().await?))
}

/// get_sdg_metrics
///
/// [Public Route] Concern totals mapped onto the UN Sustainable Development Goals.
#[utoipa::path(
    get,
    path = "/sdg/metrics",
    responses((status = 200, description = "SDG metrics", body = [SdgMetric]))
)]
pub async fn get_sdg_metrics(State(state): State<AppState>) -> AppResult<Json<Vec<SdgMetric>>> {
    Ok(Json(state.repo.get_analytics().await?.sdg))
}

// --- Authenticated Handlers ---

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "No session")
    )
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<UserProfile>> {
    let profile = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or_else(|| AppError::not_found("profile"))?;
    Ok(Json(UserProfile {
        landing: landing_for(Some(profile.role)),
        user: profile,
    }))
}

/// update_me
///
/// [Authenticated Route] Partial profile update. Role and department are not
/// editable here.
#[utoipa::path(
    put,
    path = "/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = User))
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    payload.validate()?;
    state
        .repo
        .update_profile(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("profile"))
}

#[utoipa::path(
    get,
    path = "/me/landing",
    responses((status = 200, description = "Landing page for the caller's role", body = LandingResponse))
)]
pub async fn get_landing(AuthUser { role, .. }: AuthUser) -> Json<LandingResponse> {
    let landing = landing_for(Some(role));
    Json(LandingResponse {
        landing,
        path: landing.path().to_string(),
    })
}

/// get_my_concerns
///
/// [Authenticated Route] The caller's own concerns, anonymous ones included.
#[utoipa::path(
    get,
    path = "/me/concerns",
    responses((status = 200, description = "My concerns", body = [ConcernView]))
)]
pub async fn get_my_concerns(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ConcernView>>> {
    let filter = ConcernFilter {
        citizen_id: Some(user.id),
        limit: Some(ConcernFilter::MAX_LIMIT),
        ..ConcernFilter::default()
    };
    let concerns = state.repo.list_concerns(filter).await?;
    Ok(Json(
        concerns
            .into_iter()
            .map(|c| ConcernView::for_viewer(c, Some(&user)))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/me/rewards",
    responses((status = 200, description = "Reward ledger", body = RewardSummary))
)]
pub async fn get_my_rewards(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<RewardSummary>> {
    Ok(Json(state.repo.get_rewards(id).await?))
}

/// vote_concern
///
/// [Authenticated Route] One vote per user per concern; a second vote is a 409.
#[utoipa::path(
    post,
    path = "/concerns/{id}/vote",
    params(("id" = Uuid, Path, description = "Concern ID")),
    request_body = VoteRequest,
    responses(
        (status = 204, description = "Voted"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Duplicate")
    )
)]
pub async fn vote_concern(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> AppResult<StatusCode> {
    load_concern(&state, id).await?;
    if state.repo.vote_concern(id, user_id, payload.upvote).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Conflict("already voted on this concern".to_string()))
    }
}

/// add_comment
///
/// [Authenticated Route] Comments from staff are marked official. The submitter
/// is notified unless they wrote the comment themselves.
#[utoipa::path(
    post,
    path = "/concerns/{id}/comments",
    params(("id" = Uuid, Path, description = "Concern ID")),
    request_body = CreateCommentRequest,
    responses((status = 201, description = "Comment Added", body = ConcernComment))
)]
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<ConcernComment>)> {
    payload.validate()?;
    let concern = load_concern(&state, id).await?;

    let comment = state
        .repo
        .add_comment(id, user.id, payload.body, user.role.is_staff())
        .await?;

    if concern.citizen_id != user.id {
        let notice = NewNotification {
            user_id: concern.citizen_id,
            concern_id: Some(concern.id),
            kind: NotificationKind::CommentAdded,
            message: format!("New comment on \"{}\".", concern.title),
        };
        if let Err(e) = state.notifier.dispatch(notice).await {
            tracing::error!(concern_id = %concern.id, error = %e, "comment notification failed");
        }
    }

    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    get,
    path = "/notifications",
    responses((status = 200, description = "Notifications, newest first", body = [UserNotification]))
)]
pub async fn get_notifications(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserNotification>>> {
    Ok(Json(state.repo.list_notifications(id).await?))
}

#[utoipa::path(
    patch,
    path = "/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 404, description = "Not Found or not the caller's")
    )
)]
pub async fn mark_notification_read(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.mark_notification_read(id, user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("notification {id}")))
    }
}

/// get_presigned_url
///
/// [Authenticated Route] A short-lived PUT URL for a concern attachment. The
/// returned key is what the client submits in `attachment_keys`.
#[utoipa::path(
    post,
    path = "/upload/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Presigned upload URL", body = PresignedUrlResponse),
        (status = 400, description = "Unsupported content type")
    )
)]
pub async fn get_presigned_url(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> AppResult<Json<PresignedUrlResponse>> {
    let key = attachment_key(&payload.filename, &payload.file_type)?;
    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, &payload.file_type)
        .await?;

    tracing::debug!(user_id = %id, key = %key, "issued attachment upload url");
    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: key,
    }))
}

// --- Citizen Handlers ---

/// create_concern
///
/// [Citizen Route] Submits a new concern in status `New`. The submitter is
/// always recorded, even when the concern is anonymous.
#[utoipa::path(
    post,
    path = "/concerns",
    request_body = CreateConcernRequest,
    responses(
        (status = 201, description = "Created", body = ConcernView),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not a citizen")
    )
)]
pub async fn create_concern(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateConcernRequest>,
) -> AppResult<(StatusCode, Json<ConcernView>)> {
    ensure_access(&user, Resource::SubmitConcern)?;
    payload.validate()?;

    let concern = state
        .repo
        .create_concern(Concern::submitted(user.id, payload, Utc::now()))
        .await?;

    tracing::info!(concern_id = %concern.id, category = %concern.category, "concern submitted");
    Ok((
        StatusCode::CREATED,
        Json(ConcernView::for_viewer(concern, Some(&user))),
    ))
}

// --- Staff Handlers ---

/// update_concern_status
///
/// [Staff Route] Moves a concern along its lifecycle. When `expected_version`
/// is sent and the concern has moved on since, the request fails with 409 and
/// the client should reload before retrying.
#[utoipa::path(
    put,
    path = "/concerns/{id}/status",
    params(("id" = Uuid, Path, description = "Concern ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated", body = ConcernView),
        (status = 403, description = "Role may not change status"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Concern changed concurrently"),
        (status = 422, description = "Transition not allowed")
    )
)]
pub async fn update_concern_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<ConcernView>> {
    ensure_access(&user, Resource::ConcernTriage)?;
    let snapshot = load_concern(&state, id).await?;

    if let Some(expected) = payload.expected_version {
        if expected != snapshot.version() {
            return Err(AppError::Conflict(format!(
                "concern is at version {}, not {expected}",
                snapshot.version()
            )));
        }
    }

    let updated = lifecycle::transition(
        &state.repo,
        &state.notifier,
        &snapshot,
        payload.status,
        &user,
        payload.note,
    )
    .await?;

    Ok(Json(ConcernView::for_viewer(updated, Some(&user))))
}

/// assign_concern
///
/// [Staff Route] Routes a concern to a department and/or officer. The officer
/// must hold a staff role and is notified of the assignment.
#[utoipa::path(
    put,
    path = "/concerns/{id}/assignment",
    params(("id" = Uuid, Path, description = "Concern ID")),
    request_body = AssignConcernRequest,
    responses(
        (status = 200, description = "Assigned", body = ConcernView),
        (status = 400, description = "Unknown department or officer")
    )
)]
pub async fn assign_concern(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignConcernRequest>,
) -> AppResult<Json<ConcernView>> {
    ensure_access(&user, Resource::ConcernTriage)?;

    if let Some(department_id) = payload.department_id {
        let known = state
            .repo
            .list_departments()
            .await?
            .iter()
            .any(|d| d.id == department_id && d.is_active);
        if !known {
            return Err(AppError::Validation(format!(
                "unknown or inactive department {department_id}"
            )));
        }
    }
    if let Some(officer_id) = payload.officer_id {
        let officer = state.repo.get_user(officer_id).await?;
        if !officer.is_some_and(|o| o.role.is_staff()) {
            return Err(AppError::Validation(format!(
                "{officer_id} is not a staff member"
            )));
        }
    }

    let officer_id = payload.officer_id;
    let concern = state
        .repo
        .assign_concern(id, payload)
        .await?
        .ok_or_else(|| AppError::not_found(format!("concern {id}")))?;

    tracing::info!(concern_id = %concern.id, by = %user.id, "concern assigned");

    if let Some(officer_id) = officer_id {
        let notice = NewNotification {
            user_id: officer_id,
            concern_id: Some(concern.id),
            kind: NotificationKind::Assigned,
            message: format!("You were assigned \"{}\".", concern.title),
        };
        if let Err(e) = state.notifier.dispatch(notice).await {
            tracing::error!(concern_id = %concern.id, error = %e, "assignment notification failed");
        }
    }

    Ok(Json(ConcernView::for_viewer(concern, Some(&user))))
}

// --- Admin Handlers ---

#[utoipa::path(
    get,
    path = "/admin/analytics",
    responses(
        (status = 200, description = "Dashboard analytics", body = AnalyticsSummary),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn get_analytics(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<AnalyticsSummary>> {
    ensure_access(&user, Resource::Analytics)?;
    Ok(Json(state.repo.get_analytics().await?))
}

#[utoipa::path(
    post,
    path = "/admin/departments",
    request_body = CreateDepartmentRequest,
    responses((status = 201, description = "Created", body = Department))
)]
pub async fn create_department(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateDepartmentRequest>,
) -> AppResult<(StatusCode, Json<Department>)> {
    ensure_access(&user, Resource::DepartmentAdmin)?;
    payload.validate()?;
    let department = state.repo.create_department(payload).await?;
    Ok((StatusCode::CREATED, Json(department)))
}

#[utoipa::path(
    put,
    path = "/admin/departments/{id}",
    params(("id" = Uuid, Path, description = "Department ID")),
    request_body = UpdateDepartmentRequest,
    responses((status = 200, description = "Updated", body = Department))
)]
pub async fn update_department(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDepartmentRequest>,
) -> AppResult<Json<Department>> {
    ensure_access(&user, Resource::DepartmentAdmin)?;
    if payload.name.as_ref().is_some_and(|n| n.trim().len() < 2) {
        return Err(AppError::Validation(
            "department name must be at least 2 characters".to_string(),
        ));
    }
    state
        .repo
        .update_department(id, payload)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("department {id}")))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All profiles", body = [User]))
)]
pub async fn list_users(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    ensure_access(&user, Resource::UserAdmin)?;
    Ok(Json(state.repo.list_users().await?))
}

/// update_user_role
///
/// [Super Admin Route] Grants or revokes a role. Only staff roles carry a
/// department, and a super admin cannot change their own role.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<User>> {
    ensure_access(&user, Resource::UserAdmin)?;
    if id == user.id {
        return Err(AppError::forbidden("cannot change your own role"));
    }
    if payload.role == Role::Citizen && payload.department_id.is_some() {
        return Err(AppError::Validation(
            "citizens do not belong to a department".to_string(),
        ));
    }

    let updated = state
        .repo
        .set_user_role(id, payload.role, payload.department_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))?;

    tracing::info!(user_id = %id, role = ?updated.role, by = %user.id, "role changed");
    Ok(Json(updated))
}
