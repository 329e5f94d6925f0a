use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    lifecycle::{ApprovedTransition, ConcernStatus},
    policy::{Landing, Role},
};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A row of `public.profiles`. The id mirrors the identity provider's user id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub ward: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    // Staff only.
    pub department_id: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Concern
///
/// A row of `public.concerns`. `status`, `resolved_at` and `version` are private:
/// they change only through `apply_transition`, which demands an approved
/// lifecycle step.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Concern {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub priority: i32,
    pub urgency: i32,
    pub impact: i32,
    status: ConcernStatus,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub ward: Option<String>,

    /// Always set, even for anonymous concerns. Exposed to clients through
    /// `ConcernView::submitted_by`.
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub citizen_id: Uuid,
    pub is_anonymous: bool,

    pub department_id: Option<Uuid>,
    pub assigned_officer_id: Option<Uuid>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,

    pub tags: Vec<String>,
    // S3 keys produced by the presigned upload flow.
    pub attachment_keys: Vec<String>,
    // Precomputed upstream; stored as given.
    pub sentiment_score: Option<f64>,
    pub upvotes: i32,
    pub downvotes: i32,

    version: i32,
}

impl Concern {
    /// A freshly submitted concern in `New`.
    pub fn submitted(citizen_id: Uuid, req: CreateConcernRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            category: req.category,
            subcategory: req.subcategory,
            priority: req.priority,
            urgency: req.urgency,
            impact: req.impact,
            status: ConcernStatus::New,
            latitude: req.latitude,
            longitude: req.longitude,
            address: req.address,
            region: req.region,
            ward: req.ward,
            citizen_id,
            is_anonymous: req.is_anonymous,
            department_id: None,
            assigned_officer_id: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolution_notes: None,
            tags: req.tags,
            attachment_keys: req.attachment_keys,
            sentiment_score: req.sentiment_score,
            upvotes: 0,
            downvotes: 0,
            version: 1,
        }
    }

    pub fn status(&self) -> ConcernStatus {
        self.status
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Optimistic concurrency counter; bumped on every committed transition.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Whether `viewer` may learn who submitted this concern.
    pub fn reveals_submitter_to(&self, viewer: Option<&AuthUser>) -> bool {
        !self.is_anonymous
            || viewer.is_some_and(|v| v.role.is_staff() || v.id == self.citizen_id)
    }

    /// Copies the lifecycle columns of a committed transition onto the stored
    /// row, leaving votes and assignment as they are.
    pub(crate) fn commit_from(&mut self, next: &Concern) {
        self.status = next.status;
        self.updated_at = self.updated_at.max(next.updated_at);
        self.resolved_at = next.resolved_at;
        self.resolution_notes = next.resolution_notes.clone();
        self.version = next.version;
    }

    /// Applies an approved lifecycle step and returns the audit entry to append.
    ///
    /// `updated_at` never moves backwards, even if `now` is behind the stored
    /// timestamp (clock skew between app servers).
    pub fn apply_transition(
        &mut self,
        approved: ApprovedTransition,
        actor_id: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<ConcernUpdate> {
        if approved.from() != self.status {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: approved.to(),
            });
        }

        let at = now.max(self.updated_at);
        self.status = approved.to();
        self.updated_at = at;
        self.version += 1;

        match self.status {
            ConcernStatus::Resolved => {
                self.resolved_at = Some(at);
                self.resolution_notes = note.clone();
            }
            ConcernStatus::Rejected => {
                self.resolution_notes = note.clone();
            }
            _ => {}
        }

        Ok(ConcernUpdate {
            id: Uuid::new_v4(),
            concern_id: self.id,
            status: self.status,
            note,
            updated_by: actor_id,
            created_at: at,
        })
    }
}

/// ConcernView
///
/// A concern as a particular viewer may see it. `submitted_by` is hidden for
/// anonymous concerns unless the viewer is staff or the submitter.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ConcernView {
    #[serde(flatten)]
    #[ts(flatten)]
    pub concern: Concern,
    pub submitted_by: Option<Uuid>,
}

impl ConcernView {
    pub fn for_viewer(concern: Concern, viewer: Option<&AuthUser>) -> Self {
        let submitted_by = concern
            .reveals_submitter_to(viewer)
            .then_some(concern.citizen_id);
        Self {
            concern,
            submitted_by,
        }
    }
}

/// ConcernUpdate
///
/// One entry of the append-only status audit trail (`public.concern_updates`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct ConcernUpdate {
    pub id: Uuid,
    pub concern_id: Uuid,
    pub status: ConcernStatus,
    pub note: Option<String>,
    pub updated_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// ConcernComment
///
/// A remark on a concern. Comments written by staff are flagged official.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ConcernComment {
    pub id: Uuid,
    pub concern_id: Uuid,
    pub user_id: Uuid,
    pub body: String,
    pub is_official: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    // Loaded via a JOIN on profiles.
    #[sqlx(default)]
    pub author_name: Option<String>,
}

/// CommentView
///
/// A comment as served publicly. On an anonymous concern the submitter's own
/// comments lose their author unless the viewer could see the submitter anyway.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentView {
    pub id: Uuid,
    pub concern_id: Uuid,
    pub user_id: Option<Uuid>,
    pub body: String,
    pub is_official: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub author_name: Option<String>,
}

impl CommentView {
    pub fn for_viewer(comment: ConcernComment, concern: &Concern, viewer: Option<&AuthUser>) -> Self {
        let hide = comment.user_id == concern.citizen_id && !concern.reveals_submitter_to(viewer);
        Self {
            id: comment.id,
            concern_id: comment.concern_id,
            user_id: (!hide).then_some(comment.user_id),
            body: comment.body,
            is_official: comment.is_official,
            created_at: comment.created_at,
            author_name: if hide { None } else { comment.author_name },
        }
    }
}

/// Department
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    /// Concern categories this department is responsible for.
    pub categories: Vec<String>,
    pub head_officer_id: Option<Uuid>,
    pub is_active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Notifications & Rewards ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[ts(export)]
#[repr(i32)]
pub enum NotificationKind {
    #[default]
    StatusChanged = 1,
    CommentAdded = 2,
    Assigned = 3,
}

/// UserNotification
///
/// A row of `public.user_notifications`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct UserNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub concern_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub is_read: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Input to the notification dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub concern_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub message: String,
}

/// RewardEntry
///
/// A ledger row of `public.reward_points`, written by database triggers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct RewardEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub concern_id: Option<Uuid>,
    pub points: i32,
    pub reason: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RewardSummary {
    pub total_points: i64,
    pub entries: Vec<RewardEntry>,
}

// --- Request Payloads (Input Schemas) ---

/// CreateConcernRequest
///
/// Input payload for POST /concerns. Attachment keys come from the presigned
/// upload flow.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateConcernRequest {
    #[validate(length(min = 5, max = 200))]
    pub title: String,
    #[validate(length(min = 10, max = 5000))]
    pub description: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub subcategory: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub priority: i32,
    #[validate(range(min = 1, max = 5))]
    pub urgency: i32,
    #[validate(range(min = 1, max = 5))]
    pub impact: i32,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub ward: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachment_keys: Vec<String>,
    pub sentiment_score: Option<f64>,
}

/// UpdateStatusRequest
///
/// Input payload for PUT /concerns/{id}/status. `expected_version` is the
/// version the officer was looking at; when omitted the latest is used.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateStatusRequest {
    pub status: ConcernStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignConcernRequest {
    pub department_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VoteRequest {
    pub upvote: bool,
}

/// RegisterUserRequest
///
/// Input payload for POST /register. The password is forwarded to the identity
/// provider and never stored or logged here. Self-registration always yields a
/// Citizen; staff roles are granted through the user admin endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1, max = 150))]
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub region: Option<String>,
    pub ward: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub user: User,
    pub landing: Landing,
}

/// UpdateProfileRequest
///
/// Partial update for PUT /me; absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 150))]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateDepartmentRequest {
    #[validate(length(min = 2, max = 150))]
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub head_officer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateDepartmentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_officer_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL for a concern attachment.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    #[schema(example = "pothole.jpg")]
    pub filename: String,
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    /// Key to put into `attachment_keys` when submitting the concern.
    pub resource_key: String,
}

// --- Dashboard & Profile Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    #[serde(flatten)]
    #[ts(flatten)]
    pub user: User,
    pub landing: Landing,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LandingResponse {
    pub landing: Landing,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct StatusCount {
    pub status: ConcernStatus,
    pub count: i64,
}

/// Concern totals per category (or region), with how many reached `Resolved`
/// or `Closed`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct GroupCount {
    pub key: String,
    pub total: i64,
    pub resolved: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct SdgMetric {
    pub goal: i32,
    pub label: String,
    pub total: i64,
    pub resolved: i64,
}

/// AnalyticsSummary
///
/// Output of GET /admin/analytics.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AnalyticsSummary {
    pub total_concerns: i64,
    pub total_users: i64,
    pub resolved_concerns: i64,
    pub average_resolution_hours: Option<f64>,
    pub by_status: Vec<StatusCount>,
    pub by_category: Vec<GroupCount>,
    pub by_region: Vec<GroupCount>,
    pub sdg: Vec<SdgMetric>,
}

/// ConcernFilter
///
/// Query parameters of GET /concerns. `citizen_id` is never read from the
/// query string; GET /me/concerns sets it from the session.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct ConcernFilter {
    pub status: Option<ConcernStatus>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub ward: Option<String>,
    pub department_id: Option<Uuid>,
    /// Case-insensitive match on title and description.
    pub search: Option<String>,
    #[serde(skip)]
    pub citizen_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl ConcernFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 500;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}
