use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        AnalyticsSummary, AssignConcernRequest, Concern, ConcernComment, ConcernFilter,
        ConcernUpdate, CreateDepartmentRequest, Department, NewNotification, RewardSummary,
        UpdateDepartmentRequest, UpdateProfileRequest, User, UserNotification,
    },
    policy::Role,
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Points credited to a citizen when a concern is submitted.
pub const SUBMISSION_POINTS: i32 = 10;
/// Points credited to the submitter when their concern reaches `Resolved`.
pub const RESOLUTION_POINTS: i32 = 25;

/// Repository
///
/// The persistence contract. Handlers and the lifecycle service only see this
/// trait, shared as `Arc<dyn Repository>`, so Postgres and the in-memory store
/// are interchangeable.
///
/// `commit_transition` is the one write path for concern status: it stores the
/// transitioned concern and appends its audit entry atomically, and only if the
/// stored version still equals `expected_version`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn create_user(&self, user: User) -> AppResult<User>;
    async fn update_profile(&self, id: Uuid, req: UpdateProfileRequest)
    -> AppResult<Option<User>>;
    /// Stamps `last_login_at`.
    async fn record_login(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    async fn set_user_role(
        &self,
        id: Uuid,
        role: Role,
        department_id: Option<Uuid>,
    ) -> AppResult<Option<User>>;

    // --- Concerns ---
    async fn create_concern(&self, concern: Concern) -> AppResult<Concern>;
    async fn get_concern(&self, id: Uuid) -> AppResult<Option<Concern>>;
    async fn list_concerns(&self, filter: ConcernFilter) -> AppResult<Vec<Concern>>;
    /// Fails with `Conflict` when another writer committed first, `NotFound`
    /// when the concern is gone. Nothing is written in either case.
    async fn commit_transition(
        &self,
        next: &Concern,
        expected_version: i32,
        update: &ConcernUpdate,
    ) -> AppResult<Concern>;
    /// Oldest first.
    async fn list_updates(&self, concern_id: Uuid) -> AppResult<Vec<ConcernUpdate>>;
    async fn assign_concern(
        &self,
        id: Uuid,
        req: AssignConcernRequest,
    ) -> AppResult<Option<Concern>>;
    /// One vote per user per concern: returns false if the user already voted.
    async fn vote_concern(&self, concern_id: Uuid, user_id: Uuid, upvote: bool) -> AppResult<bool>;

    // --- Comments ---
    async fn add_comment(
        &self,
        concern_id: Uuid,
        user_id: Uuid,
        body: String,
        is_official: bool,
    ) -> AppResult<ConcernComment>;
    async fn list_comments(&self, concern_id: Uuid) -> AppResult<Vec<ConcernComment>>;

    // --- Departments ---
    async fn list_departments(&self) -> AppResult<Vec<Department>>;
    async fn create_department(&self, req: CreateDepartmentRequest) -> AppResult<Department>;
    async fn update_department(
        &self,
        id: Uuid,
        req: UpdateDepartmentRequest,
    ) -> AppResult<Option<Department>>;

    // --- Analytics ---
    async fn get_analytics(&self) -> AppResult<AnalyticsSummary>;

    // --- Notifications & Rewards ---
    async fn insert_notification(&self, notice: NewNotification) -> AppResult<UserNotification>;
    /// Newest first.
    async fn list_notifications(&self, user_id: Uuid) -> AppResult<Vec<UserNotification>>;
    /// Ownership-checked: false if the notification is missing or not the user's.
    async fn mark_notification_read(&self, notification_id: Uuid, user_id: Uuid)
    -> AppResult<bool>;
    async fn get_rewards(&self, user_id: Uuid) -> AppResult<RewardSummary>;
}

pub type RepositoryState = Arc<dyn Repository>;
