use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RESOLUTION_POINTS, Repository, SUBMISSION_POINTS};
use crate::{
    analytics,
    error::{AppError, AppResult},
    lifecycle::ConcernStatus,
    models::{
        AnalyticsSummary, AssignConcernRequest, Concern, ConcernComment, ConcernFilter,
        ConcernUpdate, CreateDepartmentRequest, Department, NewNotification, RewardEntry,
        RewardSummary, UpdateDepartmentRequest, UpdateProfileRequest, User, UserNotification,
    },
    policy::Role,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    concerns: HashMap<Uuid, Concern>,
    updates: Vec<ConcernUpdate>,
    comments: Vec<ConcernComment>,
    votes: HashSet<(Uuid, Uuid)>,
    departments: HashMap<Uuid, Department>,
    notifications: Vec<UserNotification>,
    rewards: Vec<RewardEntry>,
}

impl Tables {
    fn reward(&mut self, user_id: Uuid, concern_id: Uuid, points: i32, reason: &str) {
        self.rewards.push(RewardEntry {
            id: Uuid::new_v4(),
            user_id,
            concern_id: Some(concern_id),
            points,
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
    }
}

/// MemoryRepository
///
/// `Repository` over a single `RwLock`ed set of tables, for demos and tests.
/// Every write takes the write lock, so the version check in
/// `commit_transition` and the write it guards are atomic, the same way the
/// Postgres transaction makes them. Reward credits mirror the database
/// triggers of the SQL schema.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a profile directly, bypassing the identity provider.
    pub async fn insert_user(&self, user: User) -> User {
        self.tables
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) || tables.users.values().any(|u| u.email == user.email)
        {
            return Err(AppError::Conflict(format!("profile {} already exists", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> AppResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(full_name) = req.full_name {
            user.full_name = full_name;
        }
        if req.phone.is_some() {
            user.phone = req.phone;
        }
        if req.address.is_some() {
            user.address = req.address;
        }
        if req.region.is_some() {
            user.region = req.region;
        }
        if req.ward.is_some() {
            user.ward = req.ward;
        }
        Ok(Some(user.clone()))
    }

    async fn record_login(&self, id: Uuid) -> AppResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.last_login_at = Some(Utc::now());
            user.clone()
        }))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.tables.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn set_user_role(
        &self,
        id: Uuid,
        role: Role,
        department_id: Option<Uuid>,
    ) -> AppResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.role = role;
            user.department_id = department_id;
            user.clone()
        }))
    }

    async fn create_concern(&self, concern: Concern) -> AppResult<Concern> {
        let mut tables = self.tables.write().await;
        if tables.concerns.contains_key(&concern.id) {
            return Err(AppError::Conflict(format!("concern {} already exists", concern.id)));
        }
        tables.reward(
            concern.citizen_id,
            concern.id,
            SUBMISSION_POINTS,
            "concern submitted",
        );
        tables.concerns.insert(concern.id, concern.clone());
        Ok(concern)
    }

    async fn get_concern(&self, id: Uuid) -> AppResult<Option<Concern>> {
        Ok(self.tables.read().await.concerns.get(&id).cloned())
    }

    async fn list_concerns(&self, filter: ConcernFilter) -> AppResult<Vec<Concern>> {
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        let search = filter.search.as_deref().map(str::to_lowercase);
        let tables = self.tables.read().await;

        let mut concerns: Vec<Concern> = tables
            .concerns
            .values()
            .filter(|c| filter.status.is_none_or(|s| c.status() == s))
            .filter(|c| filter.category.as_ref().is_none_or(|v| &c.category == v))
            .filter(|c| filter.region.is_none() || c.region == filter.region)
            .filter(|c| filter.ward.is_none() || c.ward == filter.ward)
            .filter(|c| filter.department_id.is_none() || c.department_id == filter.department_id)
            .filter(|c| filter.citizen_id.is_none_or(|id| c.citizen_id == id))
            .filter(|c| {
                search.as_ref().is_none_or(|needle| {
                    c.title.to_lowercase().contains(needle)
                        || c.description.to_lowercase().contains(needle)
                })
            })
            .cloned()
            .collect();

        concerns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        concerns.truncate(limit);
        Ok(concerns)
    }

    async fn commit_transition(
        &self,
        next: &Concern,
        expected_version: i32,
        update: &ConcernUpdate,
    ) -> AppResult<Concern> {
        let mut tables = self.tables.write().await;

        let stored = tables
            .concerns
            .get_mut(&next.id)
            .ok_or_else(|| AppError::not_found(format!("concern {}", next.id)))?;
        if stored.version() != expected_version {
            return Err(AppError::Conflict(format!(
                "concern {} changed since version {expected_version}",
                next.id
            )));
        }

        // Only the lifecycle columns; votes and assignment stay as stored.
        stored.commit_from(next);
        let committed = stored.clone();

        if committed.status() == ConcernStatus::Resolved {
            tables.reward(
                committed.citizen_id,
                committed.id,
                RESOLUTION_POINTS,
                "concern resolved",
            );
        }
        tables.updates.push(update.clone());
        Ok(committed)
    }

    async fn list_updates(&self, concern_id: Uuid) -> AppResult<Vec<ConcernUpdate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .updates
            .iter()
            .filter(|u| u.concern_id == concern_id)
            .cloned()
            .collect())
    }

    async fn assign_concern(
        &self,
        id: Uuid,
        req: AssignConcernRequest,
    ) -> AppResult<Option<Concern>> {
        let mut tables = self.tables.write().await;
        Ok(tables.concerns.get_mut(&id).map(|concern| {
            if req.department_id.is_some() {
                concern.department_id = req.department_id;
            }
            if req.officer_id.is_some() {
                concern.assigned_officer_id = req.officer_id;
            }
            concern.updated_at = concern.updated_at.max(Utc::now());
            concern.clone()
        }))
    }

    async fn vote_concern(&self, concern_id: Uuid, user_id: Uuid, upvote: bool) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.concerns.contains_key(&concern_id) {
            return Err(AppError::not_found(format!("concern {concern_id}")));
        }
        if !tables.votes.insert((concern_id, user_id)) {
            return Ok(false);
        }
        if let Some(concern) = tables.concerns.get_mut(&concern_id) {
            if upvote {
                concern.upvotes += 1;
            } else {
                concern.downvotes += 1;
            }
        }
        Ok(true)
    }

    async fn add_comment(
        &self,
        concern_id: Uuid,
        user_id: Uuid,
        body: String,
        is_official: bool,
    ) -> AppResult<ConcernComment> {
        let mut tables = self.tables.write().await;
        let author_name = tables.users.get(&user_id).map(|u| u.full_name.clone());
        let comment = ConcernComment {
            id: Uuid::new_v4(),
            concern_id,
            user_id,
            body,
            is_official,
            created_at: Utc::now(),
            author_name,
        };
        tables.comments.push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, concern_id: Uuid) -> AppResult<Vec<ConcernComment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.concern_id == concern_id)
            .cloned()
            .collect())
    }

    async fn list_departments(&self) -> AppResult<Vec<Department>> {
        let mut departments: Vec<Department> = self
            .tables
            .read()
            .await
            .departments
            .values()
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn create_department(&self, req: CreateDepartmentRequest) -> AppResult<Department> {
        let mut tables = self.tables.write().await;
        if tables.departments.values().any(|d| d.name == req.name) {
            return Err(AppError::Conflict(format!("department {} already exists", req.name)));
        }
        let department = Department {
            id: Uuid::new_v4(),
            name: req.name,
            categories: req.categories,
            head_officer_id: req.head_officer_id,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.departments.insert(department.id, department.clone());
        Ok(department)
    }

    async fn update_department(
        &self,
        id: Uuid,
        req: UpdateDepartmentRequest,
    ) -> AppResult<Option<Department>> {
        let mut tables = self.tables.write().await;
        Ok(tables.departments.get_mut(&id).map(|department| {
            if let Some(name) = req.name {
                department.name = name;
            }
            if let Some(categories) = req.categories {
                department.categories = categories;
            }
            if req.head_officer_id.is_some() {
                department.head_officer_id = req.head_officer_id;
            }
            if let Some(is_active) = req.is_active {
                department.is_active = is_active;
            }
            department.clone()
        }))
    }

    async fn get_analytics(&self) -> AppResult<AnalyticsSummary> {
        let tables = self.tables.read().await;
        let concerns: Vec<Concern> = tables.concerns.values().cloned().collect();
        Ok(analytics::summarize(&concerns, tables.users.len() as i64))
    }

    async fn insert_notification(&self, notice: NewNotification) -> AppResult<UserNotification> {
        let notification = UserNotification {
            id: Uuid::new_v4(),
            user_id: notice.user_id,
            concern_id: notice.concern_id,
            kind: notice.kind,
            message: notice.message,
            is_read: false,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, user_id: Uuid) -> AppResult<Vec<UserNotification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        match tables
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_rewards(&self, user_id: Uuid) -> AppResult<RewardSummary> {
        let tables = self.tables.read().await;
        let entries: Vec<RewardEntry> = tables
            .rewards
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        let total_points = entries.iter().map(|e| i64::from(e.points)).sum();
        Ok(RewardSummary {
            total_points,
            entries,
        })
    }
}
