use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use uuid::Uuid;

use super::Repository;
use crate::{
    analytics::{UNSPECIFIED_REGION, sdg_metrics, sort_groups, status_counts},
    error::{AppError, AppResult},
    lifecycle::ConcernStatus,
    models::{
        AnalyticsSummary, AssignConcernRequest, Concern, ConcernComment, ConcernFilter,
        ConcernUpdate, CreateDepartmentRequest, Department, GroupCount, NewNotification,
        RewardEntry, RewardSummary, UpdateDepartmentRequest, UpdateProfileRequest, User,
        UserNotification,
    },
    policy::Role,
};

const USER_COLUMNS: &str = "id, email, full_name, phone, address, region, ward, role, \
     is_verified, department_id, created_at, last_login_at";

const CONCERN_COLUMNS: &str = "id, title, description, category, subcategory, priority, \
     urgency, impact, status, latitude, longitude, address, region, ward, citizen_id, \
     is_anonymous, department_id, assigned_officer_id, created_at, updated_at, resolved_at, \
     resolution_notes, tags, attachment_keys, sentiment_score, upvotes, downvotes, version";

const DEPARTMENT_COLUMNS: &str = "id, name, categories, head_officer_id, is_active, created_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, concern_id, kind, message, is_read, created_at";

/// PostgresRepository
///
/// `Repository` backed by the sqlx Postgres pool. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM profiles WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Mirrors an identity-provider account into `profiles`.
    async fn create_user(&self, user: User) -> AppResult<User> {
        let sql = format!(
            "INSERT INTO profiles (id, email, full_name, phone, address, region, ward, role, is_verified, department_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.email)
            .bind(user.full_name)
            .bind(user.phone)
            .bind(user.address)
            .bind(user.region)
            .bind(user.ward)
            .bind(user.role)
            .bind(user.is_verified)
            .bind(user.department_id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// COALESCE keeps stored values for absent fields.
    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> AppResult<Option<User>> {
        let sql = format!(
            "UPDATE profiles
             SET full_name = COALESCE($2, full_name),
                 phone = COALESCE($3, phone),
                 address = COALESCE($4, address),
                 region = COALESCE($5, region),
                 ward = COALESCE($6, ward)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.full_name)
            .bind(req.phone)
            .bind(req.address)
            .bind(req.region)
            .bind(req.ward)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn record_login(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!(
            "UPDATE profiles SET last_login_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM profiles ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    async fn set_user_role(
        &self,
        id: Uuid,
        role: Role,
        department_id: Option<Uuid>,
    ) -> AppResult<Option<User>> {
        let sql = format!(
            "UPDATE profiles SET role = $2, department_id = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role)
            .bind(department_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// The `reward_on_submission` trigger credits the citizen on insert.
    async fn create_concern(&self, concern: Concern) -> AppResult<Concern> {
        let sql = format!(
            "INSERT INTO concerns (
                id, title, description, category, subcategory, priority, urgency, impact,
                status, latitude, longitude, address, region, ward, citizen_id, is_anonymous,
                created_at, updated_at, tags, attachment_keys, sentiment_score, version
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21, $22)
             RETURNING {CONCERN_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Concern>(&sql)
            .bind(concern.id)
            .bind(&concern.title)
            .bind(&concern.description)
            .bind(&concern.category)
            .bind(&concern.subcategory)
            .bind(concern.priority)
            .bind(concern.urgency)
            .bind(concern.impact)
            .bind(concern.status())
            .bind(concern.latitude)
            .bind(concern.longitude)
            .bind(&concern.address)
            .bind(&concern.region)
            .bind(&concern.ward)
            .bind(concern.citizen_id)
            .bind(concern.is_anonymous)
            .bind(concern.created_at)
            .bind(concern.updated_at)
            .bind(&concern.tags)
            .bind(&concern.attachment_keys)
            .bind(concern.sentiment_score)
            .bind(concern.version())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_concern(&self, id: Uuid) -> AppResult<Option<Concern>> {
        let sql = format!("SELECT {CONCERN_COLUMNS} FROM concerns WHERE id = $1");
        Ok(sqlx::query_as::<_, Concern>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_concerns(&self, filter: ConcernFilter) -> AppResult<Vec<Concern>> {
        let limit = filter.effective_limit();
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {CONCERN_COLUMNS} FROM concerns WHERE TRUE"));

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category);
        }
        if let Some(region) = filter.region {
            builder.push(" AND region = ").push_bind(region);
        }
        if let Some(ward) = filter.ward {
            builder.push(" AND ward = ").push_bind(ward);
        }
        if let Some(department_id) = filter.department_id {
            builder.push(" AND department_id = ").push_bind(department_id);
        }
        if let Some(citizen_id) = filter.citizen_id {
            builder.push(" AND citizen_id = ").push_bind(citizen_id);
        }
        if let Some(search) = filter.search {
            let pattern = format!("%{search}%");
            builder.push(" AND (title ILIKE ").push_bind(pattern.clone());
            builder.push(" OR description ILIKE ").push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        Ok(builder
            .build_query_as::<Concern>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Version-checked UPDATE and audit INSERT in one transaction. A zero-row
    /// UPDATE rolls back (the transaction is dropped uncommitted).
    async fn commit_transition(
        &self,
        next: &Concern,
        expected_version: i32,
        update: &ConcernUpdate,
    ) -> AppResult<Concern> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE concerns
             SET status = $3, updated_at = GREATEST(updated_at, $4), resolved_at = $5, resolution_notes = $6, version = $7
             WHERE id = $1 AND version = $2
             RETURNING {CONCERN_COLUMNS}"
        );
        let committed = sqlx::query_as::<_, Concern>(&sql)
            .bind(next.id)
            .bind(expected_version)
            .bind(next.status())
            .bind(next.updated_at)
            .bind(next.resolved_at())
            .bind(&next.resolution_notes)
            .bind(next.version())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(committed) = committed else {
            let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM concerns WHERE id = $1")
                .bind(next.id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return Err(if exists {
                AppError::Conflict(format!(
                    "concern {} changed since version {expected_version}",
                    next.id
                ))
            } else {
                AppError::not_found(format!("concern {}", next.id))
            });
        };

        sqlx::query(
            "INSERT INTO concern_updates (id, concern_id, status, note, updated_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(update.id)
        .bind(update.concern_id)
        .bind(update.status)
        .bind(&update.note)
        .bind(update.updated_by)
        .bind(update.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(committed)
    }

    async fn list_updates(&self, concern_id: Uuid) -> AppResult<Vec<ConcernUpdate>> {
        Ok(sqlx::query_as::<_, ConcernUpdate>(
            "SELECT id, concern_id, status, note, updated_by, created_at
             FROM concern_updates WHERE concern_id = $1 ORDER BY created_at ASC",
        )
        .bind(concern_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn assign_concern(
        &self,
        id: Uuid,
        req: AssignConcernRequest,
    ) -> AppResult<Option<Concern>> {
        let sql = format!(
            "UPDATE concerns
             SET department_id = COALESCE($2, department_id),
                 assigned_officer_id = COALESCE($3, assigned_officer_id),
                 updated_at = GREATEST(updated_at, NOW())
             WHERE id = $1
             RETURNING {CONCERN_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Concern>(&sql)
            .bind(id)
            .bind(req.department_id)
            .bind(req.officer_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// The composite primary key on `concern_votes` enforces one vote per user.
    async fn vote_concern(&self, concern_id: Uuid, user_id: Uuid, upvote: bool) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO concern_votes (concern_id, user_id, is_upvote) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(concern_id)
        .bind(user_id)
        .bind(upvote)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE concerns
             SET upvotes = upvotes + CASE WHEN $2 THEN 1 ELSE 0 END,
                 downvotes = downvotes + CASE WHEN $2 THEN 0 ELSE 1 END
             WHERE id = $1",
        )
        .bind(concern_id)
        .bind(upvote)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn add_comment(
        &self,
        concern_id: Uuid,
        user_id: Uuid,
        body: String,
        is_official: bool,
    ) -> AppResult<ConcernComment> {
        Ok(sqlx::query_as::<_, ConcernComment>(
            r#"
            WITH inserted AS (
                INSERT INTO concern_comments (id, concern_id, user_id, body, is_official)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, concern_id, user_id, body, is_official, created_at
            )
            SELECT i.id, i.concern_id, i.user_id, i.body, i.is_official, i.created_at,
                   p.full_name AS author_name
            FROM inserted i JOIN profiles p ON i.user_id = p.id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(concern_id)
        .bind(user_id)
        .bind(body)
        .bind(is_official)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_comments(&self, concern_id: Uuid) -> AppResult<Vec<ConcernComment>> {
        Ok(sqlx::query_as::<_, ConcernComment>(
            r#"
            SELECT c.id, c.concern_id, c.user_id, c.body, c.is_official, c.created_at,
                   p.full_name AS author_name
            FROM concern_comments c
            JOIN profiles p ON c.user_id = p.id
            WHERE c.concern_id = $1
            ORDER BY c.created_at ASC
            "#,
        )
        .bind(concern_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_departments(&self) -> AppResult<Vec<Department>> {
        let sql = format!("SELECT {DEPARTMENT_COLUMNS} FROM departments ORDER BY name ASC");
        Ok(sqlx::query_as::<_, Department>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_department(&self, req: CreateDepartmentRequest) -> AppResult<Department> {
        let sql = format!(
            "INSERT INTO departments (id, name, categories, head_officer_id, is_active)
             VALUES ($1, $2, $3, $4, TRUE)
             RETURNING {DEPARTMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Department>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.name)
            .bind(req.categories)
            .bind(req.head_officer_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_department(
        &self,
        id: Uuid,
        req: UpdateDepartmentRequest,
    ) -> AppResult<Option<Department>> {
        let sql = format!(
            "UPDATE departments
             SET name = COALESCE($2, name),
                 categories = COALESCE($3, categories),
                 head_officer_id = COALESCE($4, head_officer_id),
                 is_active = COALESCE($5, is_active)
             WHERE id = $1
             RETURNING {DEPARTMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Department>(&sql)
            .bind(id)
            .bind(req.name)
            .bind(req.categories)
            .bind(req.head_officer_id)
            .bind(req.is_active)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_analytics(&self) -> AppResult<AnalyticsSummary> {
        let total_concerns = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM concerns")
            .fetch_one(&self.pool)
            .await?;
        let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;
        let resolved_concerns =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(resolved_at) FROM concerns")
                .fetch_one(&self.pool)
                .await?;
        let average_resolution_hours = sqlx::query_scalar::<_, Option<f64>>(
            "SELECT (AVG(EXTRACT(EPOCH FROM (resolved_at - created_at))) / 3600.0)::float8
             FROM concerns WHERE resolved_at IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        let per_status = sqlx::query_as::<_, (ConcernStatus, i64)>(
            "SELECT status, COUNT(*) FROM concerns GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_category = sqlx::query_as::<_, GroupCount>(
            "SELECT category AS key, COUNT(*) AS total, COUNT(resolved_at) AS resolved
             FROM concerns GROUP BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_region = sqlx::query_as::<_, GroupCount>(
            "SELECT COALESCE(region, $1) AS key, COUNT(*) AS total, COUNT(resolved_at) AS resolved
             FROM concerns GROUP BY 1",
        )
        .bind(UNSPECIFIED_REGION)
        .fetch_all(&self.pool)
        .await?;

        sort_groups(&mut by_category);
        sort_groups(&mut by_region);

        Ok(AnalyticsSummary {
            total_concerns,
            total_users,
            resolved_concerns,
            average_resolution_hours,
            by_status: status_counts(per_status),
            sdg: sdg_metrics(&by_category),
            by_category,
            by_region,
        })
    }

    async fn insert_notification(&self, notice: NewNotification) -> AppResult<UserNotification> {
        let sql = format!(
            "INSERT INTO user_notifications (id, user_id, concern_id, kind, message)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserNotification>(&sql)
            .bind(Uuid::new_v4())
            .bind(notice.user_id)
            .bind(notice.concern_id)
            .bind(notice.kind)
            .bind(notice.message)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_notifications(&self, user_id: Uuid) -> AppResult<Vec<UserNotification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM user_notifications
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, UserNotification>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE user_notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(notification_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_rewards(&self, user_id: Uuid) -> AppResult<RewardSummary> {
        let entries = sqlx::query_as::<_, RewardEntry>(
            "SELECT id, user_id, concern_id, points, reason, created_at
             FROM reward_points WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let total_points = entries.iter().map(|e| i64::from(e.points)).sum();
        Ok(RewardSummary {
            total_points,
            entries,
        })
    }
}
