use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Concern, NewNotification, NotificationKind},
    notifications::NotifierState,
    policy::{Resource, Role, authorize},
    repository::RepositoryState,
};

/// ConcernStatus
///
/// The seven states a concern can occupy. Ordinals are persisted in
/// `concerns.status` and `concern_updates.status`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
    ToSchema, sqlx::Type, Default,
)]
#[ts(export)]
#[repr(i32)]
pub enum ConcernStatus {
    #[default]
    New = 1,
    Acknowledged = 2,
    InProgress = 3,
    UnderReview = 4,
    Resolved = 5,
    Closed = 6,
    Rejected = 7,
}

impl ConcernStatus {
    pub const ALL: [ConcernStatus; 7] = [
        ConcernStatus::New,
        ConcernStatus::Acknowledged,
        ConcernStatus::InProgress,
        ConcernStatus::UnderReview,
        ConcernStatus::Resolved,
        ConcernStatus::Closed,
        ConcernStatus::Rejected,
    ];

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.ordinal() == value)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConcernStatus::Closed | ConcernStatus::Rejected)
    }

    /// Outgoing edges of the lifecycle graph.
    pub fn successors(self) -> &'static [ConcernStatus] {
        use ConcernStatus::*;
        match self {
            New => &[Acknowledged, Rejected],
            Acknowledged => &[InProgress, Rejected],
            InProgress => &[UnderReview, Rejected],
            UnderReview => &[Resolved, InProgress, Rejected],
            // Resolved is not terminal, but closing is its only exit.
            Resolved => &[Closed],
            Closed | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: ConcernStatus) -> bool {
        self.successors().contains(&next)
    }
}

/// ApprovedTransition
///
/// Proof that an edge was checked against the graph and the actor's role.
/// Only `ConcernLifecycle::plan` can build one, and `Concern::apply_transition`
/// accepts nothing else, so no code path can write `status` directly.
#[derive(Debug)]
pub struct ApprovedTransition {
    from: ConcernStatus,
    to: ConcernStatus,
}

impl ApprovedTransition {
    pub fn from(&self) -> ConcernStatus {
        self.from
    }

    pub fn to(&self) -> ConcernStatus {
        self.to
    }
}

#[derive(Debug)]
pub enum Step {
    /// Target equals the current status; nothing is written.
    Unchanged,
    Advance(ApprovedTransition),
}

/// ConcernLifecycle
///
/// The pure decision half of a status change.
pub struct ConcernLifecycle;

impl ConcernLifecycle {
    /// Checks, in order: the actor may triage, the request is not a no-op, the
    /// edge exists. A citizen is refused with `Forbidden` even for legal edges.
    pub fn plan(from: ConcernStatus, to: ConcernStatus, actor: Role) -> AppResult<Step> {
        if !authorize(actor, Resource::ConcernTriage).is_permit() {
            return Err(AppError::forbidden(format!(
                "{} may not change concern status",
                actor.display_name()
            )));
        }

        if from == to {
            return Ok(Step::Unchanged);
        }

        if !from.can_transition_to(to) {
            return Err(AppError::InvalidTransition { from, to });
        }

        Ok(Step::Advance(ApprovedTransition { from, to }))
    }
}

pub const MAX_NOTE_LEN: usize = 2000;

/// A no-op only holds if the snapshot is still current; a stale one is a
/// `Conflict`, exactly as a write from it would be.
async fn confirm_unchanged(repo: &RepositoryState, snapshot: &Concern) -> AppResult<Concern> {
    let stored = repo
        .get_concern(snapshot.id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("concern {}", snapshot.id)))?;
    if stored.version() != snapshot.version() {
        return Err(AppError::Conflict(format!(
            "concern {} changed since version {}",
            snapshot.id,
            snapshot.version()
        )));
    }
    Ok(stored)
}

/// transition
///
/// Moves `snapshot` to `target` on behalf of `actor`.
///
/// `snapshot` is the concern as the caller last saw it; the commit only lands
/// if its `version` is still the stored one, otherwise `Conflict` is returned
/// and nothing is written. There is no automatic retry: re-planning against the
/// winner's state could legally apply a different edge than the caller chose.
///
/// Asking for the current status writes nothing and returns the stored row.
///
/// After a successful commit the submitting citizen is notified. A failed
/// notification is logged and does not undo the transition.
pub async fn transition(
    repo: &RepositoryState,
    notifier: &NotifierState,
    snapshot: &Concern,
    target: ConcernStatus,
    actor: &AuthUser,
    note: Option<String>,
) -> AppResult<Concern> {
    if note.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_LEN) {
        return Err(AppError::Validation(format!(
            "note must be at most {MAX_NOTE_LEN} characters"
        )));
    }

    let approved = match ConcernLifecycle::plan(snapshot.status(), target, actor.role)? {
        Step::Unchanged => return confirm_unchanged(repo, snapshot).await,
        Step::Advance(approved) => approved,
    };

    let mut next = snapshot.clone();
    let update = next.apply_transition(approved, actor.id, note, Utc::now())?;

    let committed = repo
        .commit_transition(&next, snapshot.version(), &update)
        .await
        .inspect_err(|e| {
            if matches!(e, AppError::Conflict(_)) {
                tracing::warn!(
                    concern_id = %snapshot.id,
                    expected_version = snapshot.version(),
                    target = ?target,
                    "status write lost a concurrent race"
                );
            }
        })?;

    tracing::info!(
        concern_id = %committed.id,
        from = ?snapshot.status(),
        to = ?committed.status(),
        actor = %actor.id,
        "concern status changed"
    );

    let notice = NewNotification {
        user_id: committed.citizen_id,
        concern_id: Some(committed.id),
        kind: NotificationKind::StatusChanged,
        message: format!(
            "Your concern \"{}\" is now {:?}.",
            committed.title,
            committed.status()
        ),
    };
    if let Err(e) = notifier.dispatch(notice).await {
        tracing::error!(concern_id = %committed.id, error = %e, "status notification failed");
    }

    Ok(committed)
}
