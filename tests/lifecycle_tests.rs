mod common;

use chrono::{Duration, Utc};
use citizen_sphere::{
    AppError, MockDispatcher, NotifierState,
    lifecycle::{self, ConcernLifecycle, ConcernStatus, MAX_NOTE_LEN, Step},
    models::{AssignConcernRequest, Concern, NotificationKind},
    policy::Role,
    repository::{RESOLUTION_POINTS, Repository, SUBMISSION_POINTS},
};
use common::{TestContext, auth, concern_request};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use ConcernStatus::*;

const STAFF: [Role; 4] = [
    Role::Officer,
    Role::DepartmentHead,
    Role::Admin,
    Role::SuperAdmin,
];

// --- Graph ---

#[test]
fn test_graph_edges() {
    let expected: &[(ConcernStatus, &[ConcernStatus])] = &[
        (New, &[Acknowledged, Rejected]),
        (Acknowledged, &[InProgress, Rejected]),
        (InProgress, &[UnderReview, Rejected]),
        (UnderReview, &[Resolved, InProgress, Rejected]),
        (Resolved, &[Closed]),
        (Closed, &[]),
        (Rejected, &[]),
    ];
    for (from, successors) in expected {
        for to in ConcernStatus::ALL {
            assert_eq!(
                from.can_transition_to(to),
                successors.contains(&to),
                "{from:?} -> {to:?}"
            );
        }
    }
}

#[test]
fn test_terminal_states() {
    let terminal: Vec<_> = ConcernStatus::ALL
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
    assert_eq!(terminal, vec![Closed, Rejected]);
    assert!(!Resolved.is_terminal());
}

#[test]
fn test_status_ordinals() {
    let ordinals: Vec<i32> = ConcernStatus::ALL.iter().map(|s| s.ordinal()).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(ConcernStatus::from_ordinal(4), Some(UnderReview));
    assert_eq!(ConcernStatus::from_ordinal(8), None);
}

// --- Planning ---

#[test]
fn test_plan_refuses_citizen_even_for_legal_edge() {
    let err = ConcernLifecycle::plan(UnderReview, Resolved, Role::Citizen).unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[test]
fn test_plan_rejects_skipping_acknowledged() {
    let err = ConcernLifecycle::plan(New, InProgress, Role::Officer).unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: New,
            to: InProgress
        }
    ));
}

#[test]
fn test_plan_same_status_is_unchanged() {
    for role in STAFF {
        for status in ConcernStatus::ALL {
            assert!(matches!(
                ConcernLifecycle::plan(status, status, role),
                Ok(Step::Unchanged)
            ));
        }
    }
}

#[test]
fn test_plan_resolved_to_rejected_is_invalid_for_all_staff() {
    for role in STAFF {
        let err = ConcernLifecycle::plan(Resolved, Rejected, role).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }), "{role:?}");
    }
}

#[test]
fn test_apply_transition_rejects_mismatched_approval() {
    let Ok(Step::Advance(approved)) = ConcernLifecycle::plan(New, Acknowledged, Role::Officer)
    else {
        panic!("New -> Acknowledged should be approved");
    };
    let mut concern = Concern::submitted(Uuid::new_v4(), concern_request(), Utc::now());
    let Ok(Step::Advance(to_progress)) =
        ConcernLifecycle::plan(Acknowledged, InProgress, Role::Officer)
    else {
        panic!("Acknowledged -> InProgress should be approved");
    };

    // An approval for a different source state cannot be replayed.
    assert!(concern
        .apply_transition(to_progress, Uuid::new_v4(), None, Utc::now())
        .is_err());
    assert_eq!(concern.status(), New);

    let update = concern
        .apply_transition(approved, Uuid::new_v4(), None, Utc::now())
        .unwrap();
    assert_eq!(update.status, Acknowledged);
    assert_eq!(concern.version(), 2);
}

#[test]
fn test_updated_at_never_moves_backwards() {
    let created = Utc::now();
    let mut concern = Concern::submitted(Uuid::new_v4(), concern_request(), created);
    let Ok(Step::Advance(approved)) = ConcernLifecycle::plan(New, Acknowledged, Role::Officer)
    else {
        panic!("New -> Acknowledged should be approved");
    };

    let skewed = created - Duration::minutes(5);
    let update = concern
        .apply_transition(approved, Uuid::new_v4(), None, skewed)
        .unwrap();
    assert_eq!(concern.updated_at, created);
    assert_eq!(update.created_at, created);
}

// --- Transition service ---

#[tokio::test]
async fn test_new_concern_must_be_acknowledged_first() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let concern = ctx.concern(&citizen).await;

    let err = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &concern,
        InProgress,
        &auth(&officer),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    assert!(ctx.repo.list_updates(concern.id).await.unwrap().is_empty());

    let acknowledged = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &concern,
        Acknowledged,
        &auth(&officer),
        Some("Crew scheduled".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(acknowledged.status(), Acknowledged);
    assert!(acknowledged.updated_at >= concern.updated_at);
    assert_eq!(acknowledged.version(), concern.version() + 1);

    let updates = ctx.repo.list_updates(concern.id).await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, Acknowledged);
    assert_eq!(updates[0].updated_by, officer.id);
    assert_eq!(updates[0].note.as_deref(), Some("Crew scheduled"));
}

#[tokio::test]
async fn test_citizen_cannot_resolve_concern_under_review() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let concern = ctx.concern_at(&citizen, &officer, UnderReview).await;
    let before = ctx.repo.list_updates(concern.id).await.unwrap().len();

    let err = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &concern,
        Resolved,
        &auth(&citizen),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    let stored = ctx.repo.get_concern(concern.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), UnderReview);
    assert_eq!(ctx.repo.list_updates(concern.id).await.unwrap().len(), before);
}

#[tokio::test]
async fn test_resolved_concern_cannot_be_rejected() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let admin = ctx.user(Role::SuperAdmin).await;
    let concern = ctx.concern_at(&citizen, &officer, Resolved).await;

    for actor in [&officer, &admin] {
        let err = lifecycle::transition(
            &ctx.repo_state(),
            &ctx.notifier_state(),
            &concern,
            Rejected,
            &auth(actor),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: Resolved,
                to: Rejected
            }
        ));
    }
}

#[tokio::test]
async fn test_concurrent_transitions_have_exactly_one_winner() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let head = ctx.user(Role::DepartmentHead).await;
    let snapshot = ctx.concern_at(&citizen, &officer, InProgress).await;
    let updates_before = ctx.repo.list_updates(snapshot.id).await.unwrap().len();

    let repo = ctx.repo_state();
    let notifier = ctx.notifier_state();
    let (officer_auth, head_auth) = (auth(&officer), auth(&head));

    let (review, reject) = tokio::join!(
        lifecycle::transition(&repo, &notifier, &snapshot, UnderReview, &officer_auth, None),
        lifecycle::transition(&repo, &notifier, &snapshot, Rejected, &head_auth, None),
    );

    let (winner, loser) = match (review, reject) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert!(matches!(
        loser,
        AppError::Conflict(_) | AppError::InvalidTransition { .. }
    ));

    let stored = ctx.repo.get_concern(snapshot.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), winner.status());
    assert_eq!(stored.version(), snapshot.version() + 1);

    let updates = ctx.repo.list_updates(snapshot.id).await.unwrap();
    assert_eq!(updates.len(), updates_before + 1);
    assert_eq!(updates.last().unwrap().status, winner.status());
}

#[tokio::test]
async fn test_stale_snapshot_is_a_conflict() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let stale = ctx.concern(&citizen).await;

    lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &stale,
        Acknowledged,
        &auth(&officer),
        None,
    )
    .await
    .unwrap();

    // Rejected is legal from both New and Acknowledged, but the snapshot is old.
    let err = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &stale,
        Rejected,
        &auth(&officer),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let stored = ctx.repo.get_concern(stale.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), Acknowledged);
}

#[tokio::test]
async fn test_same_status_writes_nothing() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let concern = ctx.concern(&citizen).await;

    let unchanged = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &concern,
        New,
        &auth(&officer),
        None,
    )
    .await
    .unwrap();

    assert_eq!(unchanged.version(), concern.version());
    assert!(ctx.repo.list_updates(concern.id).await.unwrap().is_empty());
    assert!(ctx.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_same_status_from_stale_snapshot_is_a_conflict() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let stale = ctx.concern_at(&citizen, &officer, InProgress).await;

    lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &stale,
        Rejected,
        &auth(&officer),
        None,
    )
    .await
    .unwrap();

    let err = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &stale,
        InProgress,
        &auth(&officer),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_transition_keeps_votes_and_assignment_made_after_snapshot() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let voter = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let snapshot = ctx.concern(&citizen).await;
    let department_id = Uuid::new_v4();

    assert!(ctx.repo.vote_concern(snapshot.id, voter.id, true).await.unwrap());
    ctx.repo
        .assign_concern(
            snapshot.id,
            AssignConcernRequest {
                department_id: Some(department_id),
                officer_id: Some(officer.id),
            },
        )
        .await
        .unwrap()
        .unwrap();

    let committed = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &snapshot,
        Acknowledged,
        &auth(&officer),
        None,
    )
    .await
    .unwrap();

    let stored = ctx.repo.get_concern(snapshot.id).await.unwrap().unwrap();
    for concern in [&committed, &stored] {
        assert_eq!(concern.status(), Acknowledged);
        assert_eq!(concern.upvotes, 1);
        assert_eq!(concern.department_id, Some(department_id));
        assert_eq!(concern.assigned_officer_id, Some(officer.id));
    }
}

#[tokio::test]
async fn test_resolution_records_notes_time_and_reward() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let review = ctx.concern_at(&citizen, &officer, UnderReview).await;

    let resolved = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &review,
        Resolved,
        &auth(&officer),
        Some("Bulb replaced".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(resolved.status(), Resolved);
    assert!(resolved.resolved_at().is_some());
    assert_eq!(resolved.resolution_notes.as_deref(), Some("Bulb replaced"));

    let rewards = ctx.repo.get_rewards(citizen.id).await.unwrap();
    assert_eq!(
        rewards.total_points,
        i64::from(SUBMISSION_POINTS + RESOLUTION_POINTS)
    );

    let closed = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &resolved,
        Closed,
        &auth(&officer),
        None,
    )
    .await
    .unwrap();
    assert_eq!(closed.resolved_at(), resolved.resolved_at());
}

#[tokio::test]
async fn test_submitter_is_notified_of_each_change() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    ctx.concern_at(&citizen, &officer, InProgress).await;

    let sent = ctx.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.user_id == citizen.id));
    assert!(sent.iter().all(|n| n.kind == NotificationKind::StatusChanged));
}

#[tokio::test]
async fn test_notification_failure_does_not_undo_transition() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let concern = ctx.concern(&citizen).await;
    let failing = Arc::new(MockDispatcher::new_failing()) as NotifierState;

    let updated = lifecycle::transition(
        &ctx.repo_state(),
        &failing,
        &concern,
        Acknowledged,
        &auth(&officer),
        None,
    )
    .await
    .unwrap();

    assert_eq!(updated.status(), Acknowledged);
    assert_eq!(ctx.repo.list_updates(concern.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_overlong_note_is_rejected_before_planning() {
    let ctx = TestContext::new();
    let citizen = ctx.user(Role::Citizen).await;
    let officer = ctx.user(Role::Officer).await;
    let concern = ctx.concern(&citizen).await;

    let err = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &concern,
        Acknowledged,
        &auth(&officer),
        Some("x".repeat(MAX_NOTE_LEN + 1)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_transition_on_deleted_concern_is_not_found() {
    let ctx = TestContext::new();
    let officer = ctx.user(Role::Officer).await;
    let ghost = Concern::submitted(Uuid::new_v4(), concern_request(), Utc::now());

    let err = lifecycle::transition(
        &ctx.repo_state(),
        &ctx.notifier_state(),
        &ghost,
        Acknowledged,
        &auth(&officer),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// --- Properties ---

fn any_status() -> impl Strategy<Value = ConcernStatus> {
    prop::sample::select(ConcernStatus::ALL.to_vec())
}

fn any_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

proptest! {
    /// Whatever is requested, by whomever, the concern only ever moves along
    /// graph edges, never leaves a terminal state, and its bookkeeping stays
    /// consistent.
    #[test]
    fn prop_random_requests_respect_the_graph(
        requests in prop::collection::vec((any_status(), any_role(), -120i64..120), 0..40)
    ) {
        let start = Utc::now();
        let mut concern = Concern::submitted(Uuid::new_v4(), concern_request(), start);
        let mut advances = 0;

        for (target, role, skew) in requests {
            let before = concern.status();
            let before_updated = concern.updated_at;

            match ConcernLifecycle::plan(before, target, role) {
                Ok(Step::Advance(approved)) => {
                    prop_assert!(role.is_staff());
                    prop_assert!(before.can_transition_to(target));
                    let now = start + Duration::minutes(skew);
                    let update = concern
                        .apply_transition(approved, Uuid::new_v4(), None, now)
                        .unwrap();
                    prop_assert_eq!(update.status, target);
                    advances += 1;
                }
                Ok(Step::Unchanged) => prop_assert_eq!(before, target),
                Err(AppError::Forbidden(_)) => prop_assert!(!role.is_staff()),
                Err(AppError::InvalidTransition { .. }) => {
                    prop_assert!(!before.can_transition_to(target));
                }
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }

            if before.is_terminal() {
                prop_assert_eq!(concern.status(), before);
            }
            prop_assert!(concern.updated_at >= before_updated);
            prop_assert!(concern.updated_at >= concern.created_at);
            prop_assert_eq!(
                concern.resolved_at().is_some(),
                matches!(concern.status(), Resolved | Closed)
            );
        }

        prop_assert_eq!(concern.version(), 1 + advances);
    }
}
