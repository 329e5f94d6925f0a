use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    models::NewNotification,
    repository::RepositoryState,
};

/// NotificationDispatcher
///
/// Accepts `(user, concern, kind, message)` and queues it for delivery. How a
/// notification eventually reaches the citizen (in-app list, push) is behind
/// this seam.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notice: NewNotification) -> AppResult<()>;
}

pub type NotifierState = Arc<dyn NotificationDispatcher>;

/// StoredNotifier
///
/// Default dispatcher: writes a `user_notifications` row that the client polls
/// through GET /notifications.
pub struct StoredNotifier {
    repo: RepositoryState,
}

impl StoredNotifier {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl NotificationDispatcher for StoredNotifier {
    async fn dispatch(&self, notice: NewNotification) -> AppResult<()> {
        let stored = self.repo.insert_notification(notice).await?;
        tracing::debug!(notification_id = %stored.id, user_id = %stored.user_id, "notification stored");
        Ok(())
    }
}

/// MockDispatcher
///
/// Records every dispatched notice. Used by tests to assert that a committed
/// transition notified the submitter exactly once.
#[derive(Default)]
pub struct MockDispatcher {
    sent: Mutex<Vec<NewNotification>>,
    pub should_fail: bool,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NewNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationDispatcher for MockDispatcher {
    async fn dispatch(&self, notice: NewNotification) -> AppResult<()> {
        if self.should_fail {
            return Err(AppError::UpstreamUnavailable(
                "mock dispatcher: simulated failure".to_string(),
            ));
        }
        self.sent
            .lock()
            .map_err(|_| AppError::Internal("mock dispatcher lock poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}
