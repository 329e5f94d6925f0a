#![allow(dead_code)]

use chrono::Utc;
use citizen_sphere::{
    AppConfig, AppState, IdentityState, MemoryRepository, MockDispatcher, MockIdentityProvider,
    MockStorageService, NotifierState, RepositoryState, StorageState,
    auth::AuthUser,
    lifecycle::{self, ConcernStatus},
    models::{Concern, CreateConcernRequest, User},
    policy::Role,
    repository::Repository,
};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory wiring shared by the handler, router and service tests.
pub struct TestContext {
    pub repo: Arc<MemoryRepository>,
    pub notifier: Arc<MockDispatcher>,
    pub identity: Arc<MockIdentityProvider>,
    pub config: AppConfig,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_identity(|identity| identity)
    }

    /// Lets a test pre-register identity-provider accounts.
    pub fn with_identity(
        configure: impl FnOnce(MockIdentityProvider) -> MockIdentityProvider,
    ) -> Self {
        let config = AppConfig::default();
        Self {
            repo: Arc::new(MemoryRepository::new()),
            notifier: Arc::new(MockDispatcher::new()),
            identity: Arc::new(configure(MockIdentityProvider::new(&config.jwt_secret))),
            config,
        }
    }

    pub fn repo_state(&self) -> RepositoryState {
        self.repo.clone() as RepositoryState
    }

    pub fn notifier_state(&self) -> NotifierState {
        self.notifier.clone() as NotifierState
    }

    pub fn state(&self) -> AppState {
        self.state_with_storage(MockStorageService::new())
    }

    pub fn state_with_storage(&self, storage: MockStorageService) -> AppState {
        AppState {
            repo: self.repo_state(),
            storage: Arc::new(storage) as StorageState,
            notifier: self.notifier_state(),
            identity: self.identity.clone() as IdentityState,
            config: self.config.clone(),
        }
    }

    pub async fn user(&self, role: Role) -> User {
        let id = Uuid::new_v4();
        self.repo
            .insert_user(User {
                id,
                email: format!("{}@example.org", id.simple()),
                full_name: format!("{} {}", role.display_name(), &id.simple().to_string()[..4]),
                role,
                created_at: Utc::now(),
                ..User::default()
            })
            .await
    }

    pub fn token(&self, user: &User) -> String {
        self.identity
            .issue_token(user.id)
            .expect("token signing should not fail")
    }

    /// A freshly submitted concern owned by `citizen`.
    pub async fn concern(&self, citizen: &User) -> Concern {
        self.repo
            .create_concern(Concern::submitted(citizen.id, concern_request(), Utc::now()))
            .await
            .expect("seeding a concern should not fail")
    }

    /// A concern walked along the lifecycle graph to `target` by `officer`.
    pub async fn concern_at(&self, citizen: &User, officer: &User, target: ConcernStatus) -> Concern {
        let mut concern = self.concern(citizen).await;
        for step in path_to(target) {
            concern = lifecycle::transition(
                &self.repo_state(),
                &self.notifier_state(),
                &concern,
                step,
                &auth(officer),
                None,
            )
            .await
            .expect("seeding path should only use legal edges");
        }
        concern
    }
}

pub fn auth(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        role: user.role,
    }
}

/// Statuses to pass through, in order, to reach `target` from `New`.
pub fn path_to(target: ConcernStatus) -> Vec<ConcernStatus> {
    use ConcernStatus::*;
    if target == Rejected {
        return vec![Rejected];
    }
    [Acknowledged, InProgress, UnderReview, Resolved, Closed]
        .into_iter()
        .take_while(|s| *s <= target)
        .collect()
}

pub fn concern_request() -> CreateConcernRequest {
    CreateConcernRequest {
        title: "Broken streetlight on Mill Road".to_string(),
        description: "The streetlight outside number 14 has been dark for a week.".to_string(),
        category: "Streetlight".to_string(),
        priority: 3,
        urgency: 2,
        impact: 3,
        region: Some("North".to_string()),
        ward: Some("Ward 4".to_string()),
        ..CreateConcernRequest::default()
    }
}
