use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::Claims,
    error::{AppError, AppResult},
};

/// A session issued by the identity provider after a password login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user_id: Uuid,
    pub access_token: String,
    pub expires_in: i64,
}

/// IdentityProvider
///
/// Credentials are verified outside this service. The provider owns passwords
/// and signs the JWTs that `AuthUser` later validates with the shared secret.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account and returns its id, which becomes the profile id.
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Uuid>;
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<IssuedSession>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

#[derive(Deserialize)]
struct SignUpResponse {
    id: Uuid,
}

#[derive(Deserialize)]
struct TokenUser {
    id: Uuid,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    user: TokenUser,
}

/// GoTrueClient
///
/// reqwest client for a GoTrue-compatible auth server
/// (`/auth/v1/signup`, `/auth/v1/token?grant_type=password`).
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoTrueClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Uuid> {
        let response = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AppError::UpstreamUnavailable(format!(
                "identity provider returned {status}"
            )));
        }
        if !status.is_success() {
            // Duplicate email, weak password.
            return Err(AppError::Validation(
                "registration rejected by identity provider".to_string(),
            ));
        }

        Ok(response.json::<SignUpResponse>().await?.id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<IssuedSession> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AppError::UpstreamUnavailable(format!(
                "identity provider returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(AppError::Unauthorized);
        }

        let token = response.json::<TokenResponse>().await?;
        Ok(IssuedSession {
            user_id: token.user.id,
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}

/// MockIdentityProvider
///
/// In-process provider for tests and offline demos. Tokens are signed with the
/// same secret `AuthUser` validates against, so a mock login yields a working
/// Bearer token.
pub struct MockIdentityProvider {
    jwt_secret: String,
    accounts: Mutex<HashMap<String, (String, Uuid)>>,
}

impl MockIdentityProvider {
    pub const TOKEN_TTL_SECS: i64 = 3600;

    pub fn new(jwt_secret: &str) -> Self {
        Self {
            jwt_secret: jwt_secret.to_string(),
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Registers credentials for an existing profile id.
    pub fn with_account(self, email: &str, password: &str, id: Uuid) -> Self {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(email.to_lowercase(), (password.to_string(), id));
        }
        self
    }

    pub fn issue_token(&self, user_id: Uuid) -> AppResult<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .as_secs() as usize;
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + Self::TOKEN_TTL_SECS as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token signing: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> AppResult<Uuid> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| AppError::Internal("mock identity lock poisoned".to_string()))?;
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(AppError::Validation(
                "registration rejected by identity provider".to_string(),
            ));
        }
        let id = Uuid::new_v4();
        accounts.insert(key, (password.to_string(), id));
        Ok(id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<IssuedSession> {
        let user_id = {
            let accounts = self
                .accounts
                .lock()
                .map_err(|_| AppError::Internal("mock identity lock poisoned".to_string()))?;
            match accounts.get(&email.to_lowercase()) {
                Some((stored, id)) if stored == password => *id,
                _ => return Err(AppError::Unauthorized),
            }
        };
        Ok(IssuedSession {
            user_id,
            access_token: self.issue_token(user_id)?,
            expires_in: Self::TOKEN_TTL_SECS,
        })
    }
}
