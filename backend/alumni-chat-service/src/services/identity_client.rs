//! Identity service lookups.
//!
//! Users, profiles and roles live in the identity service. The chat core only
//! reads them: to validate participants, to resolve an authenticated caller and
//! to decorate payloads with display fields.

use crate::error::AppError;
use crate::models::UserProfile;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users for the given ids. Unknown ids are simply absent from the result.
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>, AppError>;

    /// Free-text search over name and email
    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<UserProfile>, AppError>;
}

/// Index a lookup result by id
pub fn by_id(users: Vec<UserProfile>) -> HashMap<Uuid, UserProfile> {
    users.into_iter().map(|u| (u.id, u)).collect()
}

/// Identity service over its internal HTTP API
#[derive(Clone)]
pub struct HttpUserDirectory {
    client: Client,
    /// e.g. "http://identity-service:8080"
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::StartServer(format!("identity http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<UserProfile>, AppError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, url, "identity-service request failed");
                AppError::Upstream(format!("identity-service request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, url, "identity-service returned error");
            return Err(AppError::Upstream(format!(
                "identity-service returned {status}"
            )));
        }

        Ok(response.json::<Vec<UserProfile>>().await?)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        debug!(count = ids.len(), "resolving users via identity-service");
        let url = format!("{}/internal/users", self.base_url);
        self.fetch(&url, &[("ids", joined)]).await
    }

    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<UserProfile>, AppError> {
        let url = format!("{}/internal/users/search", self.base_url);
        self.fetch(&url, &[("q", query.to_string()), ("limit", limit.to_string())])
            .await
    }
}

/// Directory backed by a map, for tests and local runs
#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<Uuid, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            users: Arc::new(RwLock::new(by_id(users.into_iter().collect()))),
        }
    }

    pub async fn insert(&self, user: UserProfile) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>, AppError> {
        let guard = self.users.read().await;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn search_users(&self, query: &str, limit: usize) -> Result<Vec<UserProfile>, AppError> {
        let needle = query.trim().to_lowercase();
        let guard = self.users.read().await;
        let mut found: Vec<UserProfile> = guard
            .values()
            .filter(|u| {
                needle.is_empty()
                    || u.name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        found.truncate(limit);
        Ok(found)
    }
}
