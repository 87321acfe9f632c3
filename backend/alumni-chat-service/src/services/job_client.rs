use crate::error::AppError;
use crate::models::JobSummary;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::error;
use uuid::Uuid;

#[async_trait]
pub trait JobDirectory: Send + Sync {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<JobSummary>, AppError>;
}

/// Job board over its internal HTTP API
#[derive(Clone)]
pub struct HttpJobDirectory {
    client: Client,
    base_url: String,
}

impl HttpJobDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::StartServer(format!("job http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl JobDirectory for HttpJobDirectory {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<JobSummary>, AppError> {
        let url = format!("{}/internal/jobs/{}", self.base_url, id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            error!(job_id = %id, error = %e, "job-service request failed");
            AppError::Upstream(format!("job-service request failed: {e}"))
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json::<JobSummary>().await?)),
            status => {
                error!(job_id = %id, %status, "job-service returned error");
                Err(AppError::Upstream(format!("job-service returned {status}")))
            }
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryJobDirectory {
    jobs: Arc<RwLock<HashMap<Uuid, JobSummary>>>,
}

impl InMemoryJobDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = JobSummary>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(jobs.into_iter().map(|j| (j.id, j)).collect())),
        }
    }

    pub async fn insert(&self, job: JobSummary) {
        self.jobs.write().await.insert(job.id, job);
    }
}

#[async_trait]
impl JobDirectory for InMemoryJobDirectory {
    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<JobSummary>, AppError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }
}
