//! Database connection pool management
//!
//! Builds a deadpool-postgres pool from environment configuration and verifies
//! it with a round trip before handing it to the service.

use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub type PgPool = Pool;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("DATABASE_URL environment variable not set")]
    MissingUrl,

    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("failed to build pool: {0}")]
    Build(String),

    #[error("database connection failed: {0}")]
    Connect(String),

    #[error("database connection verification timed out after {0}s")]
    Timeout(u64),
}

/// Database connection pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Service name used in log fields
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Connection creation timeout (new connection to PostgreSQL)
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    pub fn from_env(service_name: &str) -> Result<Self, DbPoolError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| DbPoolError::MissingUrl)?;
        Ok(Self::with_url(service_name, database_url))
    }

    /// Config for an explicit URL, with pool sizing still read from the environment
    pub fn with_url(service_name: &str, database_url: impl Into<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            database_url: database_url.into(),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        }
    }

    pub fn log_config(&self) {
        info!(
            "Database Pool Configuration: max_connections={}, connect_timeout={}s, acquire_timeout={}s",
            self.max_connections, self.connect_timeout_secs, self.acquire_timeout_secs
        );
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Build a deadpool-postgres pool and verify it with `SELECT 1`
pub async fn create_pool(config: DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        "Creating database pool: service={}, max={}, acquire_timeout={}s, verify_timeout={}s",
        config.service_name,
        config.max_connections,
        config.acquire_timeout_secs,
        config.connect_timeout_secs
    );

    let pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(|e: deadpool_postgres::tokio_postgres::Error| {
            DbPoolError::InvalidUrl(e.to_string())
        })?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .runtime(Runtime::Tokio1)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .create_timeout(Some(Duration::from_secs(config.connect_timeout_secs)))
        .build()
        .map_err(|e| DbPoolError::Build(e.to_string()))?;

    let verify = async {
        let client = pool
            .get()
            .await
            .map_err(|e| DbPoolError::Connect(e.to_string()))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DbPoolError::Connect(e.to_string()))?;
        Ok::<(), DbPoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );
            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(DbPoolError::Timeout(config.connect_timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    fn test_with_url_keeps_service_name() {
        let config = DbConfig::with_url("alumni-chat-service", "postgres://localhost/chat");
        assert_eq!(config.service_name, "alumni-chat-service");
        assert_eq!(config.database_url, "postgres://localhost/chat");
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = DbConfig::with_url("alumni-chat-service", "postgres://chat:s3cret@db/chat");
        let printed = format!("{config:?}");
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("alumni-chat-service"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = DbConfig::with_url("alumni-chat-service", "not a url at all ::");
        let err = create_pool(config).await.unwrap_err();
        assert!(matches!(err, DbPoolError::InvalidUrl(_)));
    }
}
