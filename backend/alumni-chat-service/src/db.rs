use db_pool::{create_pool as create_pg_pool, DbConfig, DbPoolError};
use deadpool_postgres::Pool;

const MIG_0001: &str = include_str!("../migrations/0001_create_conversations.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_messages.sql");

pub async fn init_pool(database_url: &str) -> Result<Pool, DbPoolError> {
    let cfg = DbConfig::with_url("alumni-chat-service", database_url);
    cfg.log_config();
    create_pg_pool(cfg).await
}

/// Apply the embedded schema. Every statement is idempotent (`IF NOT EXISTS`),
/// so a failure here is a real error rather than an already-applied migration.
pub async fn run_migrations(pool: &Pool) -> Result<(), crate::error::AppError> {
    let client = pool.get().await?;
    for (i, sql) in [MIG_0001, MIG_0002].into_iter().enumerate() {
        let label = i + 1;
        match client.batch_execute(sql).await {
            Ok(()) => tracing::info!(migration = %label, "alumni-chat-service migration applied"),
            Err(e) => {
                tracing::error!(migration = %label, error = %e, "migration failed");
                return Err(e.into());
            }
        }
    }
    Ok(())
}
