use actix_web::{web, App, HttpServer};
use alumni_chat_service::{
    config::{self, StoreBackend},
    db, error, logging, routes,
    services::{HttpJobDirectory, HttpUserDirectory, JobDirectory, UserDirectory},
    shutdown,
    state::AppState,
    store::{ChatStore, MemoryChatStore, PgChatStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let store: Arc<dyn ChatStore> = match cfg.store {
        StoreBackend::Postgres => {
            let url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            let pool = db::init_pool(url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            db::run_migrations(&pool).await?;
            Arc::new(PgChatStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("CHAT_STORE=memory: conversations are lost on restart");
            Arc::new(MemoryChatStore::new())
        }
    };

    let upstream_timeout = Duration::from_millis(cfg.upstream_timeout_ms);
    let users: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(
        cfg.identity_service_url.clone(),
        upstream_timeout,
    )?);
    let jobs: Arc<dyn JobDirectory> = Arc::new(HttpJobDirectory::new(
        cfg.job_service_url.clone(),
        upstream_timeout,
    )?);

    let state = AppState::new(cfg.clone(), store, users, jobs)?;
    let registry = state.registry.clone();

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting alumni-chat-service");

    let cors_origins = cfg.cors_allowed_origins.clone();
    let server = HttpServer::new(move || {
        let cors = if cors_origins.is_empty() {
            actix_cors::Cors::default().allow_any_origin()
        } else {
            cors_origins
                .iter()
                .fold(actix_cors::Cors::default(), |cors, origin| {
                    cors.allowed_origin(origin)
                })
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .disable_signals()
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = shutdown::shutdown_signal().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        registry.shutdown().await;
        handle.stop(true).await;
    });

    server
        .await
        .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}
