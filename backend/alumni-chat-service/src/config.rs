use crate::error::AppError;
use dotenvy::dotenv;
use std::env;

/// Which `ChatStore` backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(AppError::Config(format!("unknown CHAT_STORE '{other}'"))),
        }
    }
}

/// JWT verification material
#[derive(Debug, Clone)]
pub enum JwtKey {
    /// RS256 public key in PEM form
    RsaPublicPem(String),
    /// HS256 shared secret (development only)
    Secret(String),
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub jwt_key: JwtKey,
    pub identity_service_url: String,
    pub job_service_url: String,
    pub upstream_timeout_ms: u64,
    pub ws: WsConfig,
    /// Empty means any origin
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = Self::parse_or("PORT", 8080);
        let store = match env::var("CHAT_STORE") {
            Ok(value) => StoreBackend::parse(&value)?,
            Err(_) => StoreBackend::Postgres,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL missing (required when CHAT_STORE=postgres)".into(),
            ));
        }

        let jwt_key = match (env::var("JWT_PUBLIC_KEY_PEM"), env::var("JWT_SECRET")) {
            (Ok(pem), _) if !pem.trim().is_empty() => JwtKey::RsaPublicPem(pem.replace("\\n", "\n")),
            (_, Ok(secret)) if !secret.is_empty() => JwtKey::Secret(secret),
            _ => {
                return Err(AppError::Config(
                    "JWT_PUBLIC_KEY_PEM or JWT_SECRET must be set".into(),
                ))
            }
        };

        let identity_service_url = env::var("IDENTITY_SERVICE_URL")
            .unwrap_or_else(|_| "http://identity-service:8080".to_string());
        let job_service_url =
            env::var("JOB_SERVICE_URL").unwrap_or_else(|_| "http://job-service:8080".to_string());

        let ws = WsConfig {
            heartbeat_interval_secs: Self::parse_or("WS_HEARTBEAT_INTERVAL_SECS", 5),
            client_timeout_secs: Self::parse_or("WS_CLIENT_TIMEOUT_SECS", 30),
        };
        if ws.heartbeat_interval_secs == 0 || ws.client_timeout_secs <= ws.heartbeat_interval_secs {
            return Err(AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed a non-zero WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| Self::parse_list(&v))
            .unwrap_or_default();

        Ok(Self {
            port,
            store,
            database_url,
            jwt_key,
            identity_service_url,
            job_service_url,
            upstream_timeout_ms: Self::parse_or("UPSTREAM_TIMEOUT_MS", 5000),
            ws,
            cors_allowed_origins,
        })
    }

    /// In-memory configuration for tests
    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            store: StoreBackend::Memory,
            database_url: None,
            jwt_key: JwtKey::Secret("test-secret-for-alumni-chat".into()),
            identity_service_url: "http://127.0.0.1:9".into(),
            job_service_url: "http://127.0.0.1:9".into(),
            upstream_timeout_ms: 1000,
            ws: WsConfig {
                heartbeat_interval_secs: 5,
                client_timeout_secs: 30,
            },
            cors_allowed_origins: Vec::new(),
        }
    }
}
