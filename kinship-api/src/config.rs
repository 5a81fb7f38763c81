/// Server configuration
///
/// Loaded from environment variables, after reading a `.env` file if one is
/// present.
///
/// # Environment Variables
///
/// - `API_HOST` (default `0.0.0.0`), `API_PORT` (default `8080`)
/// - `CORS_ORIGINS`: comma separated, `*` for permissive (default `*`)
/// - `PRODUCTION`: `true` enables HSTS (default `false`)
/// - `STORAGE_BACKEND`: `postgres` or `memory` (default `postgres`)
/// - `DATABASE_URL`: required for the postgres backend
/// - `DATABASE_MAX_CONNECTIONS` (default `10`)
/// - `JWT_SECRET`: required, at least 32 characters
/// - `JWT_TTL_HOURS` (default `24`)
/// - `LOG_FORMAT`: `pretty` or `json` (default `pretty`)
///
/// # Example
///
/// ```no_run
/// use kinship_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("listening on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::str::FromStr;

use chrono::Duration;
use kinship_shared::auth::jwt::DEFAULT_TTL_HOURS;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Adds Strict-Transport-Security to responses
    pub production: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("unknown STORAGE_BACKEND '{other}' (expected postgres or memory)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Present whenever `backend` is `Postgres`
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing key. Generate with `openssl rand -hex 32`.
    pub secret: String,
    pub ttl_hours: i64,
}

impl JwtConfig {
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// # Errors
    ///
    /// Fails on a missing `JWT_SECRET`, a secret shorter than 32 characters,
    /// a missing `DATABASE_URL` with the postgres backend, or any value that
    /// does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let port = var_or("API_PORT", "8080").parse::<u16>()?;
        let cors_origins = var_or("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let production = var_or("PRODUCTION", "false").parse::<bool>()?;

        let backend: StorageBackend = var_or("STORAGE_BACKEND", "postgres").parse()?;
        let database_url = env::var("DATABASE_URL").ok();
        if backend == StorageBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL environment variable is required for the postgres backend");
        }
        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", "10").parse::<u32>()?;

        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }
        let ttl_hours = var_or("JWT_TTL_HOURS", &DEFAULT_TTL_HOURS.to_string()).parse::<i64>()?;
        if ttl_hours <= 0 {
            anyhow::bail!("JWT_TTL_HOURS must be positive");
        }

        let log_format = match var_or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            api: ApiConfig {
                host: var_or("API_HOST", "0.0.0.0"),
                port,
                cors_origins,
                production,
            },
            storage: StorageConfig {
                backend,
                database_url,
                max_connections,
            },
            jwt: JwtConfig { secret, ttl_hours },
            log_format,
        })
    }

    /// In-memory configuration with the given signing key, for tests and demos.
    pub fn for_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["*".to_string()],
                production: false,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 1,
            },
            jwt: JwtConfig {
                secret: jwt_secret.into(),
                ttl_hours: DEFAULT_TTL_HOURS,
            },
            log_format: LogFormat::Pretty,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
