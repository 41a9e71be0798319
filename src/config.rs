use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

const MIN_SECRET_LEN: usize = 16;
const MAX_TOKEN_DAYS: i64 = 3650;

/// Runtime configuration, read from the process environment (and `.env` via `dotenv`).
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the API against the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub server_port: u16,
    pub server_host: String,
    pub jwt_secret: String,
    pub jwt_expiration_days: i64,
    /// Remote key-set endpoint; `None` disables remote (EdDSA) tokens.
    pub jwks_url: Option<String>,
    pub jwks_cache_ttl: Duration,
    pub jwks_fetch_timeout: Duration,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::InternalServerError("JWT_SECRET must be set".into()))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(AppError::InternalServerError(format!(
                "JWT_SECRET must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        let jwt_expiration_days = parse_var("JWT_EXPIRATION_DAYS", 7)?;
        if !(1..=MAX_TOKEN_DAYS).contains(&jwt_expiration_days) {
            return Err(AppError::InternalServerError(format!(
                "JWT_EXPIRATION_DAYS must be between 1 and {}",
                MAX_TOKEN_DAYS
            )));
        }

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            server_port: parse_var("SERVER_PORT", 8080)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            jwt_secret,
            jwt_expiration_days,
            jwks_url: non_empty_var("JWKS_URL"),
            jwks_cache_ttl: Duration::from_secs(parse_var("JWKS_CACHE_TTL_SECS", 300)?),
            jwks_fetch_timeout: Duration::from_secs(parse_var("JWKS_FETCH_TIMEOUT_SECS", 5)?),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.jwt_expiration_days)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::InternalServerError(format!("{} must be a number", key))),
        Err(_) => Ok(default),
    }
}
