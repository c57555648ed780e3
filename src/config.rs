//! Runtime configuration from CLI flags and environment variables.

use crate::auth::password::{MAX_COST, MIN_COST};
use anyhow::{bail, Result};
use clap::{Args, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Fallback signing secret for local development only.
pub const DEV_JWT_SECRET: &str = "clinic-dev-secret-change-me";

/// Longest accepted token lifetime: one year.
pub const MAX_EXPIRY_HOURS: i64 = 24 * 365;

#[derive(Parser, Debug, Clone)]
#[command(name = "clinic")]
#[command(about = "Clinic REST API - staff auth and patient records")]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub jwt: JwtConfig,
}

#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Per-request deadline in seconds
    #[arg(long = "request-timeout-secs", env = "SERVER_REQUEST_TIMEOUT", default_value = "60")]
    pub request_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[arg(long = "database-path", env = "DATABASE_PATH", default_value = "clinic.db")]
    pub path: PathBuf,

    /// Maximum concurrently open connections
    #[arg(long = "db-max-connections", env = "DB_MAX_OPEN_CONNS", default_value = "10")]
    pub max_connections: usize,

    /// SQLite busy timeout in milliseconds
    #[arg(long = "db-busy-timeout-ms", env = "DB_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u64,

    /// Seconds between denylist sweeps
    #[arg(
        long = "token-cleanup-interval-secs",
        env = "TOKEN_CLEANUP_INTERVAL_SECS",
        default_value = "3600"
    )]
    pub cleanup_interval_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct JwtConfig {
    /// HMAC secret for signing tokens
    #[arg(long = "jwt-secret", env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub secret: String,

    /// Token validity window in hours
    #[arg(long = "jwt-expiry-hours", env = "JWT_EXPIRY_HOURS", default_value = "24")]
    pub expiry_hours: i64,

    /// bcrypt cost factor
    #[arg(long = "bcrypt-cost", env = "BCRYPT_COST", default_value = "12")]
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.server.request_timeout_secs == 0 {
            bail!("SERVER_REQUEST_TIMEOUT must be greater than zero");
        }
        if self.database.max_connections == 0 {
            bail!("DB_MAX_OPEN_CONNS must be greater than zero");
        }
        if self.database.busy_timeout_ms == 0 {
            bail!("DB_BUSY_TIMEOUT_MS must be greater than zero");
        }
        if self.database.cleanup_interval_secs == 0 {
            bail!("TOKEN_CLEANUP_INTERVAL_SECS must be greater than zero");
        }
        if self.jwt.secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if !(1..=MAX_EXPIRY_HOURS).contains(&self.jwt.expiry_hours) {
            bail!("JWT_EXPIRY_HOURS must be between 1 and {}", MAX_EXPIRY_HOURS);
        }
        if !(MIN_COST..=MAX_COST).contains(&self.jwt.bcrypt_cost) {
            bail!("BCRYPT_COST must be between {} and {}", MIN_COST, MAX_COST);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.database.cleanup_interval_secs)
    }

    pub fn token_validity(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt.expiry_hours)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt.secret == DEV_JWT_SECRET
    }
}
