//! Token denylist storage (`invalid_tokens`).

use super::{Database, TokenRepository};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

pub struct SqliteTokenStore {
    db: Database,
}

impl SqliteTokenStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenStore {
    async fn invalidate(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let token = token.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO invalid_tokens (token, invalidated_at, expires_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(token) DO UPDATE SET expires_at = excluded.expires_at",
                    params![token, Utc::now().to_rfc3339(), expires_at.timestamp()],
                )
                .context("Failed to invalidate token")?;
                Ok(())
            })
            .await
    }

    async fn is_invalid(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let token = token.to_string();
        self.db
            .call(move |conn| {
                let exists: bool = conn
                    .query_row(
                        "SELECT EXISTS(
                             SELECT 1 FROM invalid_tokens
                             WHERE token = ?1 AND expires_at > ?2
                         )",
                        params![token, now.timestamp()],
                        |row| row.get(0),
                    )
                    .context("Failed to check token validity")?;
                Ok(exists)
            })
            .await
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = self
            .db
            .call(move |conn| {
                let deleted = conn
                    .execute(
                        "DELETE FROM invalid_tokens WHERE expires_at <= ?1",
                        params![now.timestamp()],
                    )
                    .context("Failed to clean up expired tokens")?;
                Ok(deleted as u64)
            })
            .await?;

        debug!("Denylist cleanup removed {} entries", deleted);
        Ok(deleted)
    }
}
