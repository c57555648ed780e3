//! User Storage
//! Mission: Persist staff accounts in SQLite

use super::{classify_unique, parse_timestamp, parse_uuid, Database, UserRepository};
use crate::auth::models::{NewUser, Role, User, UserUpdate};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, user_type, created_at, updated_at";

/// User storage with SQLite backend
pub struct SqliteUserStore {
    db: Database,
}

impl SqliteUserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &'static str, value: String) -> Result<Option<User>> {
        self.db
            .call(move |conn| {
                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
                let user = conn
                    .query_row(&sql, params![value], user_from_row)
                    .optional()
                    .with_context(|| format!("Failed to look up user by {column}"))?;
                Ok(user)
            })
            .await
    }

    async fn exists(&self, column: &'static str, value: String) -> Result<bool> {
        self.db
            .call(move |conn| {
                let sql = format!("SELECT EXISTS(SELECT 1 FROM users WHERE {column} = ?1)");
                let exists: bool = conn
                    .query_row(&sql, params![value], |row| row.get(0))
                    .with_context(|| format!("Failed to check {column} existence"))?;
                Ok(exists)
            })
            .await
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(5)?;
    Ok(User {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        full_name: row.get(4)?,
        role: Role::parse(&role_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(5, role_str.clone(), rusqlite::types::Type::Text)
        })?,
        created_at: parse_timestamp(&row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(7)?)?,
    })
}

#[async_trait]
impl UserRepository for SqliteUserStore {
    async fn create(&self, new_user: &NewUser, password_hash: &str) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: password_hash.to_string(),
            full_name: new_user.full_name.clone(),
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };

        let row = user.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, username, email, password_hash, full_name, user_type, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.id.to_string(),
                        row.username,
                        row.email,
                        row.password_hash,
                        row.full_name,
                        row.role.as_str(),
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(classify_unique)
                .context("Failed to insert user")?;
                Ok(())
            })
            .await?;

        info!("✅ Created user: {} ({})", user.username, user.role);

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.find_one("id", id.to_string()).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username.to_string()).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email.to_string()).await
    }

    async fn username_exists(&self, username: &str) -> Result<bool> {
        self.exists("username", username.to_string()).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        self.exists("email", email.to_string()).await
    }

    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<Option<User>> {
        let update = update.clone();
        self.db
            .call(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE users
                         SET username = COALESCE(?1, username),
                             email = COALESCE(?2, email),
                             full_name = COALESCE(?3, full_name),
                             updated_at = ?4
                         WHERE id = ?5",
                        params![
                            update.username,
                            update.email,
                            update.full_name,
                            Utc::now().to_rfc3339(),
                            id.to_string(),
                        ],
                    )
                    .map_err(classify_unique)
                    .context("Failed to update user")?;

                if changed == 0 {
                    return Ok(None);
                }

                let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
                let user = conn
                    .query_row(&sql, params![id.to_string()], user_from_row)
                    .optional()
                    .context("Failed to reload user")?;
                Ok(user)
            })
            .await
    }
}
