//! Persistence layer.
//!
//! - `Database`: SQLite handle, schema bootstrap, cancellable blocking calls
//! - repository traits for accounts, patients and the token denylist
//! - `sqlite` implementations in `users`, `patients`, `tokens`
//! - `memory`: a single-lock in-memory adapter used by the HTTP tests

pub mod memory;
pub mod patients;
pub mod tokens;
pub mod users;

use crate::auth::models::{NewUser, User, UserUpdate};
use crate::models::{NewPatient, Page, Patient, PatientChanges, PatientListing};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use patients::SqlitePatientStore;
pub use tokens::SqliteTokenStore;
pub use users::SqliteUserStore;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    full_name TEXT NOT NULL,
    user_type TEXT NOT NULL CHECK (user_type IN ('doctor', 'receptionist')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    full_name TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    gender TEXT NOT NULL CHECK (gender IN ('male', 'female')),
    address TEXT NOT NULL DEFAULT '',
    phone TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    medical_history TEXT NOT NULL DEFAULT '',
    registered_by TEXT NOT NULL REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_patients_created_at
    ON patients(created_at DESC);

CREATE TABLE IF NOT EXISTS invalid_tokens (
    token TEXT PRIMARY KEY,
    invalidated_at TEXT NOT NULL,
    expires_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_invalid_tokens_expires_at
    ON invalid_tokens(expires_at);
"#;

/// A unique column already holds the submitted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueViolation {
    pub field: &'static str,
}

impl std::fmt::Display for UniqueViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} already exists", self.field)
    }
}

impl std::error::Error for UniqueViolation {}

/// Credential Store
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser, password_hash: &str) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn username_exists(&self, username: &str) -> Result<bool>;
    async fn email_exists(&self, email: &str) -> Result<bool>;
    async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<Option<User>>;
}

#[async_trait]
pub trait PatientRepository: Send + Sync {
    async fn create(&self, registered_by: Uuid, patient: &NewPatient) -> Result<Uuid>;
    /// One page of patients, newest first, plus the total count.
    async fn list(&self, page: Page) -> Result<(Vec<PatientListing>, u64)>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Patient>>;
    async fn update(&self, id: Uuid, changes: &PatientChanges) -> Result<Option<Patient>>;
    /// Returns false when no such patient existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Token Denylist
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Record `token` as revoked until `expires_at`. Repeating it is harmless.
    async fn invalidate(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()>;
    /// True only while a matching entry's expiry is still ahead of `now`.
    async fn is_invalid(&self, token: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Delete every entry with expiry at or before `now`.
    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// The three stores a request handler can reach.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub patients: Arc<dyn PatientRepository>,
    pub tokens: Arc<dyn TokenRepository>,
}

impl Repositories {
    pub fn sqlite(db: &Database) -> Self {
        Self {
            users: Arc::new(SqliteUserStore::new(db.clone())),
            patients: Arc::new(SqlitePatientStore::new(db.clone())),
            tokens: Arc::new(SqliteTokenStore::new(db.clone())),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            patients: store.clone(),
            tokens: store,
        }
    }
}

/// SQLite database handle.
///
/// Every call opens its own connection on the blocking pool; the semaphore
/// caps how many are open at once.
#[derive(Clone)]
pub struct Database {
    path: Arc<PathBuf>,
    permits: Arc<Semaphore>,
    busy_timeout: Duration,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>, max_connections: usize, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path, busy_timeout)?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        info!("🗄️  Database ready at {}", path.display());

        Ok(Self {
            path: Arc::new(path),
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
            busy_timeout,
        })
    }

    /// Another handle on the same file with its own connection budget.
    pub fn detached(&self, max_connections: usize) -> Self {
        Self {
            path: self.path.clone(),
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
            busy_timeout: self.busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against a fresh connection off the async executor.
    ///
    /// If the returned future is dropped before `f` finishes, the statement in
    /// flight is interrupted.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("Database handle closed")?;

        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let mut conn = tokio::task::spawn_blocking(move || open_connection(&path, busy_timeout))
            .await
            .context("Database open task failed")??;

        let mut guard = InterruptOnDrop(Some(conn.get_interrupt_handle()));
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&mut conn)
        })
        .await
        .context("Database task failed")?;
        guard.disarm();

        result
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(path, flags)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

struct InterruptOnDrop(Option<InterruptHandle>);

impl InterruptOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.interrupt();
        }
    }
}

/// Map a UNIQUE constraint failure to `UniqueViolation`, naming the column.
pub(crate) fn classify_unique(err: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation && message.contains("UNIQUE") {
            let field = if message.contains(".email") {
                "email"
            } else if message.contains(".username") {
                "username"
            } else {
                "record"
            };
            return UniqueViolation { field }.into();
        }
    }
    err.into()
}

pub(crate) fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

pub(crate) fn parse_uuid(raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}
