//! Password Hashing
//! Mission: Salted bcrypt hashes, computed off the async executor

use anyhow::{Context, Result};
use uuid::Uuid;

/// Accepted bcrypt cost range.
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// Hash `password` with the given bcrypt cost.
pub async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("Password hashing task failed")?
        .context("Failed to hash password")
}

/// Hash of a random throwaway secret at `cost`.
///
/// Logins for unknown usernames are checked against it, so every failed
/// login pays for exactly one bcrypt comparison.
pub fn decoy_hash(cost: u32) -> Result<String> {
    bcrypt::hash(Uuid::new_v4().as_bytes(), cost).context("Failed to create decoy hash")
}

/// Constant-time comparison of `password` against a stored hash.
///
/// A stored value that is not a bcrypt hash counts as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    let matched = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("Password verification task failed")?;
    Ok(matched.unwrap_or(false))
}
