//! Authentication API Endpoints
//! Mission: Registration, login, logout and the caller's own profile

use crate::api::{ApiError, AppState};
use crate::auth::{
    middleware::AuthContext,
    models::{
        is_plausible_email, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, User,
        UserResponse, UserUpdate,
    },
    password::{hash_password, verify_password},
};
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(payload) = payload?;
    payload
        .validate()
        .map_err(|msg| ApiError::Validation(msg.to_string()))?;
    let new_user = payload.to_new_user();

    // Not-found means proceed; a failed lookup is a 500, never a silent pass.
    if state.repos.users.email_exists(&new_user.email).await? {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }
    if state.repos.users.username_exists(&new_user.username).await? {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }

    let password_hash = hash_password(payload.password, state.bcrypt_cost).await?;

    // A concurrent registration can still win the race; the store reports it
    // as a UniqueViolation, which maps to 409.
    let user = state.repos.users.create(&new_user, &password_hash).await?;

    info!("✅ Registered {} ({})", user.username, user.role);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            message: "User registered successfully".to_string(),
        }),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = payload?;
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let user = state.repos.users.find_by_username(&payload.username).await?;

    // Unknown usernames still pay for one bcrypt comparison.
    let hash = credential_hash(user.as_ref(), &state.decoy_hash).to_string();
    let authenticated = verify_password(payload.password, hash).await?;

    let Some(user) = user.filter(|_| authenticated) else {
        // Same line for unknown user and wrong password.
        warn!("❌ Failed login attempt");
        return Err(ApiError::Unauthenticated("Invalid credentials"));
    };

    let issued = state.jwt.issue(user.id, user.role, Utc::now())?;

    info!("🔐 Login successful: {} ({})", user.username, user.role);

    Ok(Json(LoginResponse {
        access_token: issued.token,
        token_type: "Bearer".to_string(),
        user_type: user.role,
    }))
}

/// Hash a login attempt is verified against: the account's own, or the decoy.
fn credential_hash<'a>(user: Option<&'a User>, decoy: &'a str) -> &'a str {
    match user {
        Some(user) => &user.password_hash,
        None => decoy,
    }
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Value>, ApiError> {
    state
        .repos
        .tokens
        .invalidate(&ctx.token, ctx.expires_at)
        .await?;

    info!("👋 Logged out user {}", ctx.user_id);

    Ok(Json(json!({ "message": "Successfully logged out" })))
}

/// GET /me
pub async fn get_me(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .repos
        .users
        .find_by_id(ctx.user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// PATCH /me
pub async fn update_me(
    State(state): State<AppState>,
    ctx: AuthContext,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(mut update) = payload?;
    if update.is_empty() {
        return Err(ApiError::Validation("No fields to update".to_string()));
    }

    if let Some(username) = update.username.as_mut() {
        *username = username.trim().to_string();
        if username.is_empty() {
            return Err(ApiError::Validation("Username cannot be empty".to_string()));
        }
    }
    if let Some(email) = update.email.as_mut() {
        *email = email.trim().to_string();
        if !is_plausible_email(email) {
            return Err(ApiError::Validation("A valid email is required".to_string()));
        }
    }
    if let Some(full_name) = update.full_name.as_mut() {
        *full_name = full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(ApiError::Validation("Full name cannot be empty".to_string()));
        }
    }

    let user = state
        .repos
        .users
        .update(ctx.user_id, &update)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!("✏️  Profile updated: {}", user.username);

    Ok(Json(UserResponse::from_user(&user)))
}
