//! Authentication Middleware
//! Mission: Authenticate bearer tokens, reject revoked ones, gate routes by role

use crate::api::{ApiError, AppState};
use crate::auth::models::Role;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Verified caller identity, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
    /// The raw bearer token, kept for logout.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Pull the token out of `Bearer <token>`.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

/// Auth middleware: signature + expiry, then the denylist.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer)
        .map(str::to_string)
        .ok_or(ApiError::Unauthenticated("Invalid authorization header"))?;

    let now = Utc::now();
    let verified = state.jwt.verify(&token, now).map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthenticated("Invalid or expired token")
    })?;

    if state.repos.tokens.is_invalid(&token, now).await? {
        return Err(ApiError::Unauthenticated("Token has been invalidated"));
    }

    req.extensions_mut().insert(AuthContext {
        user_id: verified.user_id,
        role: verified.role,
        token,
        expires_at: verified.expires_at,
    });

    Ok(next.run(req).await)
}

/// Roles permitted through a `require_role` layer.
#[derive(Debug, Clone, Copy)]
pub struct RoleGate {
    allowed: &'static [Role],
}

impl RoleGate {
    pub const DOCTOR: RoleGate = RoleGate {
        allowed: &[Role::Doctor],
    };
    pub const RECEPTIONIST: RoleGate = RoleGate {
        allowed: &[Role::Receptionist],
    };

    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

/// Role gate. Must sit inside `auth_middleware`.
pub async fn require_role(
    State(gate): State<RoleGate>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = req
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.role)
        .ok_or(ApiError::Unauthenticated("Unauthorized"))?;

    if !gate.allows(role) {
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(ApiError::Unauthenticated("Unauthorized"))
    }
}
