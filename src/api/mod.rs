//! HTTP surface: shared state, error mapping and route assembly.

pub mod patients;

use crate::auth::{
    self,
    jwt::JwtHandler,
    middleware::{auth_middleware, require_role, RoleGate},
    password,
};
use crate::middleware::request_logging;
use crate::store::{Repositories, UniqueViolation};
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};
use tracing::{error, warn};

pub const API_PREFIX: &str = "/api/v1";

/// Everything a handler or middleware needs, injected once at startup.
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub jwt: Arc<JwtHandler>,
    pub bcrypt_cost: u32,
    /// Stand-in hash for logins naming an unknown user.
    pub decoy_hash: Arc<str>,
}

impl AppState {
    pub fn new(repos: Repositories, jwt: Arc<JwtHandler>, bcrypt_cost: u32) -> anyhow::Result<Self> {
        let decoy_hash = password::decoy_hash(bcrypt_cost)?;
        Ok(Self {
            repos,
            jwt,
            bcrypt_cost,
            decoy_hash: decoy_hash.into(),
        })
    }
}

/// Errors surfaced to HTTP clients as `{ "message": ... }`.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthenticated(&'static str),
    Forbidden,
    NotFound(&'static str),
    Conflict(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Validation(message) | ApiError::Conflict(message) => message,
            ApiError::Unauthenticated(message) | ApiError::NotFound(message) => {
                message.to_string()
            }
            ApiError::Forbidden => "Access denied".to_string(),
            ApiError::Internal(err) => {
                // Full chain stays server-side.
                error!("❌ Internal error: {:#}", err);
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<UniqueViolation>() {
            Some(UniqueViolation { field: "email" }) => {
                ApiError::Conflict("Email already exists".to_string())
            }
            Some(UniqueViolation { field: "username" }) => {
                ApiError::Conflict("Username already exists".to_string())
            }
            Some(other) => ApiError::Conflict(capitalize(&other.to_string())),
            None => ApiError::Internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        ApiError::Validation("Invalid request payload".to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::Validation("Invalid patient ID".to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(_: QueryRejection) -> Self {
        ApiError::Validation("Invalid query parameters".to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Build the full application router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let receptionist_only = || from_fn_with_state(RoleGate::RECEPTIONIST, require_role);
    let doctor_only = || from_fn_with_state(RoleGate::DOCTOR, require_role);

    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/register", post(auth::api::register))
        .route("/login", post(auth::api::login));

    // Protected routes: authenticate + denylist check, then per-method role gates
    let protected_routes = Router::new()
        .route("/logout", post(auth::api::logout))
        .route("/me", get(auth::api::get_me).patch(auth::api::update_me))
        .route(
            "/patients",
            get(patients::list_patients)
                .merge(post(patients::create_patient).route_layer(receptionist_only())),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient)
                .merge(put(patients::update_patient_demographics).route_layer(receptionist_only()))
                .merge(delete(patients::delete_patient).route_layer(receptionist_only()))
                .merge(patch(patients::update_patient_medical).route_layer(doctor_only())),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state);

    with_service_layers(Router::new().nest(API_PREFIX, api), request_timeout)
}

/// Outer stack, innermost first: timeout, CORS, panic recovery, access log,
/// then request-id propagation and assignment.
fn with_service_layers(app: Router, request_timeout: Duration) -> Router {
    app.layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn(request_logging))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// A panicking handler becomes a plain 500; the server keeps running.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("💥 Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal server error" })),
    )
        .into_response()
}
