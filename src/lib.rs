//! Clinic Backend Library
//!
//! Staff authentication (bearer tokens, logout denylist, role gates) and
//! patient records behind a versioned REST API. The binary wires these
//! modules together; tests drive the router directly.

pub mod api;
pub mod auth;
pub mod config;
pub mod middleware;
pub mod models;
pub mod store;

pub use api::{router, ApiError, AppState};
pub use config::Config;
