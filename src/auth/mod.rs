//! Authentication Module
//! Mission: Staff accounts, bearer tokens, logout denylist and role-gated access

pub mod api;
pub mod denylist;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;

pub use jwt::{JwtHandler, TokenError};
pub use middleware::{auth_middleware, require_role, AuthContext, RoleGate};
pub use models::{Role, User};
