//! Repair-shop backend: authentication and authorization core.
//!
//! Provides:
//! - Account signup, login, token validation and password change
//! - First-user-is-admin policy and admin-issued invite links
//! - Two isolated datasets (`main` / `demo`) selected per request
//! - An axum HTTP gateway exposing the above as JSON endpoints

pub mod auth;
pub mod config;
pub mod db;
pub mod gateway;

pub use auth::{AuthError, AuthService};
pub use config::Config;
pub use db::{DatabasePools, Dataset};
