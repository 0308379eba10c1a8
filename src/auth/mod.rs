//! User authentication and authorization for both datasets.
//!
//! Provides:
//! - Signup (bootstrap for the first account, invite-gated afterwards)
//! - Login returning the account's durable access token
//! - Token validation and password change with token rotation
//! - Admin policy: the earliest-created account of a dataset is its admin
//! - In-memory invite registry, one live invite token per dataset
//!
//! ## Credential handling
//! Passwords and access tokens are stored and compared exactly as
//! presented. Existing datasets and clients depend on literal equality, so
//! no hashing is applied here; see DESIGN.md before changing that.

pub mod error;
pub mod invite;
pub mod service;
pub mod store;
pub mod token;

pub use error::AuthError;
pub use invite::InviteRegistry;
pub use service::{AuthService, LoginProfile, SignupRequest};
pub use store::{CredentialStore, StoreError, User};
