//! Auth operations shared by every gateway handler.
//!
//! `AuthService` owns the invite registry and the dataset pools; the
//! gateway holds one instance per process behind an `Arc`.

use super::error::AuthError;
use super::invite::{invite_link, InviteRegistry};
use super::store::{CredentialStore, NewUser};
use super::token::generate_access_token;
use crate::config::InviteConfig;
use crate::db::{DatabasePools, Dataset};

pub type Result<T> = std::result::Result<T, AuthError>;

/// Signup input as received from the client. Empty strings count as
/// missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignupRequest<'a> {
    pub display_name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    /// Invite token; required once the dataset has any user.
    pub invite_token: Option<&'a str>,
    pub dataset: &'a str,
}

/// What a successful login hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginProfile {
    pub id: i64,
    pub display_name: String,
    pub access_token: String,
}

pub struct AuthService {
    pools: DatabasePools,
    invites: InviteRegistry,
    invite_base_url: String,
    single_use_invites: bool,
}

impl AuthService {
    pub fn new(pools: DatabasePools, invite: &InviteConfig) -> Self {
        Self {
            pools,
            invites: InviteRegistry::new(),
            invite_base_url: invite.base_url.clone(),
            single_use_invites: invite.single_use,
        }
    }

    pub fn invites(&self) -> &InviteRegistry {
        &self.invites
    }

    pub fn store(&self, dataset: Dataset) -> CredentialStore {
        CredentialStore::new(self.pools.get(dataset).clone())
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Confirm a login/access-token pair. Returns the display name.
    pub fn validate(&self, username: &str, token: &str, dataset: &str) -> Result<String> {
        if username.is_empty() || token.is_empty() || dataset.is_empty() {
            return Err(AuthError::BadRequest(
                "Username, access token, and dbPool are required",
            ));
        }
        let dataset: Dataset = dataset.parse()?;
        self.authenticate(dataset, username, token)
    }

    fn authenticate(&self, dataset: Dataset, username: &str, token: &str) -> Result<String> {
        let username = username.trim();
        let token = token.trim();
        if username.is_empty() || token.is_empty() {
            return Err(AuthError::BadRequest("Missing parameters"));
        }

        match self.store(dataset).display_name_for_token(username, token)? {
            Some(name) => Ok(name),
            None => {
                tracing::debug!(dataset = %dataset, username, "Access token rejected");
                Err(AuthError::Unauthorized("Unauthorized: Incorrect User Data"))
            }
        }
    }

    // ── Admin policy ────────────────────────────────────────────────

    /// Whether `username` is the dataset's earliest-created account
    /// (case-insensitive).
    pub fn is_admin(&self, username: &str, dataset: Dataset) -> Result<bool> {
        let first = self.store(dataset).first_username()?;
        Ok(first.is_some_and(|admin| admin.to_lowercase() == username.trim().to_lowercase()))
    }

    /// Validate the bearer token, then require the admin designation.
    pub fn require_admin(&self, username: &str, bearer_token: &str, dataset: Dataset) -> Result<()> {
        self.authenticate(dataset, username, bearer_token)?;
        if self.is_admin(username, dataset)? {
            Ok(())
        } else {
            tracing::warn!(dataset = %dataset, username = username.trim(), "Admin check refused");
            Err(AuthError::Forbidden)
        }
    }

    /// Admin check as exposed to clients. The dataset selector is resolved
    /// without a presence check; a missing selector is a client
    /// configuration error.
    pub fn check_admin(&self, username: &str, bearer_token: &str, dataset: &str) -> Result<()> {
        if username.is_empty() || bearer_token.is_empty() {
            return Err(AuthError::BadRequest("Username and access token are required"));
        }
        let dataset: Dataset = dataset.parse()?;
        self.require_admin(username, bearer_token, dataset)
    }

    // ── Invites ─────────────────────────────────────────────────────

    /// Issue a new invite for the dataset and return its signup link.
    /// Only the dataset's admin may do this.
    pub fn issue_invite(&self, username: &str, bearer_token: &str, dataset: &str) -> Result<String> {
        if username.is_empty() || bearer_token.is_empty() || dataset.is_empty() {
            return Err(AuthError::BadRequest(
                "Username, access token, and database pool are required",
            ));
        }
        let dataset: Dataset = dataset.parse()?;
        self.require_admin(username, bearer_token, dataset)?;

        let token = self.invites.issue(dataset);
        Ok(invite_link(&self.invite_base_url, dataset, &token))
    }

    // ── Signup ──────────────────────────────────────────────────────

    /// Create an account. The first account of a dataset needs no invite;
    /// every later one must present the dataset's live invite token.
    /// Returns the new user's id.
    pub fn signup(&self, req: &SignupRequest<'_>) -> Result<i64> {
        let dataset: Dataset = req.dataset.parse()?;
        let username = req.username.trim();
        let password = req.password.trim();

        if req.display_name.is_empty() || username.is_empty() || password.is_empty() {
            return Err(AuthError::BadRequest(
                "Display name, username and password are required",
            ));
        }

        let store = self.store(dataset);
        let invited = store.has_users()?;
        if invited {
            if self.invites.peek(dataset).is_none() {
                tracing::warn!(dataset = %dataset, "Signup refused: no invite issued");
                return Err(AuthError::Unauthorized("Invalid or missing invite token"));
            }
            let supplied = req.invite_token.unwrap_or_default();
            if supplied.is_empty() || !self.invites.matches(dataset, supplied) {
                tracing::warn!(dataset = %dataset, "Signup refused: invite token mismatch");
                return Err(AuthError::Unauthorized("Invalid invite token"));
            }
        }

        let access_token = generate_access_token();
        let id = store.insert(&NewUser {
            display_name: req.display_name,
            username,
            password,
            access_token: &access_token,
        })?;

        if invited && self.single_use_invites {
            self.invites.revoke(dataset);
        }

        tracing::info!(dataset = %dataset, username, id, invited, "User registered");
        Ok(id)
    }

    // ── Login ───────────────────────────────────────────────────────

    /// Check a login/password pair and return the account's current access
    /// token. No new token is minted.
    pub fn login(&self, username: &str, password: &str, dataset: &str) -> Result<LoginProfile> {
        if username.is_empty() || password.is_empty() || dataset.is_empty() {
            return Err(AuthError::BadRequest(
                "Username, password, and dbPool are required",
            ));
        }
        let dataset: Dataset = dataset.parse()?;
        let username = username.trim();
        let password = password.trim();

        match self.store(dataset).find_by_password(username, password)? {
            Some(user) => Ok(LoginProfile {
                id: user.id,
                display_name: user.display_name,
                access_token: user.access_token,
            }),
            None => {
                tracing::debug!(dataset = %dataset, username, "Login rejected");
                Err(AuthError::Unauthorized("Invalid username or password"))
            }
        }
    }

    // ── Password change ─────────────────────────────────────────────

    /// Set a new password and rotate the access token. Returns the new
    /// token; the old one stops validating.
    pub fn change_password(
        &self,
        username: &str,
        token: &str,
        new_password: &str,
        dataset: &str,
    ) -> Result<String> {
        if username.is_empty() || token.is_empty() || new_password.is_empty() || dataset.is_empty()
        {
            return Err(AuthError::BadRequest(
                "Username, access token, and new password are required",
            ));
        }
        let dataset: Dataset = dataset.parse()?;
        let username = username.trim();
        let new_password = new_password.trim();

        self.authenticate(dataset, username, token)?;

        let store = self.store(dataset);
        if store.update_password(username, new_password)? == 0 {
            return Err(AuthError::NotFound);
        }

        let new_token = generate_access_token();
        store.update_access_token(username, &new_token)?;

        tracing::info!(dataset = %dataset, username, "Password changed, access token rotated");
        Ok(new_token)
    }
}
