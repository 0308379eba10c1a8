//! SQLite-backed credential store, one per dataset.
//!
//! Table `users`: id, displayname, username, password, accesstoken.
//! Lookups compare with SQLite's default BINARY collation (exact,
//! case-sensitive).

use crate::db::SqlitePool;
use rusqlite::OptionalExtension;

/// A stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub username: String,
    pub access_token: String,
}

/// Fields for a new account row.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub display_name: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub access_token: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Credential queries against one dataset's pool.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Display name of the user whose login and access token both match.
    pub fn display_name_for_token(&self, username: &str, token: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let name = conn
            .query_row(
                "SELECT displayname FROM users WHERE username = ?1 AND accesstoken = ?2",
                rusqlite::params![username, token],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Look up a user by login and literal password.
    pub fn find_by_password(&self, username: &str, password: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, displayname, username, accesstoken
                 FROM users WHERE username = ?1 AND password = ?2",
                rusqlite::params![username, password],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        username: row.get(2)?,
                        access_token: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Login name of the earliest-created user, if any.
    pub fn first_username(&self) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let name = conn
            .query_row(
                "SELECT username FROM users ORDER BY id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    pub fn has_users(&self) -> Result<bool> {
        let conn = self.pool.get()?;
        let exists = conn
            .query_row("SELECT 1 FROM users LIMIT 1", [], |_| Ok(()))
            .optional()?;
        Ok(exists.is_some())
    }

    pub fn user_count(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Insert a new user. Returns the assigned id.
    pub fn insert(&self, user: &NewUser<'_>) -> Result<i64> {
        let conn = self.pool.get()?;
        let result = conn.execute(
            "INSERT INTO users (displayname, username, password, accesstoken)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                user.display_name,
                user.username,
                user.password,
                user.access_token
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::UsernameTaken(user.username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite a user's password. Returns the number of rows updated.
    pub fn update_password(&self, username: &str, password: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE users SET password = ?1 WHERE username = ?2",
            rusqlite::params![password, username],
        )?;
        Ok(updated)
    }

    /// Replace a user's access token. Returns the number of rows updated.
    pub fn update_access_token(&self, username: &str, token: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE users SET accesstoken = ?1 WHERE username = ?2",
            rusqlite::params![token, username],
        )?;
        Ok(updated)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
