use super::store::StoreError;
use crate::db::InvalidPool;

/// Failure of an auth operation. Every variant carries a short reason
/// suitable for the client.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or malformed input.
    #[error("{0}")]
    BadRequest(&'static str),

    /// Credential, access token or invite token mismatch.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Authenticated, but not the dataset's admin.
    #[error("You are not an admin")]
    Forbidden,

    #[error("User not found")]
    NotFound,

    /// Login name already in use within the dataset.
    #[error("Username '{0}' is already taken")]
    Conflict(String),

    #[error("Storage failure: {0}")]
    Internal(#[source] StoreError),

    /// Unrecognized dataset selector. A configuration error on the caller's
    /// side, reported to clients as a generic failure.
    #[error(transparent)]
    InvalidPool(#[from] InvalidPool),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UsernameTaken(name) => Self::Conflict(name),
            other => Self::Internal(other),
        }
    }
}
