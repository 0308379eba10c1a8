//! Access-token and invite-token generation.

use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};

/// Access token byte length before hex encoding (64 bytes = 128 hex chars).
pub const ACCESS_TOKEN_BYTES: usize = 64;

/// Invite token length in characters.
pub const INVITE_TOKEN_LEN: usize = 13;

/// Generate a bearer access token from the OS CSPRNG (hex-encoded).
///
/// No uniqueness check is made against the store; at 512 bits a collision
/// is not a practical concern.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a short lowercase alphanumeric invite token.
///
/// Lower entropy than access tokens: invites are short-lived and gate
/// signup only.
pub fn generate_invite_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_TOKEN_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}
