//! In-memory invite token registry.
//!
//! Holds at most one live invite token per dataset. Issuing a new token
//! replaces the previous one. Nothing is persisted: a restart leaves every
//! dataset without a live invite.

use super::token::generate_invite_token;
use crate::db::Dataset;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Current invite token per dataset.
#[derive(Debug, Default)]
pub struct InviteRegistry {
    tokens: Mutex<HashMap<Dataset, String>>,
}

impl InviteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh token and make it the dataset's only live invite.
    /// Concurrent issuers race to last-write-wins.
    pub fn issue(&self, dataset: Dataset) -> String {
        let token = generate_invite_token();
        self.tokens.lock().insert(dataset, token.clone());
        tracing::info!(dataset = %dataset, "Invite token issued");
        token
    }

    /// The dataset's live invite token, if one was issued since startup.
    pub fn peek(&self, dataset: Dataset) -> Option<String> {
        self.tokens.lock().get(&dataset).cloned()
    }

    /// Whether `candidate` equals the dataset's live invite token.
    pub fn matches(&self, dataset: Dataset, candidate: &str) -> bool {
        self.tokens
            .lock()
            .get(&dataset)
            .is_some_and(|live| live == candidate)
    }

    /// Drop the dataset's live invite token. Returns whether one existed.
    pub fn revoke(&self, dataset: Dataset) -> bool {
        self.tokens.lock().remove(&dataset).is_some()
    }
}

/// Shareable signup link for an invite token. Demo invites carry an
/// explicit `demo=true` marker so the client selects the demo dataset.
pub fn invite_link(base_url: &str, dataset: Dataset, token: &str) -> String {
    let mut link = format!("{base_url}?token={token}");
    if dataset == Dataset::Demo {
        link.push_str("&demo=true");
    }
    link
}
