//! Collision-free username allocation.

use super::errors::AuthResult;
use super::password::MAX_USERNAME_LEN;
use crate::db::UserRepository;
use std::sync::Arc;
use uuid::Uuid;

/// Random suffixes tried before falling back to a UUID
pub const MAX_SUFFIX_ATTEMPTS: usize = 10;

/// `_` plus 8 hex characters
pub const SUFFIX_LEN: usize = 9;

/// Hex characters of the UUID kept by the fallback
const FALLBACK_HEX_LEN: usize = 16;

/// Picks a username that is free in the store at the time of the call.
///
/// Two callers racing on the same base may both see a name as free; the
/// unique constraint on insert catches that and the caller allocates again.
#[derive(Clone)]
pub struct UsernameAllocator {
    users: Arc<dyn UserRepository>,
}

impl UsernameAllocator {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Return `base` if free, else `base_XXXXXXXX` with a random hex suffix.
    ///
    /// After [`MAX_SUFFIX_ATTEMPTS`] collisions the suffix is 16 hex characters
    /// of a v4 UUID, returned without another lookup. The base is shortened
    /// as needed so every result fits in [`MAX_USERNAME_LEN`].
    pub async fn generate_unique(&self, base: &str) -> AuthResult<String> {
        let base = truncate_chars(base, MAX_USERNAME_LEN);
        if !self.users.username_exists(base).await? {
            return Ok(base.to_string());
        }

        let short_base = truncate_chars(base, MAX_USERNAME_LEN - SUFFIX_LEN);
        for _ in 0..MAX_SUFFIX_ATTEMPTS {
            let candidate = format!("{}_{}", short_base, short_suffix());
            if !self.users.username_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        log::warn!(
            "Username base {} still colliding after {} attempts, using UUID suffix",
            base,
            MAX_SUFFIX_ATTEMPTS
        );
        let uuid = Uuid::new_v4().simple().to_string();
        Ok(format!(
            "{}_{}",
            truncate_chars(base, MAX_USERNAME_LEN - 1 - FALLBACK_HEX_LEN),
            &uuid[..FALLBACK_HEX_LEN]
        ))
    }
}

/// Longest prefix of `s` with at most `max` characters
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// 8 lowercase hex characters
pub(crate) fn short_suffix() -> String {
    hex::encode(rand::random::<[u8; 4]>())
}
