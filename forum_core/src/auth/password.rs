//! Password policy, hashing and input normalisation.
//!
//! Hashes are Argon2id PHC strings. Anything stored in the password column
//! that doesn't parse as a PHC string (NULL for OAuth accounts, or the old
//! `oauth_placeholder` marker) can never verify.

use super::errors::{AuthError, AuthResult};
use super::username::SUFFIX_LEN;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use regex::Regex;
use std::sync::LazyLock;

/// Minimum password length in characters
pub const MIN_PASSWORD_LEN: usize = 6;

/// Characters that count as a symbol for the complexity policy
pub const PASSWORD_SYMBOLS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_{|}~";

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;

static EMAIL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9\-]+(\.[a-z0-9\-]+)*\.[a-z]{2,}$").ok()
});

/// Check a password against the complexity policy.
///
/// # Errors
///
/// * `AuthError::WeakPassword` - names the first rule the password breaks
pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let rules: [(fn(char) -> bool, &str); 4] = [
        (|c| c.is_ascii_uppercase(), "one uppercase letter"),
        (|c| c.is_ascii_lowercase(), "one lowercase letter"),
        (|c| c.is_ascii_digit(), "one digit"),
        (|c| PASSWORD_SYMBOLS.contains(c), "one symbol"),
    ];

    for (rule, description) in rules {
        if !password.chars().any(rule) {
            return Err(AuthError::WeakPassword(format!(
                "Password must contain at least {description}"
            )));
        }
    }

    Ok(())
}

/// Hash password with Argon2id and a fresh salt
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| AuthError::HashingFailed)?
        .to_string())
}

/// Verify password against a stored hash.
///
/// A missing hash, an unparseable hash and a wrong password all fail the
/// same way, and in about the same time, so callers can't tell OAuth-only
/// accounts apart.
pub fn verify_password(password: &str, stored: Option<&str>) -> AuthResult<()> {
    let Some(parsed_hash) = stored.and_then(|stored| PasswordHash::new(stored).ok()) else {
        burn_hash(password);
        return Err(AuthError::InvalidCredentials);
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Spend one hash worth of time on a login that has nothing to verify
pub fn burn_hash(password: &str) {
    let _ = hash_password(password);
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an already-normalised email address
pub fn validate_email(email: &str) -> AuthResult<()> {
    let valid = EMAIL_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(email));

    if valid { Ok(()) } else { Err(AuthError::InvalidEmail) }
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Validate username format for local registration
pub fn validate_username(username: &str) -> AuthResult<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(AuthError::InvalidUsername(format!(
            "Username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters"
        )));
    }

    if !username.chars().all(is_username_char) {
        return Err(AuthError::InvalidUsername(
            "Username can only contain letters, numbers, '_', '-' and '.'".to_string(),
        ));
    }

    Ok(())
}

/// Turn a provider display name into a username base.
///
/// Whitespace becomes `_`, anything outside the username alphabet is dropped
/// and the result is cut so an allocator suffix still fits in
/// [`MAX_USERNAME_LEN`].
/// Returns `None` when nothing usable is left.
pub fn sanitize_username_hint(hint: &str) -> Option<String> {
    let cleaned: String = hint
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if is_username_char(c) {
                Some(c)
            } else {
                None
            }
        })
        .take(MAX_USERNAME_LEN - SUFFIX_LEN)
        .collect();

    (cleaned.chars().count() >= MIN_USERNAME_LEN).then_some(cleaned)
}
