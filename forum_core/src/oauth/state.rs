//! Anti-CSRF `state` nonces for the authorization redirect.

use crate::auth::{AuthError, AuthResult};
use subtle::ConstantTimeEq;

/// Fresh random nonce, 32 hex characters
pub fn generate_state() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Compare the nonce from the cookie with the `state` query parameter.
///
/// Missing or empty on either side counts as a mismatch.
pub fn verify_state(expected: Option<&str>, received: Option<&str>) -> AuthResult<()> {
    match (expected, received) {
        (Some(expected), Some(received))
            if !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(received.as_bytes())) =>
        {
            Ok(())
        }
        _ => Err(AuthError::OAuthStateMismatch),
    }
}
