use crate::error::AppError;
use bcrypt::{hash, verify};
use log::warn;

/// Work factor used for stored credentials.
pub const DEFAULT_HASH_COST: u32 = 12;

/// Hashes a password with a fresh salt at [`DEFAULT_HASH_COST`].
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash_password_with_cost(password, DEFAULT_HASH_COST)
}

/// Hashes a password with an explicit bcrypt cost (4..=31).
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost)
        .map_err(|e| AppError::InternalServerError(format!("Failed to hash password: {}", e)))
}

/// Checks `password` against a stored bcrypt hash.
///
/// The digest comparison is bcrypt's own constant-time check. A malformed stored
/// hash counts as a mismatch rather than an error so callers only ever see a boolean.
pub fn verify_password(password: &str, hashed_password: &str) -> bool {
    match verify(password, hashed_password) {
        Ok(matches) => matches,
        Err(e) => {
            warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}
