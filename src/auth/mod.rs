pub mod extractors;
pub mod guard;
pub mod jwks;
pub mod middleware;
pub mod password;
pub mod token;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::UserProfile;

// Re-export necessary items
pub use extractors::Principal;
pub use guard::{check_owner, ensure_owner, Access};
pub use middleware::AuthMiddleware;
pub use password::{hash_password, hash_password_with_cost, verify_password};
pub use token::{Claims, IssuedToken, TokenIssuer, TokenVerifier};

pub const PASSWORD_MIN_CHARS: usize = 8;

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// User's email address.
    #[validate(email)]
    pub email: String,
    /// Not length-checked: a wrong password is a 401 like any other.
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address for the new account. Stored lowercased.
    #[validate(email, length(max = 255))]
    pub email: String,
    /// Display name, 1 to 100 characters.
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// At least 8 characters with an uppercase letter, a lowercase letter and a digit.
    #[validate(length(min = 8), custom = "validate_password_strength")]
    pub password: String,
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return weak_password("password_length", "Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return weak_password(
            "password_uppercase",
            "Password must contain at least one uppercase letter",
        );
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return weak_password(
            "password_lowercase",
            "Password must contain at least one lowercase letter",
        );
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return weak_password("password_digit", "Password must contain at least one number");
    }
    Ok(())
}

fn weak_password(code: &'static str, message: &'static str) -> Result<(), ValidationError> {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    Err(err)
}

/// Response structure after successful authentication (login or registration).
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The bearer token to send in `Authorization` headers.
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

impl AuthResponse {
    pub fn new(issued: IssuedToken, user: UserProfile) -> Self {
        Self {
            token: issued.token,
            token_type: "bearer".to_string(),
            expires_at: issued.expires_at,
            user,
        }
    }
}
