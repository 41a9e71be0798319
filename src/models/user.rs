use chrono::{DateTime, SubsecRound, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const EMAIL_MAX_CHARS: usize = 255;
pub const NAME_MAX_CHARS: usize = 100;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
}

/// A registered account. The password hash never leaves the persistence
/// boundary: it is skipped during serialization.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Validates and builds a fresh account with a random UUID.
    /// Emails are stored trimmed and lowercased, which makes uniqueness case-insensitive.
    pub fn new(email: &str, name: &str, password_hash: String) -> Result<Self, AppError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_name(name)?;
        if password_hash.is_empty() {
            return Err(AppError::validation("Password hash is required"));
        }

        let now = Utc::now().trunc_subsecs(6);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            email,
            name: name.to_string(),
            password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }
    if email.chars().count() > EMAIL_MAX_CHARS {
        return Err(AppError::validation("Email cannot exceed 255 characters"));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(AppError::validation("Invalid email format"));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Name cannot be empty"));
    }
    if name.chars().count() > NAME_MAX_CHARS {
        return Err(AppError::validation("Name cannot exceed 100 characters"));
    }
    Ok(())
}
