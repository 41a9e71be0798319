//! Ownership checks shared by every owner-scoped read and mutation.

use crate::error::AppError;

/// Outcome of comparing a resource's owner with the authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authorized,
    Forbidden,
}

pub fn check_owner(resource_owner: &str, principal: &str) -> Access {
    if resource_owner == principal {
        Access::Authorized
    } else {
        Access::Forbidden
    }
}

/// Fails with [`AppError::Forbidden`] unless `principal` owns the resource.
pub fn ensure_owner(resource_owner: &str, principal: &str) -> Result<(), AppError> {
    match check_owner(resource_owner, principal) {
        Access::Authorized => Ok(()),
        Access::Forbidden => Err(AppError::Forbidden(
            "Cannot access or modify another user's tasks".into(),
        )),
    }
}
