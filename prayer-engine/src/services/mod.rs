//! Services module
//!
//! Business logic services that coordinate between commands and repository.
//! Each service authorizes the caller, validates input before the first
//! write, and hands the mutation to the repository.

pub mod access;
pub mod categories;
pub mod connections;
pub mod membership;
pub mod notifications;
pub mod ordering;
pub mod prayers;
pub mod subjects;

pub use access::AccessResolver;
pub use categories::CategoriesService;
pub use connections::{ConnectionsService, RequestDirection};
pub use membership::MembershipService;
pub use notifications::{Notification, NotificationKind, NotificationSink, Notifier};
pub use ordering::OrderingService;
pub use prayers::{AccessRemoval, PrayersService};
pub use subjects::SubjectsService;

use crate::error::{AppError, Result};

/// The authenticated identity a request runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    /// True if the caller is `user_id` or an admin
    pub fn acts_as(&self, user_id: i64) -> bool {
        self.is_admin || self.user_id == user_id
    }
}

/// Trim a required text field and check its length
pub(crate) fn require_text(value: &str, field: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }

    if trimmed.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "{} cannot exceed {} characters",
            field, max_len
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acts_as() {
        assert!(Caller::user(3).acts_as(3));
        assert!(!Caller::user(3).acts_as(4));
        assert!(Caller::admin(3).acts_as(4));
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("  Mom ", "Name", 10).unwrap(), "Mom");
        assert!(matches!(require_text("   ", "Name", 10), Err(AppError::Validation(_))));
        assert!(matches!(
            require_text("abcdefghijk", "Name", 10),
            Err(AppError::Validation(_))
        ));
    }
}
