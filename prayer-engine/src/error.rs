//! Error types for the prayer engine
//!
//! All errors use thiserror for structured error handling.
//! Domain errors carry a human message; infrastructure errors are wrapped
//! transparently and never leak their text to API callers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed, missing or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated but not entitled to the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State precondition violated (duplicates, pending grants, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-checkable reason string
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Io(_)
            | AppError::Serialization(_) => "internal_error",
        }
    }

    /// Human readable details, safe to hand to a client
    pub fn details(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Internal(_)
            | AppError::Database(_)
            | AppError::Io(_)
            | AppError::Serialization(_) => "An unexpected error occurred".to_string(),
        }
    }

    /// Map a unique-index violation onto a conflict, leaving other errors alone
    pub fn conflict_on_unique(err: sqlx::Error, msg: impl Into<String>) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);

        if unique {
            AppError::Conflict(msg.into())
        } else {
            AppError::Database(err)
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut body = serializer.serialize_struct("AppError", 2)?;
        body.serialize_field("error", self.reason())?;
        body.serialize_field("details", &self.details())?;
        body.end()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
