//! Route handlers
//!
//! One async handler per route, independent of any HTTP framework. All
//! handlers follow the same pattern:
//! - Take `&AppState`, the authenticated `Caller`, path ids and (where
//!   needed) the JSON body
//! - Return an `ApiResponse` with a status code and a camelCase JSON body
//! - Map errors to `{"error", "details"}` with the route's Forbidden status
//!
//! Submodules:
//! - `prayers`: prayer CRUD and access grants
//! - `ordering`: bulk reorder of prayer and subject lists
//! - `subjects`: prayer subjects, members and links
//! - `connections`: connection request workflow

pub mod connections;
pub mod ordering;
pub mod prayers;
pub mod subjects;

pub use connections::*;
pub use ordering::*;
pub use prayers::*;
pub use subjects::*;

use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// Forbidden status on prayer, access, reorder and subject routes
pub const UNAUTHORIZED: u16 = 401;

/// Forbidden status on connection request routes
pub const FORBIDDEN: u16 = 403;

/// Status code and JSON body handed back to the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn created(body: Value) -> Self {
        Self { status: 201, body }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::ok(json!({ "message": text.into() }))
    }
}

/// Map an error onto the route's status codes
pub fn error_response(err: &AppError, forbidden_status: u16) -> ApiResponse {
    let status = match err {
        AppError::Validation(_) => 400,
        AppError::NotFound(_) => 404,
        AppError::Forbidden(_) => forbidden_status,
        AppError::Conflict(_) => 409,
        AppError::Database(_)
        | AppError::Io(_)
        | AppError::Serialization(_)
        | AppError::Internal(_) => 500,
    };

    if status >= 500 {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected with {}: {}", status, err);
    }

    ApiResponse {
        status,
        body: json!({ "error": err.reason(), "details": err.details() }),
    }
}

pub(crate) fn respond(result: Result<ApiResponse>, forbidden_status: u16) -> ApiResponse {
    result.unwrap_or_else(|err| error_response(&err, forbidden_status))
}

/// Decode a request body. Anything malformed is a validation error.
pub(crate) fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Grantee;

    #[test]
    fn test_error_status_mapping() {
        let forbidden = AppError::Forbidden("nope".to_string());
        assert_eq!(error_response(&forbidden, UNAUTHORIZED).status, 401);
        assert_eq!(error_response(&forbidden, FORBIDDEN).status, 403);

        let conflict = error_response(&AppError::Conflict("dup".to_string()), UNAUTHORIZED);
        assert_eq!(conflict.status, 409);
        assert_eq!(conflict.body, json!({ "error": "conflict", "details": "dup" }));

        let internal = error_response(&AppError::Internal("zero rows on prayer 4".to_string()), FORBIDDEN);
        assert_eq!(internal.status, 500);
        assert_eq!(internal.body["details"], "An unexpected error occurred");
    }

    #[test]
    fn test_parse_body_rejects_malformed_input() {
        let parsed: Grantee = parse_body(json!({ "accessType": "group", "accessTypeId": 2 })).unwrap();
        assert_eq!(parsed, Grantee::Group(2));

        let bad: Result<Grantee> = parse_body(json!({ "accessType": "team", "accessTypeId": 2 }));
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }
}
