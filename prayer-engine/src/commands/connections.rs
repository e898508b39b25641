//! Connection request routes
//!
//! These answer 403 rather than 401 when the caller is not entitled.

use super::{parse_body, respond, ApiResponse, FORBIDDEN};
use crate::app::AppState;
use crate::database::{RespondConnectionRequest, SendConnectionRequest};
use crate::error::AppError;
use crate::services::{Caller, RequestDirection};
use serde_json::{json, Value};

/// POST /connection-requests
pub async fn send_connection_request(state: &AppState, caller: Caller, body: Value) -> ApiResponse {
    let result = async {
        let req: SendConnectionRequest = parse_body(body)?;
        let request = state.connections.send_request(caller, req).await?;
        Ok::<_, AppError>(ApiResponse::created(json!({
            "requestId": request.connection_request_id,
        })))
    }
    .await;

    respond(result, FORBIDDEN)
}

/// PATCH /connection-requests/{id}
pub async fn respond_connection_request(
    state: &AppState,
    caller: Caller,
    request_id: i64,
    body: Value,
) -> ApiResponse {
    let result = async {
        let req: RespondConnectionRequest = parse_body(body)?;
        let resolved = state.connections.respond(caller, request_id, &req.status).await?;
        Ok::<_, AppError>(ApiResponse::ok(json!({ "status": resolved.status })))
    }
    .await;

    respond(result, FORBIDDEN)
}

/// GET /connection-requests
pub async fn list_connection_requests(state: &AppState, caller: Caller) -> ApiResponse {
    let result = async {
        let incoming = state
            .connections
            .list_requests(caller, RequestDirection::Incoming)
            .await?;
        let outgoing = state
            .connections
            .list_requests(caller, RequestDirection::Outgoing)
            .await?;
        Ok::<_, AppError>(ApiResponse::ok(json!({
            "incoming": incoming,
            "outgoing": outgoing,
        })))
    }
    .await;

    respond(result, FORBIDDEN)
}
