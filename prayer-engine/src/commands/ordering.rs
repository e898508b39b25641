//! Bulk reorder routes
//!
//! Each takes `{"items": [{"id", "displaySequence"}, ...]}` covering the
//! whole list.

use super::{parse_body, respond, ApiResponse, UNAUTHORIZED};
use crate::app::AppState;
use crate::database::sequence::Scope;
use crate::database::{Grantee, ReorderRequest};
use crate::error::AppError;
use crate::services::Caller;
use serde_json::Value;

/// PATCH /groups/{id}/prayers/reorder
pub async fn reorder_group_prayers(state: &AppState, caller: Caller, group_id: i64, body: Value) -> ApiResponse {
    reorder(state, caller, Scope::GranteePrayers(Grantee::Group(group_id)), body).await
}

/// PATCH /users/{id}/prayers/reorder
pub async fn reorder_user_prayers(state: &AppState, caller: Caller, user_id: i64, body: Value) -> ApiResponse {
    reorder(state, caller, Scope::GranteePrayers(Grantee::User(user_id)), body).await
}

/// PATCH /users/{id}/prayer-subjects/reorder
pub async fn reorder_user_subjects(state: &AppState, caller: Caller, user_id: i64, body: Value) -> ApiResponse {
    reorder(state, caller, Scope::UserSubjects(user_id), body).await
}

async fn reorder(state: &AppState, caller: Caller, scope: Scope, body: Value) -> ApiResponse {
    let result = async {
        let req: ReorderRequest = parse_body(body)?;
        state.ordering.reorder(caller, scope, &req.items).await?;
        Ok::<_, AppError>(ApiResponse::message("Order updated successfully"))
    }
    .await;

    respond(result, UNAUTHORIZED)
}
