//! Prayer and access-grant routes

use super::{parse_body, respond, ApiResponse, UNAUTHORIZED};
use crate::app::AppState;
use crate::database::{CreatePrayerRequest, Grantee, PrayerUpdate};
use crate::error::AppError;
use crate::services::{AccessRemoval, Caller};
use serde_json::{json, Value};

/// POST /users/{id}/prayers
pub async fn create_prayer(state: &AppState, caller: Caller, user_id: i64, body: Value) -> ApiResponse {
    let result = async {
        let req: CreatePrayerRequest = parse_body(body)?;
        let prayer = state.prayers.create_prayer(caller, user_id, req).await?;
        Ok::<_, AppError>(ApiResponse::created(json!({ "prayer": prayer })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// GET /prayers/{id}
pub async fn get_prayer(state: &AppState, caller: Caller, prayer_id: i64) -> ApiResponse {
    let result = async {
        let view = state.prayers.get_prayer(caller, prayer_id).await?;
        Ok::<_, AppError>(ApiResponse::ok(json!({ "prayer": view })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// PATCH /prayers/{id}
pub async fn update_prayer(state: &AppState, caller: Caller, prayer_id: i64, body: Value) -> ApiResponse {
    let result = async {
        let patch: PrayerUpdate = parse_body(body)?;
        state.prayers.update_prayer(caller, prayer_id, patch).await?;
        Ok::<_, AppError>(ApiResponse::message("Prayer updated successfully"))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// DELETE /prayers/{id}
pub async fn delete_prayer(state: &AppState, caller: Caller, prayer_id: i64) -> ApiResponse {
    let result = async {
        state.prayers.delete_prayer(caller, prayer_id).await?;
        Ok::<_, AppError>(ApiResponse::message("Prayer deleted successfully"))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// POST /prayers/{id}/access
pub async fn add_prayer_access(state: &AppState, caller: Caller, prayer_id: i64, body: Value) -> ApiResponse {
    let result = async {
        let grantee: Grantee = parse_body(body)?;
        let access = state.prayers.add_access(caller, prayer_id, grantee).await?;
        Ok::<_, AppError>(ApiResponse::created(json!({
            "message": "Access granted successfully",
            "prayerAccessId": access.prayer_access_id,
        })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// DELETE /prayers/{id}/access/{accessId}
pub async fn remove_prayer_access(
    state: &AppState,
    caller: Caller,
    prayer_id: i64,
    access_id: i64,
) -> ApiResponse {
    let result = async {
        let outcome = state.prayers.remove_access(caller, prayer_id, access_id).await?;
        let message = match outcome {
            AccessRemoval::GrantRemoved => "Access removed successfully",
            AccessRemoval::PrayerDeleted { .. } => "Prayer and all access removed successfully",
        };
        Ok::<_, AppError>(ApiResponse::message(message))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// GET /users/{id}/prayers
pub async fn list_user_prayers(state: &AppState, caller: Caller, user_id: i64) -> ApiResponse {
    list_prayers(state, caller, Grantee::User(user_id)).await
}

/// GET /groups/{id}/prayers
pub async fn list_group_prayers(state: &AppState, caller: Caller, group_id: i64) -> ApiResponse {
    list_prayers(state, caller, Grantee::Group(group_id)).await
}

async fn list_prayers(state: &AppState, caller: Caller, grantee: Grantee) -> ApiResponse {
    let result = async {
        let prayers = state.prayers.list_prayers(caller, grantee).await?;
        Ok::<_, AppError>(ApiResponse::ok(json!({ "prayers": prayers })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}
