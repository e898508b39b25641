//! Prayer subject routes

use super::{parse_body, respond, ApiResponse, UNAUTHORIZED};
use crate::app::AppState;
use crate::database::{AddMemberRequest, CreateSubjectRequest, SubjectUpdate};
use crate::error::AppError;
use crate::services::Caller;
use serde_json::{json, Value};

/// GET /users/{id}/prayer-subjects
pub async fn list_user_subjects(state: &AppState, caller: Caller, user_id: i64) -> ApiResponse {
    let result = async {
        let subjects = state.subjects.list_subjects(caller, user_id).await?;
        Ok::<_, AppError>(ApiResponse::ok(json!({ "prayerSubjects": subjects })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// POST /users/{id}/prayer-subjects
pub async fn create_subject(state: &AppState, caller: Caller, user_id: i64, body: Value) -> ApiResponse {
    let result = async {
        let req: CreateSubjectRequest = parse_body(body)?;
        let subject = state.subjects.create_subject(caller, user_id, req).await?;
        Ok::<_, AppError>(ApiResponse::created(json!({ "prayerSubject": subject })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// PATCH /prayer-subjects/{id}
pub async fn update_subject(state: &AppState, caller: Caller, subject_id: i64, body: Value) -> ApiResponse {
    let result = async {
        let update: SubjectUpdate = parse_body(body)?;
        let subject = state.subjects.update_subject(caller, subject_id, update).await?;
        Ok::<_, AppError>(ApiResponse::ok(json!({ "prayerSubject": subject })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// DELETE /prayer-subjects/{id}
pub async fn delete_subject(state: &AppState, caller: Caller, subject_id: i64) -> ApiResponse {
    let result = async {
        state.subjects.delete_subject(caller, subject_id).await?;
        Ok::<_, AppError>(ApiResponse::message("Prayer subject deleted successfully"))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// POST /prayer-subjects/{id}/members
pub async fn add_subject_member(state: &AppState, caller: Caller, subject_id: i64, body: Value) -> ApiResponse {
    let result = async {
        let req: AddMemberRequest = parse_body(body)?;
        let membership = state
            .subjects
            .add_member(caller, subject_id, req.member_prayer_subject_id, req.membership_role)
            .await?;
        Ok::<_, AppError>(ApiResponse::created(json!({ "prayerSubjectMembership": membership })))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// DELETE /prayer-subjects/{id}/members/{memberId}
pub async fn remove_subject_member(
    state: &AppState,
    caller: Caller,
    subject_id: i64,
    member_id: i64,
) -> ApiResponse {
    let result = async {
        state.subjects.remove_member(caller, subject_id, member_id).await?;
        Ok::<_, AppError>(ApiResponse::message("Member removed successfully"))
    }
    .await;

    respond(result, UNAUTHORIZED)
}

/// DELETE /prayer-subjects/{id}/link
pub async fn unlink_subject(state: &AppState, caller: Caller, subject_id: i64) -> ApiResponse {
    let result = async {
        state.subjects.unlink(caller, subject_id).await?;
        Ok::<_, AppError>(ApiResponse::message("Prayer subject unlinked successfully"))
    }
    .await;

    respond(result, UNAUTHORIZED)
}
