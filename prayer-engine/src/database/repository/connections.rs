//! Connection requests: asking another account to be linked to a subject

use super::Repository;
use crate::database::models::*;
use crate::error::{AppError, Result};
use chrono::Utc;

impl Repository {
    pub async fn get_connection_request(&self, id: i64) -> Result<ConnectionRequest> {
        sqlx::query_as::<_, ConnectionRequest>(
            "SELECT * FROM connection_requests WHERE connection_request_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection request {} not found", id)))
    }

    pub async fn has_pending_request(
        &self,
        requester_id: i64,
        target_id: i64,
        subject_id: i64,
    ) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT connection_request_id FROM connection_requests
            WHERE requester_user_profile_id = ? AND target_user_profile_id = ?
              AND prayer_subject_id = ? AND status = 'pending'
            "#,
        )
        .bind(requester_id)
        .bind(target_id)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Record a pending request and pre-link the subject to the target.
    ///
    /// The request row is written first. If the subject turns out to have
    /// been linked in the meantime the whole unit of work is rolled back.
    pub async fn create_connection_request(
        &self,
        requester_id: i64,
        target_id: i64,
        subject_id: i64,
        message: Option<&str>,
    ) -> Result<ConnectionRequest> {
        let mut tx = self.begin_write().await?;

        let request = sqlx::query_as::<_, ConnectionRequest>(
            r#"
            INSERT INTO connection_requests (
                requester_user_profile_id, target_user_profile_id, prayer_subject_id,
                status, message, created_at
            )
            VALUES (?, ?, ?, 'pending', ?, ?)
            RETURNING *
            "#,
        )
        .bind(requester_id)
        .bind(target_id)
        .bind(subject_id)
        .bind(message)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(
                e,
                "A connection request for this subject and user is already pending",
            )
        })?;

        let rows = sqlx::query(
            r#"
            UPDATE prayer_subjects SET user_profile_id = ?, link_status = 'pending', updated_at = ?
            WHERE prayer_subject_id = ? AND link_status <> 'linked'
            "#,
        )
        .bind(target_id)
        .bind(Utc::now())
        .bind(subject_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::Conflict(format!(
                "Prayer subject {} is already linked",
                subject_id
            )));
        }

        tx.commit().await?;

        tracing::debug!(
            "Created connection request {} from {} to {} for subject {}",
            request.connection_request_id,
            requester_id,
            target_id,
            subject_id
        );
        Ok(request)
    }

    /// Move a pending request to a terminal status and apply its outcome to
    /// the subject, as one unit of work.
    ///
    /// Accepting links the subject and declines every other request still
    /// pending for it. Declining only clears the subject while its pre-link
    /// still points at this request's target.
    pub async fn resolve_connection_request(
        &self,
        request: &ConnectionRequest,
        status: ConnectionStatus,
    ) -> Result<ConnectionRequest> {
        if status == ConnectionStatus::Pending {
            return Err(AppError::Validation(
                "A connection request can only be accepted or declined".to_string(),
            ));
        }

        let mut tx = self.begin_write().await?;
        let now = Utc::now();

        let resolved = sqlx::query_as::<_, ConnectionRequest>(
            r#"
            UPDATE connection_requests SET status = ?, responded_at = ?
            WHERE connection_request_id = ? AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(request.connection_request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Connection request {} is no longer pending",
                request.connection_request_id
            ))
        })?;

        if status == ConnectionStatus::Accepted {
            let rows = sqlx::query(
                r#"
                UPDATE prayer_subjects SET user_profile_id = ?, link_status = 'linked', updated_at = ?
                WHERE prayer_subject_id = ? AND link_status <> 'linked'
                "#,
            )
            .bind(request.target_user_profile_id)
            .bind(now)
            .bind(request.prayer_subject_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows == 0 {
                return Err(AppError::Conflict(format!(
                    "Prayer subject {} is already linked",
                    request.prayer_subject_id
                )));
            }

            let superseded = sqlx::query(
                r#"
                UPDATE connection_requests SET status = 'declined', responded_at = ?
                WHERE prayer_subject_id = ? AND status = 'pending'
                "#,
            )
            .bind(now)
            .bind(request.prayer_subject_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if superseded > 0 {
                tracing::debug!(
                    "Declined {} competing request(s) for subject {}",
                    superseded,
                    request.prayer_subject_id
                );
            }
        } else {
            sqlx::query(
                r#"
                UPDATE prayer_subjects SET user_profile_id = NULL, link_status = 'declined', updated_at = ?
                WHERE prayer_subject_id = ? AND link_status = 'pending' AND user_profile_id = ?
                "#,
            )
            .bind(now)
            .bind(request.prayer_subject_id)
            .bind(request.target_user_profile_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Connection request {} resolved as {:?}",
            request.connection_request_id,
            status
        );
        Ok(resolved)
    }

    /// Pending requests waiting on a user's answer
    pub async fn list_incoming_requests(&self, target_id: i64) -> Result<Vec<ConnectionRequest>> {
        let requests = sqlx::query_as::<_, ConnectionRequest>(
            r#"
            SELECT * FROM connection_requests
            WHERE target_user_profile_id = ? AND status = 'pending'
            ORDER BY created_at DESC, connection_request_id DESC
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    /// Pending requests a user has sent
    pub async fn list_outgoing_requests(&self, requester_id: i64) -> Result<Vec<ConnectionRequest>> {
        let requests = sqlx::query_as::<_, ConnectionRequest>(
            r#"
            SELECT * FROM connection_requests
            WHERE requester_user_profile_id = ? AND status = 'pending'
            ORDER BY created_at DESC, connection_request_id DESC
            "#,
        )
        .bind(requester_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }
}
