//! Group membership rows
//!
//! Every query reads the active flag directly, so a membership written a
//! moment ago is visible to the very next check.

use super::Repository;
use crate::database::models::*;
use crate::database::sequence::{self, Scope};
use crate::error::{AppError, Result};
use chrono::Utc;

impl Repository {
    /// True if the user holds an active membership in the group
    pub async fn is_member(&self, user_id: i64, group_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT group_membership_id FROM group_memberships
            WHERE user_profile_id = ? AND group_profile_id = ? AND is_active = 1
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Active members of a group, ascending by user id
    pub async fn members_of(&self, group_id: i64, excluding: &[i64]) -> Result<Vec<i64>> {
        let members: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT user_profile_id FROM group_memberships
            WHERE group_profile_id = ? AND is_active = 1
            ORDER BY user_profile_id ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members
            .into_iter()
            .filter(|id| !excluding.contains(id))
            .collect())
    }

    /// Add (or reactivate) a membership, appending the group to the user's list
    pub async fn activate_membership(&self, user_id: i64, group_id: i64) -> Result<GroupMembership> {
        let mut tx = self.begin_write().await?;

        let position = sequence::next_sequence(&mut tx, Scope::UserGroups(user_id)).await?;

        let membership = sqlx::query_as::<_, GroupMembership>(
            r#"
            INSERT INTO group_memberships
                (user_profile_id, group_profile_id, is_active, group_display_sequence, created_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(user_profile_id, group_profile_id) DO UPDATE
                SET is_active = 1, group_display_sequence = excluded.group_display_sequence
                WHERE group_memberships.is_active = 0
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .bind(position)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!("User {} is already a member of group {}", user_id, group_id))
        })?;

        tx.commit().await?;

        tracing::debug!("User {} joined group {}", user_id, group_id);
        Ok(membership)
    }

    /// Deactivate a membership and close the gap it leaves in the user's list
    pub async fn deactivate_membership(&self, user_id: i64, group_id: i64) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let rows = sqlx::query(
            r#"
            UPDATE group_memberships SET is_active = 0
            WHERE user_profile_id = ? AND group_profile_id = ? AND is_active = 1
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of group {}",
                user_id, group_id
            )));
        }

        sequence::resequence(&mut tx, Scope::UserGroups(user_id)).await?;
        tx.commit().await?;

        tracing::debug!("User {} left group {}", user_id, group_id);
        Ok(())
    }

    /// Groups the user actively belongs to, in display order
    pub async fn list_user_groups(&self, user_id: i64) -> Result<Vec<MemberGroup>> {
        let groups = sqlx::query_as::<_, MemberGroup>(
            r#"
            SELECT g.*, gm.group_display_sequence
            FROM group_memberships gm
            JOIN group_profiles g ON g.group_profile_id = gm.group_profile_id
            WHERE gm.user_profile_id = ? AND gm.is_active = 1
            ORDER BY gm.group_display_sequence, gm.group_profile_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }
}
