//! Grants (`prayer_access`) and their expansion to users

use super::Repository;
use crate::database::models::*;
use crate::database::sequence::{self, Scope};
use crate::error::{AppError, Result};
use chrono::Utc;

/// Every (user, grant) pair that can see a prayer. User grants yield their
/// user, group grants yield each active member of the group.
const EFFECTIVE_GRANTS: &str = r#"
    SELECT pa.access_type_id AS effective_user_id, pa.*
    FROM prayer_access pa
    WHERE pa.prayer_id = ?1 AND pa.access_type = 'user'
    UNION ALL
    SELECT gm.user_profile_id AS effective_user_id, pa.*
    FROM prayer_access pa
    JOIN group_memberships gm
        ON gm.group_profile_id = pa.access_type_id AND gm.is_active = 1
    WHERE pa.prayer_id = ?1 AND pa.access_type = 'group'
"#;

impl Repository {
    pub async fn get_access(&self, access_id: i64) -> Result<Option<PrayerAccess>> {
        let access = sqlx::query_as::<_, PrayerAccess>(
            "SELECT * FROM prayer_access WHERE prayer_access_id = ?",
        )
        .bind(access_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(access)
    }

    pub async fn find_access(&self, prayer_id: i64, grantee: Grantee) -> Result<Option<PrayerAccess>> {
        let access = sqlx::query_as::<_, PrayerAccess>(
            r#"
            SELECT * FROM prayer_access
            WHERE prayer_id = ? AND access_type = ? AND access_type_id = ?
            "#,
        )
        .bind(prayer_id)
        .bind(grantee.kind())
        .bind(grantee.id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(access)
    }

    /// All grants on a prayer, oldest first
    pub async fn list_access(&self, prayer_id: i64) -> Result<Vec<PrayerAccess>> {
        let grants = sqlx::query_as::<_, PrayerAccess>(
            "SELECT * FROM prayer_access WHERE prayer_id = ? ORDER BY prayer_access_id",
        )
        .bind(prayer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }

    pub async fn count_access(&self, prayer_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prayer_access WHERE prayer_id = ?")
            .bind(prayer_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Expand every grant on a prayer to the users it reaches,
    /// ordered by `(effective_user_id, access_type)`
    pub async fn effective_grantees(&self, prayer_id: i64) -> Result<Vec<EffectiveGrant>> {
        let sql = format!(
            "SELECT * FROM ({}) ORDER BY effective_user_id ASC, access_type ASC, prayer_access_id ASC",
            EFFECTIVE_GRANTS
        );

        let grants = sqlx::query_as::<_, EffectiveGrant>(&sql)
            .bind(prayer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(grants)
    }

    /// The grants through which one user sees a prayer, in the same order
    pub async fn effective_grants_for_user(
        &self,
        prayer_id: i64,
        user_id: i64,
    ) -> Result<Vec<EffectiveGrant>> {
        let sql = format!(
            "SELECT * FROM ({}) WHERE effective_user_id = ?2 \
             ORDER BY access_type ASC, prayer_access_id ASC",
            EFFECTIVE_GRANTS
        );

        let grants = sqlx::query_as::<_, EffectiveGrant>(&sql)
            .bind(prayer_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(grants)
    }

    /// Insert a grant at the end of the grantee's prayer list
    pub async fn insert_access(
        &self,
        prayer_id: i64,
        grantee: Grantee,
        created_by: i64,
    ) -> Result<PrayerAccess> {
        let mut tx = self.begin_write().await?;

        let position = sequence::next_sequence(&mut tx, Scope::GranteePrayers(grantee)).await?;

        let access = sqlx::query_as::<_, PrayerAccess>(
            r#"
            INSERT INTO prayer_access
                (prayer_id, access_type, access_type_id, display_sequence, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(prayer_id)
        .bind(grantee.kind())
        .bind(grantee.id())
        .bind(position)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(
                e,
                format!("Prayer {} is already shared with {}", prayer_id, grantee),
            )
        })?;

        tx.commit().await?;

        tracing::debug!(
            "Granted prayer {} to {} (access {})",
            prayer_id,
            grantee,
            access.prayer_access_id
        );
        Ok(access)
    }

    /// Delete one grant and close the gap in its grantee's list
    pub async fn delete_access(&self, access: &PrayerAccess) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let rows = sqlx::query("DELETE FROM prayer_access WHERE prayer_access_id = ?")
            .bind(access.prayer_access_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Access {} not found",
                access.prayer_access_id
            )));
        }

        sequence::resequence(&mut tx, Scope::GranteePrayers(access.grantee)).await?;
        tx.commit().await?;

        tracing::debug!(
            "Revoked access {} on prayer {}",
            access.prayer_access_id,
            access.prayer_id
        );
        Ok(())
    }
}
