//! Prayer rows: creation, merge-patch updates and soft deletion

use super::Repository;
use crate::config::DEFAULT_PRAYER_TYPE;
use crate::database::models::*;
use crate::database::sequence::{self, Scope};
use crate::error::{AppError, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

impl Repository {
    /// Create a prayer together with its owner's personal grant
    pub async fn create_prayer(&self, owner_id: i64, req: &CreatePrayerRequest) -> Result<Prayer> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let subject_position = match req.prayer_subject_id {
            Some(subject_id) => {
                Some(sequence::next_sequence(&mut tx, Scope::SubjectPrayers(subject_id)).await?)
            }
            None => None,
        };

        let prayer = sqlx::query_as::<_, Prayer>(
            r#"
            INSERT INTO prayers (
                prayer_title, prayer_description, prayer_type, is_private, is_answered,
                prayer_priority, prayer_subject_id, subject_display_sequence,
                created_by, created_at, updated_by, updated_at, deleted
            )
            VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, 0)
            RETURNING *
            "#,
        )
        .bind(req.prayer_title.trim())
        .bind(&req.prayer_description)
        .bind(req.prayer_type.as_deref().unwrap_or(DEFAULT_PRAYER_TYPE))
        .bind(req.is_private.unwrap_or(false))
        .bind(req.prayer_priority.unwrap_or(0))
        .bind(req.prayer_subject_id)
        .bind(subject_position)
        .bind(owner_id)
        .bind(now)
        .bind(owner_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let owner = Grantee::User(owner_id);
        let position = sequence::next_sequence(&mut tx, Scope::GranteePrayers(owner)).await?;

        sqlx::query(
            r#"
            INSERT INTO prayer_access
                (prayer_id, access_type, access_type_id, display_sequence, created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(prayer.prayer_id)
        .bind(owner.kind())
        .bind(owner.id())
        .bind(position)
        .bind(owner_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Created prayer: {} for user {}", prayer.prayer_id, owner_id);
        Ok(prayer)
    }

    /// Get a live (non-deleted) prayer by ID
    pub async fn get_prayer(&self, id: i64) -> Result<Prayer> {
        sqlx::query_as::<_, Prayer>("SELECT * FROM prayers WHERE prayer_id = ? AND deleted = 0")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prayer {} not found", id)))
    }

    /// Get a prayer regardless of its deleted flag
    pub async fn get_prayer_including_deleted(&self, id: i64) -> Result<Option<Prayer>> {
        let prayer = sqlx::query_as::<_, Prayer>("SELECT * FROM prayers WHERE prayer_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(prayer)
    }

    /// Apply a merge-patch. Fields left as `None` keep their stored value.
    ///
    /// Moving a prayer to another subject appends it to the new subject's
    /// list and closes the gap in the old one.
    pub async fn update_prayer(
        &self,
        prayer: &Prayer,
        patch: &PrayerUpdate,
        updated_by: i64,
    ) -> Result<Prayer> {
        let mut tx = self.begin_write().await?;

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE prayers SET updated_at = ");
        query.push_bind(Utc::now());
        query.push(", updated_by = ").push_bind(updated_by);

        if let Some(title) = &patch.prayer_title {
            query.push(", prayer_title = ").push_bind(title.trim().to_string());
        }
        if let Some(description) = &patch.prayer_description {
            query.push(", prayer_description = ").push_bind(description.clone());
        }
        if let Some(prayer_type) = &patch.prayer_type {
            query.push(", prayer_type = ").push_bind(prayer_type.clone());
        }
        if let Some(is_private) = patch.is_private {
            query.push(", is_private = ").push_bind(is_private);
        }
        if let Some(is_answered) = patch.is_answered {
            query.push(", is_answered = ").push_bind(is_answered);
        }
        if let Some(answered_at) = patch.answered_at {
            query.push(", answered_at = ").push_bind(answered_at);
        }
        if let Some(priority) = patch.prayer_priority {
            query.push(", prayer_priority = ").push_bind(priority);
        }

        let moved_from = match patch.prayer_subject_id {
            Some(target) if target != prayer.prayer_subject_id => {
                let position = match target {
                    Some(subject_id) => Some(
                        sequence::next_sequence(&mut tx, Scope::SubjectPrayers(subject_id)).await?,
                    ),
                    None => None,
                };
                query.push(", prayer_subject_id = ").push_bind(target);
                query.push(", subject_display_sequence = ").push_bind(position);
                prayer.prayer_subject_id
            }
            _ => None,
        };

        query
            .push(" WHERE prayer_id = ")
            .push_bind(prayer.prayer_id)
            .push(" AND deleted = 0");

        let rows = query.build().execute(&mut *tx).await?.rows_affected();
        if rows == 0 {
            return Err(AppError::NotFound(format!("Prayer {} not found", prayer.prayer_id)));
        }

        if let Some(old_subject) = moved_from {
            sequence::resequence(&mut tx, Scope::SubjectPrayers(old_subject)).await?;
        }

        let updated = sqlx::query_as::<_, Prayer>("SELECT * FROM prayers WHERE prayer_id = ?")
            .bind(prayer.prayer_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!("Updated prayer: {}", prayer.prayer_id);
        Ok(updated)
    }

    /// Soft delete a prayer that no longer has any grants.
    ///
    /// The grant check and the flag flip are one statement, so a grant
    /// added concurrently cannot slip past the check.
    pub async fn soft_delete_prayer(&self, prayer: &Prayer, deleted_by: i64) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let rows = sqlx::query(
            r#"
            UPDATE prayers SET deleted = 1, updated_at = ?2, updated_by = ?3
            WHERE prayer_id = ?1 AND deleted = 0
              AND NOT EXISTS (SELECT 1 FROM prayer_access WHERE prayer_id = ?1)
            "#,
        )
        .bind(prayer.prayer_id)
        .bind(Utc::now())
        .bind(deleted_by)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            let remaining: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM prayer_access WHERE prayer_id = ?")
                    .bind(prayer.prayer_id)
                    .fetch_one(&mut *tx)
                    .await?;

            return Err(if remaining > 0 {
                AppError::Conflict(format!(
                    "Prayer {} still has {} access grant(s); remove them first",
                    prayer.prayer_id, remaining
                ))
            } else {
                AppError::NotFound(format!("Prayer {} not found", prayer.prayer_id))
            });
        }

        if let Some(subject_id) = prayer.prayer_subject_id {
            sequence::resequence(&mut tx, Scope::SubjectPrayers(subject_id)).await?;
        }

        tx.commit().await?;

        tracing::debug!("Soft deleted prayer: {}", prayer.prayer_id);
        Ok(())
    }

    /// Remove every grant on a prayer and soft delete it, as one unit of work.
    ///
    /// The soft delete is conditional on the prayer still being live. If it
    /// touches no rows (a concurrent cascade won the race) the transaction
    /// rolls back and the grants are kept. Returns the number of grants removed.
    pub async fn cascade_delete_prayer(&self, prayer: &Prayer, deleted_by: i64) -> Result<u64> {
        let mut tx = self.begin_write().await?;

        let grants = sqlx::query_as::<_, PrayerAccess>(
            "SELECT * FROM prayer_access WHERE prayer_id = ?",
        )
        .bind(prayer.prayer_id)
        .fetch_all(&mut *tx)
        .await?;

        let removed = sqlx::query("DELETE FROM prayer_access WHERE prayer_id = ?")
            .bind(prayer.prayer_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let rows = sqlx::query(
            r#"
            UPDATE prayers SET deleted = 1, updated_at = ?, updated_by = ?
            WHERE prayer_id = ? AND deleted = 0
            "#,
        )
        .bind(Utc::now())
        .bind(deleted_by)
        .bind(prayer.prayer_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::Internal(format!(
                "soft delete of prayer {} affected no rows after removing {} grants",
                prayer.prayer_id, removed
            )));
        }

        for grant in &grants {
            sequence::resequence(&mut tx, Scope::GranteePrayers(grant.grantee)).await?;
        }
        if let Some(subject_id) = prayer.prayer_subject_id {
            sequence::resequence(&mut tx, Scope::SubjectPrayers(subject_id)).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Cascade deleted prayer {} ({} grants removed)",
            prayer.prayer_id,
            removed
        );
        Ok(removed)
    }

    /// Live prayers granted to a user or group, in that grantee's order
    pub async fn list_granted_prayers(&self, grantee: Grantee) -> Result<Vec<GrantedPrayer>> {
        let prayers = sqlx::query_as::<_, GrantedPrayer>(
            r#"
            SELECT p.*, pa.prayer_access_id, pa.display_sequence
            FROM prayer_access pa
            JOIN prayers p ON p.prayer_id = pa.prayer_id
            WHERE pa.access_type = ? AND pa.access_type_id = ? AND p.deleted = 0
            ORDER BY pa.display_sequence, pa.prayer_id
            "#,
        )
        .bind(grantee.kind())
        .bind(grantee.id())
        .fetch_all(&self.pool)
        .await?;

        Ok(prayers)
    }

    /// Live prayers attached to a subject, in the subject's order
    pub async fn list_subject_prayers(&self, subject_id: i64) -> Result<Vec<Prayer>> {
        let prayers = sqlx::query_as::<_, Prayer>(
            r#"
            SELECT * FROM prayers
            WHERE prayer_subject_id = ? AND deleted = 0
            ORDER BY subject_display_sequence IS NULL, subject_display_sequence, prayer_id
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(prayers)
    }
}
