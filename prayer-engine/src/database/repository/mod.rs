//! Repository layer for database operations
//!
//! Reads go straight to the pool. Every mutation that touches more than one
//! row runs inside a single transaction that rolls back when dropped on an
//! error path, so a failure part-way through leaves nothing behind.
//!
//! Operations are grouped by aggregate:
//! - `access`: grants and the effective-grantee expansion
//! - `prayers`: prayer rows, merge-patch updates and the cascade delete
//! - `memberships`: group membership rows
//! - `subjects`: prayer subjects and their member edges
//! - `connections`: connection requests
//! - `categories`: categories and category items

mod access;
mod categories;
mod connections;
mod memberships;
mod prayers;
mod subjects;

pub use subjects::SubjectChanges;

use super::models::*;
use super::sequence::{self, Scope, SequencedMember};
use crate::error::{AppError, Result};
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a unit of work that takes the write lock up front.
    ///
    /// A deferred transaction that reads a scope and then writes to it fails
    /// with a stale snapshot when another writer commits first. `IMMEDIATE`
    /// makes concurrent writers queue on the busy timeout instead.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    // ===== Users =====

    /// Create a user profile
    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<UserProfile> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (username, first_name, last_name, email, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&req.username)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .bind(&req.email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::conflict_on_unique(e, format!("Username '{}' is taken", req.username)))?;

        tracing::debug!("Created user: {}", user.user_profile_id);
        Ok(user)
    }

    /// Get a user by ID
    pub async fn get_user(&self, id: i64) -> Result<UserProfile> {
        sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_profile_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn user_exists(&self, id: i64) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT user_profile_id FROM user_profiles WHERE user_profile_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    // ===== Groups =====

    /// Create a group and make its creator the first active member
    pub async fn create_group(&self, created_by: i64, req: &CreateGroupRequest) -> Result<GroupProfile> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let group = sqlx::query_as::<_, GroupProfile>(
            r#"
            INSERT INTO group_profiles (group_name, group_description, is_active, created_by, created_at)
            VALUES (?, ?, 1, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&req.group_name)
        .bind(&req.group_description)
        .bind(created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let position = sequence::next_sequence(&mut tx, Scope::UserGroups(created_by)).await?;

        sqlx::query(
            r#"
            INSERT INTO group_memberships
                (user_profile_id, group_profile_id, is_active, group_display_sequence, created_at)
            VALUES (?, ?, 1, ?, ?)
            "#,
        )
        .bind(created_by)
        .bind(group.group_profile_id)
        .bind(position)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Created group: {} by user {}", group.group_profile_id, created_by);
        Ok(group)
    }

    /// Get an active group by ID
    pub async fn get_group(&self, id: i64) -> Result<GroupProfile> {
        sqlx::query_as::<_, GroupProfile>(
            "SELECT * FROM group_profiles WHERE group_profile_id = ? AND is_active = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    // ===== Ordering =====

    /// Current members of a scope in display order
    pub async fn scope_members(&self, scope: Scope) -> Result<Vec<SequencedMember>> {
        let mut conn = self.pool.acquire().await?;
        sequence::load_members(&mut conn, scope).await
    }

    /// Validate and apply a bulk reorder as one unit of work
    pub async fn reorder_scope(&self, scope: Scope, items: &[SequenceUpdate]) -> Result<()> {
        let mut tx = self.begin_write().await?;
        sequence::apply_reorder(&mut tx, scope, items).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Repair a scope if its sequences have drifted. Returns rows rewritten.
    pub async fn repair_scope_if_needed(&self, scope: Scope) -> Result<usize> {
        let members = self.scope_members(scope).await?;
        if !sequence::needs_resequence(&members) {
            return Ok(0);
        }

        tracing::warn!("Display sequence drift detected in {:?}, repairing", scope);

        let mut tx = self.begin_write().await?;
        let rewritten = sequence::resequence(&mut tx, scope).await?;
        tx.commit().await?;

        Ok(rewritten)
    }
}
