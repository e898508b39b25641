//! Display-sequence scopes
//!
//! Every ordered list a user sees lives in its own `display_sequence`
//! namespace. A healthy scope holds exactly `0..n-1` over its live members.
//! This module knows how to read and write each scope, validates bulk
//! reorders, and repairs drift left behind by deletions.
//!
//! All functions take a connection so callers can run them inside the same
//! transaction as the mutation that made the scope drift.

use super::models::{Grantee, SequenceUpdate};
use crate::error::{AppError, Result};
use sqlx::{FromRow, SqliteConnection};
use std::collections::{BTreeSet, HashSet};

/// One independent ordering namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Groups a user actively belongs to
    UserGroups(i64),
    /// Live prayers granted to a user or a group
    GranteePrayers(Grantee),
    /// Categories owned by a user or a group
    Categories(Grantee),
    /// Grants placed in one category
    CategoryItems(i64),
    /// Live prayers attached to one subject
    SubjectPrayers(i64),
    /// Subjects created by one user
    UserSubjects(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct SequencedMember {
    pub member_id: i64,
    pub display_sequence: i64,
}

enum Key {
    Int(i64),
    Text(&'static str),
}

struct ScopeSql {
    /// Yields `(member_id, display_sequence)` ordered by sequence then id
    select: &'static str,
    /// Binds: new sequence, scope keys, member id
    update: &'static str,
    keys: Vec<Key>,
}

impl Scope {
    fn sql(&self) -> ScopeSql {
        match *self {
            Scope::UserGroups(user_id) => ScopeSql {
                select: "SELECT group_profile_id AS member_id, group_display_sequence AS display_sequence \
                         FROM group_memberships \
                         WHERE user_profile_id = ? AND is_active = 1 \
                         ORDER BY group_display_sequence, group_profile_id",
                update: "UPDATE group_memberships SET group_display_sequence = ? \
                         WHERE user_profile_id = ? AND group_profile_id = ?",
                keys: vec![Key::Int(user_id)],
            },
            Scope::GranteePrayers(grantee) => ScopeSql {
                select: "SELECT pa.prayer_id AS member_id, pa.display_sequence \
                         FROM prayer_access pa \
                         JOIN prayers p ON p.prayer_id = pa.prayer_id \
                         WHERE pa.access_type = ? AND pa.access_type_id = ? AND p.deleted = 0 \
                         ORDER BY pa.display_sequence, pa.prayer_id",
                update: "UPDATE prayer_access SET display_sequence = ? \
                         WHERE access_type = ? AND access_type_id = ? AND prayer_id = ?",
                keys: vec![Key::Text(grantee.kind()), Key::Int(grantee.id())],
            },
            Scope::Categories(owner) => ScopeSql {
                select: "SELECT prayer_category_id AS member_id, display_sequence \
                         FROM prayer_categories \
                         WHERE category_type = ? AND category_type_id = ? \
                         ORDER BY display_sequence, prayer_category_id",
                update: "UPDATE prayer_categories SET display_sequence = ? \
                         WHERE category_type = ? AND category_type_id = ? AND prayer_category_id = ?",
                keys: vec![Key::Text(owner.kind()), Key::Int(owner.id())],
            },
            Scope::CategoryItems(category_id) => ScopeSql {
                select: "SELECT prayer_access_id AS member_id, display_sequence \
                         FROM prayer_category_items \
                         WHERE prayer_category_id = ? \
                         ORDER BY display_sequence, prayer_access_id",
                update: "UPDATE prayer_category_items SET display_sequence = ? \
                         WHERE prayer_category_id = ? AND prayer_access_id = ?",
                keys: vec![Key::Int(category_id)],
            },
            // Unsequenced legacy rows surface as -1 and sort last
            Scope::SubjectPrayers(subject_id) => ScopeSql {
                select: "SELECT prayer_id AS member_id, \
                         COALESCE(subject_display_sequence, -1) AS display_sequence \
                         FROM prayers \
                         WHERE prayer_subject_id = ? AND deleted = 0 \
                         ORDER BY subject_display_sequence IS NULL, subject_display_sequence, prayer_id",
                update: "UPDATE prayers SET subject_display_sequence = ? \
                         WHERE prayer_subject_id = ? AND prayer_id = ?",
                keys: vec![Key::Int(subject_id)],
            },
            Scope::UserSubjects(user_id) => ScopeSql {
                select: "SELECT prayer_subject_id AS member_id, display_sequence \
                         FROM prayer_subjects \
                         WHERE created_by = ? \
                         ORDER BY display_sequence, prayer_subject_id",
                update: "UPDATE prayer_subjects SET display_sequence = ? \
                         WHERE created_by = ? AND prayer_subject_id = ?",
                keys: vec![Key::Int(user_id)],
            },
        }
    }
}

/// Current live members of a scope, in display order
pub async fn load_members(conn: &mut SqliteConnection, scope: Scope) -> Result<Vec<SequencedMember>> {
    let sql = scope.sql();

    let mut query = sqlx::query_as::<_, SequencedMember>(sql.select);
    for key in &sql.keys {
        query = match key {
            Key::Int(v) => query.bind(*v),
            Key::Text(v) => query.bind(*v),
        };
    }

    Ok(query.fetch_all(&mut *conn).await?)
}

/// Sequence for a member appended to the end of the scope
pub async fn next_sequence(conn: &mut SqliteConnection, scope: Scope) -> Result<i64> {
    let members = load_members(conn, scope).await?;
    Ok(append_position(&members))
}

/// `max + 1`, treating an empty scope as `-1`
pub fn append_position(members: &[SequencedMember]) -> i64 {
    members
        .iter()
        .map(|m| m.display_sequence)
        .max()
        .map_or(0, |max| max + 1)
}

async fn write_sequence(
    conn: &mut SqliteConnection,
    scope: Scope,
    member_id: i64,
    display_sequence: i64,
) -> Result<u64> {
    let sql = scope.sql();

    let mut query = sqlx::query(sql.update).bind(display_sequence);
    for key in &sql.keys {
        query = match key {
            Key::Int(v) => query.bind(*v),
            Key::Text(v) => query.bind(*v),
        };
    }

    let rows = query.bind(member_id).execute(&mut *conn).await?.rows_affected();
    Ok(rows)
}

/// Check a bulk reorder against the live members of its scope.
///
/// In order: the submitted ids must be exactly the live ids, every
/// sequence must lie in `0..count`, and no two sequences may collide.
pub fn validate_reorder(live: &[SequencedMember], submission: &[SequenceUpdate]) -> Result<()> {
    let live_ids: BTreeSet<i64> = live.iter().map(|m| m.member_id).collect();

    let mut submitted_ids = BTreeSet::new();
    let mut repeated = BTreeSet::new();
    for entry in submission {
        if !submitted_ids.insert(entry.id) {
            repeated.insert(entry.id);
        }
    }

    if !repeated.is_empty() {
        return Err(AppError::Validation(format!(
            "Duplicate ids in reorder request: {:?}",
            repeated
        )));
    }

    if submitted_ids != live_ids {
        let extra: Vec<i64> = submitted_ids.difference(&live_ids).copied().collect();
        let missing: Vec<i64> = live_ids.difference(&submitted_ids).copied().collect();
        return Err(AppError::Validation(format!(
            "Reorder must include every item exactly once: unexpected ids {:?}, missing ids {:?}",
            extra, missing
        )));
    }

    let count = live.len() as i64;
    if let Some(bad) = submission
        .iter()
        .find(|e| e.display_sequence < 0 || e.display_sequence >= count)
    {
        return Err(AppError::Validation(format!(
            "Display sequence {} for id {} is out of range 0..{}",
            bad.display_sequence, bad.id, count
        )));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = submission.iter().find(|e| !seen.insert(e.display_sequence)) {
        return Err(AppError::Validation(format!(
            "Display sequence {} is used more than once",
            dup.display_sequence
        )));
    }

    Ok(())
}

/// Validate and apply a bulk reorder. Nothing is written if validation fails.
pub async fn apply_reorder(
    conn: &mut SqliteConnection,
    scope: Scope,
    submission: &[SequenceUpdate],
) -> Result<()> {
    let live = load_members(conn, scope).await?;
    validate_reorder(&live, submission)?;

    for entry in submission {
        write_sequence(conn, scope, entry.id, entry.display_sequence).await?;
    }

    tracing::debug!("Reordered {:?}: {} items", scope, submission.len());
    Ok(())
}

/// True when the stored sequences are not exactly `0..n-1` in display order
pub fn needs_resequence(members: &[SequencedMember]) -> bool {
    members
        .iter()
        .enumerate()
        .any(|(i, m)| m.display_sequence != i as i64)
}

/// Rewrites required to make the scope contiguous, preserving relative order
pub fn resequence_plan(members: &[SequencedMember]) -> Vec<SequenceUpdate> {
    members
        .iter()
        .enumerate()
        .filter(|(i, m)| m.display_sequence != *i as i64)
        .map(|(i, m)| SequenceUpdate {
            id: m.member_id,
            display_sequence: i as i64,
        })
        .collect()
}

/// Close gaps and break ties in a scope. Returns the number of rows rewritten.
pub async fn resequence(conn: &mut SqliteConnection, scope: Scope) -> Result<usize> {
    let members = load_members(conn, scope).await?;
    let plan = resequence_plan(&members);

    for entry in &plan {
        write_sequence(conn, scope, entry.id, entry.display_sequence).await?;
    }

    if !plan.is_empty() {
        tracing::debug!("Resequenced {:?}: {} rows rewritten", scope, plan.len());
    }

    Ok(plan.len())
}
