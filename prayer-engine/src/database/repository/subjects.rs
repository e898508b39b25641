//! Prayer subjects and the member edges between them

use super::Repository;
use crate::database::models::*;
use crate::database::sequence::{self, Scope};
use crate::error::{AppError, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

/// Resolved changes to a subject. `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct SubjectChanges {
    pub display_name: Option<String>,
    pub subject_type: Option<SubjectType>,
    pub notes: Option<Option<String>>,
    /// New linked account and the link status that goes with it
    pub link: Option<(Option<i64>, LinkStatus)>,
}

/// Point a subject at an account (or at none) with the given status
async fn write_link(
    conn: &mut SqliteConnection,
    subject_id: i64,
    user_profile_id: Option<i64>,
    status: LinkStatus,
) -> Result<u64> {
    let rows = sqlx::query(
        r#"
        UPDATE prayer_subjects SET user_profile_id = ?, link_status = ?, updated_at = ?
        WHERE prayer_subject_id = ?
        "#,
    )
    .bind(user_profile_id)
    .bind(status)
    .bind(Utc::now())
    .bind(subject_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(rows)
}

impl Repository {
    /// Create a subject at the end of its owner's list
    pub async fn create_subject(
        &self,
        owner_id: i64,
        subject_type: SubjectType,
        display_name: &str,
        notes: Option<&str>,
        link: (Option<i64>, LinkStatus),
    ) -> Result<PrayerSubject> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let position = sequence::next_sequence(&mut tx, Scope::UserSubjects(owner_id)).await?;

        let subject = sqlx::query_as::<_, PrayerSubject>(
            r#"
            INSERT INTO prayer_subjects (
                prayer_subject_type, prayer_subject_display_name, notes, user_profile_id,
                link_status, display_sequence, created_by, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(subject_type)
        .bind(display_name)
        .bind(notes)
        .bind(link.0)
        .bind(link.1)
        .bind(position)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            "Created prayer subject: {} for user {}",
            subject.prayer_subject_id,
            owner_id
        );
        Ok(subject)
    }

    pub async fn get_subject(&self, id: i64) -> Result<PrayerSubject> {
        sqlx::query_as::<_, PrayerSubject>("SELECT * FROM prayer_subjects WHERE prayer_subject_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prayer subject {} not found", id)))
    }

    /// The subject a user created for themself, if any
    pub async fn find_self_subject(&self, user_id: i64) -> Result<Option<PrayerSubject>> {
        let subject = sqlx::query_as::<_, PrayerSubject>(
            r#"
            SELECT * FROM prayer_subjects
            WHERE created_by = ?1 AND user_profile_id = ?1
            ORDER BY prayer_subject_id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subject)
    }

    /// Subjects owned by a user, in display order
    pub async fn list_subjects(&self, owner_id: i64) -> Result<Vec<PrayerSubject>> {
        let subjects = sqlx::query_as::<_, PrayerSubject>(
            r#"
            SELECT * FROM prayer_subjects
            WHERE created_by = ?
            ORDER BY display_sequence, prayer_subject_id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subjects)
    }

    pub async fn update_subject(&self, id: i64, changes: &SubjectChanges) -> Result<PrayerSubject> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE prayer_subjects SET updated_at = ");
        query.push_bind(Utc::now());

        if let Some(name) = &changes.display_name {
            query.push(", prayer_subject_display_name = ").push_bind(name.clone());
        }
        if let Some(subject_type) = changes.subject_type {
            query.push(", prayer_subject_type = ").push_bind(subject_type);
        }
        if let Some(notes) = &changes.notes {
            query.push(", notes = ").push_bind(notes.clone());
        }
        if let Some((user_profile_id, status)) = changes.link {
            query.push(", user_profile_id = ").push_bind(user_profile_id);
            query.push(", link_status = ").push_bind(status);
        }

        query.push(" WHERE prayer_subject_id = ").push_bind(id);
        query.push(" RETURNING *");

        let subject = query
            .build_query_as::<PrayerSubject>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Prayer subject {} not found", id)))?;

        tracing::debug!("Updated prayer subject: {}", id);
        Ok(subject)
    }

    /// Point a subject at an account (or none) outside any wider unit of work
    pub async fn set_subject_link(
        &self,
        subject_id: i64,
        user_profile_id: Option<i64>,
        status: LinkStatus,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let rows = write_link(&mut conn, subject_id, user_profile_id, status).await?;

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Prayer subject {} not found",
                subject_id
            )));
        }

        Ok(())
    }

    /// Delete a subject, detaching its prayers and closing the owner's list.
    /// Member edges and connection requests go with it.
    pub async fn delete_subject(&self, subject: &PrayerSubject) -> Result<()> {
        let mut tx = self.begin_write().await?;

        sqlx::query(
            r#"
            UPDATE prayers SET prayer_subject_id = NULL, subject_display_sequence = NULL
            WHERE prayer_subject_id = ?
            "#,
        )
        .bind(subject.prayer_subject_id)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query("DELETE FROM prayer_subjects WHERE prayer_subject_id = ?")
            .bind(subject.prayer_subject_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Prayer subject {} not found",
                subject.prayer_subject_id
            )));
        }

        sequence::resequence(&mut tx, Scope::UserSubjects(subject.created_by)).await?;
        tx.commit().await?;

        tracing::debug!("Deleted prayer subject: {}", subject.prayer_subject_id);
        Ok(())
    }

    // ===== Member edges =====

    /// Number of members inside a family/group subject
    pub async fn count_subject_members(&self, group_subject_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM prayer_subject_memberships WHERE group_prayer_subject_id = ?",
        )
        .bind(group_subject_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// True if the subject sits inside at least one family/group subject
    pub async fn is_member_subject(&self, subject_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT prayer_subject_membership_id FROM prayer_subject_memberships
            WHERE member_prayer_subject_id = ?
            LIMIT 1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    pub async fn insert_subject_member(
        &self,
        group_subject_id: i64,
        member_subject_id: i64,
        role: Option<&str>,
        created_by: i64,
    ) -> Result<PrayerSubjectMembership> {
        let membership = sqlx::query_as::<_, PrayerSubjectMembership>(
            r#"
            INSERT INTO prayer_subject_memberships
                (member_prayer_subject_id, group_prayer_subject_id, membership_role, created_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(member_subject_id)
        .bind(group_subject_id)
        .bind(role)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::conflict_on_unique(
                e,
                format!(
                    "Subject {} is already a member of subject {}",
                    member_subject_id, group_subject_id
                ),
            )
        })?;

        tracing::debug!(
            "Added subject {} to subject {}",
            member_subject_id,
            group_subject_id
        );
        Ok(membership)
    }

    pub async fn delete_subject_member(&self, group_subject_id: i64, member_subject_id: i64) -> Result<()> {
        let rows = sqlx::query(
            r#"
            DELETE FROM prayer_subject_memberships
            WHERE group_prayer_subject_id = ? AND member_prayer_subject_id = ?
            "#,
        )
        .bind(group_subject_id)
        .bind(member_subject_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Subject {} is not a member of subject {}",
                member_subject_id, group_subject_id
            )));
        }

        tracing::debug!(
            "Removed subject {} from subject {}",
            member_subject_id,
            group_subject_id
        );
        Ok(())
    }

    /// Member subjects of a family/group, oldest edge first
    pub async fn list_subject_members(&self, group_subject_id: i64) -> Result<Vec<PrayerSubject>> {
        let members = sqlx::query_as::<_, PrayerSubject>(
            r#"
            SELECT s.* FROM prayer_subject_memberships m
            JOIN prayer_subjects s ON s.prayer_subject_id = m.member_prayer_subject_id
            WHERE m.group_prayer_subject_id = ?
            ORDER BY m.prayer_subject_membership_id
            "#,
        )
        .bind(group_subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    const UNLINKED: (Option<i64>, LinkStatus) = (None, LinkStatus::Unlinked);

    #[tokio::test]
    async fn test_subjects_append_in_order() {
        let repo = create_test_repo().await;
        let alice = user(&repo, "alice").await.user_profile_id;

        let mom = repo
            .create_subject(alice, SubjectType::Individual, "Mom", None, UNLINKED)
            .await
            .unwrap();
        let family = repo
            .create_subject(alice, SubjectType::Family, "The Smiths", Some("neighbours"), UNLINKED)
            .await
            .unwrap();

        assert_eq!(mom.display_sequence, 0);
        assert_eq!(family.display_sequence, 1);
        assert_eq!(family.notes.as_deref(), Some("neighbours"));

        let listed: Vec<i64> = repo
            .list_subjects(alice)
            .await
            .unwrap()
            .iter()
            .map(|s| s.prayer_subject_id)
            .collect();
        assert_eq!(listed, vec![mom.prayer_subject_id, family.prayer_subject_id]);
    }

    #[tokio::test]
    async fn test_update_subject_changes_only_given_fields() {
        let repo = create_test_repo().await;
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;

        let subject = repo
            .create_subject(alice, SubjectType::Individual, "Bob", Some("friend"), UNLINKED)
            .await
            .unwrap();

        let updated = repo
            .update_subject(
                subject.prayer_subject_id,
                &SubjectChanges {
                    link: Some((Some(bob), LinkStatus::Linked)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.prayer_subject_display_name, "Bob");
        assert_eq!(updated.notes.as_deref(), Some("friend"));
        assert_eq!(updated.user_profile_id, Some(bob));
        assert_eq!(updated.link_status, LinkStatus::Linked);
    }

    #[tokio::test]
    async fn test_member_edges() {
        let repo = create_test_repo().await;
        let alice = user(&repo, "alice").await.user_profile_id;

        let family = repo
            .create_subject(alice, SubjectType::Family, "Family", None, UNLINKED)
            .await
            .unwrap()
            .prayer_subject_id;
        let kid = repo
            .create_subject(alice, SubjectType::Individual, "Kid", None, UNLINKED)
            .await
            .unwrap()
            .prayer_subject_id;

        repo.insert_subject_member(family, kid, Some("child"), alice).await.unwrap();
        assert_eq!(repo.count_subject_members(family).await.unwrap(), 1);
        assert!(repo.is_member_subject(kid).await.unwrap());

        let dup = repo.insert_subject_member(family, kid, None, alice).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        repo.delete_subject_member(family, kid).await.unwrap();
        assert!(repo.list_subject_members(family).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_subject_member(family, kid).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_subject_detaches_prayers() {
        let repo = create_test_repo().await;
        let alice = user(&repo, "alice").await.user_profile_id;

        let first = repo
            .create_subject(alice, SubjectType::Individual, "First", None, UNLINKED)
            .await
            .unwrap();
        let second = repo
            .create_subject(alice, SubjectType::Individual, "Second", None, UNLINKED)
            .await
            .unwrap();

        let p = repo
            .create_prayer(
                alice,
                &CreatePrayerRequest {
                    prayer_title: "For first".to_string(),
                    prayer_subject_id: Some(first.prayer_subject_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(p.subject_display_sequence, Some(0));

        repo.delete_subject(&first).await.unwrap();

        let detached = repo.get_prayer(p.prayer_id).await.unwrap();
        assert_eq!(detached.prayer_subject_id, None);
        assert_eq!(detached.subject_display_sequence, None);

        let remaining = repo.list_subjects(alice).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].prayer_subject_id, second.prayer_subject_id);
        assert_eq!(remaining[0].display_sequence, 0);
    }
}
