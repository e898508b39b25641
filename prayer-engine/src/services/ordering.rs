//! Ordering service
//!
//! Authorized bulk reorder for every display-sequence scope. Validation and
//! the writes themselves live in `database::sequence`.

use super::{Caller, MembershipService};
use crate::database::sequence::Scope;
use crate::database::{Repository, SequenceUpdate};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct OrderingService {
    repo: Repository,
    membership: MembershipService,
}

impl OrderingService {
    pub fn new(repo: Repository, membership: MembershipService) -> Self {
        Self { repo, membership }
    }

    /// Replace the order of a whole scope in one unit of work
    pub async fn reorder(&self, caller: Caller, scope: Scope, items: &[SequenceUpdate]) -> Result<()> {
        self.authorize(caller, scope).await?;

        self.repo.reorder_scope(scope, items).await?;

        tracing::info!("Reordered {} item(s) in {:?}", items.len(), scope);

        Ok(())
    }

    /// Check that the caller may rearrange a scope
    pub async fn authorize(&self, caller: Caller, scope: Scope) -> Result<()> {
        match scope {
            Scope::UserGroups(user_id) | Scope::UserSubjects(user_id) => {
                if !caller.acts_as(user_id) {
                    return Err(AppError::Forbidden(format!(
                        "User {} cannot reorder the lists of user {}",
                        caller.user_id, user_id
                    )));
                }
                self.repo.get_user(user_id).await?;
            }
            Scope::GranteePrayers(grantee) | Scope::Categories(grantee) => {
                self.membership.authorize_grantee(caller, grantee).await?;
            }
            Scope::CategoryItems(category_id) => {
                let category = self.repo.get_category(category_id).await?;
                self.membership.authorize_grantee(caller, category.owner).await?;
            }
            Scope::SubjectPrayers(subject_id) => {
                let subject = self.repo.get_subject(subject_id).await?;
                if !caller.acts_as(subject.created_by) {
                    return Err(AppError::Forbidden(format!(
                        "User {} cannot reorder prayer subject {}",
                        caller.user_id, subject_id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;
    use crate::database::{CreatePrayerRequest, Grantee, LinkStatus, SubjectType};

    fn service(repo: &Repository) -> OrderingService {
        OrderingService::new(repo.clone(), MembershipService::new(repo.clone()))
    }

    fn items(pairs: &[(i64, i64)]) -> Vec<SequenceUpdate> {
        pairs
            .iter()
            .map(|&(id, display_sequence)| SequenceUpdate {
                id,
                display_sequence,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_reorder_user_prayers() {
        let repo = create_test_repo().await;
        let ordering = service(&repo);
        let alice = user(&repo, "alice").await.user_profile_id;

        let mut ids = Vec::new();
        for title in ["p0", "p1", "p2"] {
            ids.push(prayer(&repo, alice, title).await.prayer_id);
        }

        let scope = Scope::GranteePrayers(Grantee::User(alice));
        ordering
            .reorder(
                Caller::user(alice),
                scope,
                &items(&[(ids[2], 0), (ids[0], 1), (ids[1], 2)]),
            )
            .await
            .unwrap();

        let order: Vec<i64> = repo
            .scope_members(scope)
            .await
            .unwrap()
            .iter()
            .map(|m| m.member_id)
            .collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
    }

    #[tokio::test]
    async fn test_rejected_reorder_writes_nothing() {
        let repo = create_test_repo().await;
        let ordering = service(&repo);
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;

        let a = prayer(&repo, alice, "a").await.prayer_id;
        let b = prayer(&repo, alice, "b").await.prayer_id;
        let scope = Scope::GranteePrayers(Grantee::User(alice));

        let missing = ordering
            .reorder(Caller::user(alice), scope, &items(&[(b, 0)]))
            .await;
        assert!(matches!(missing, Err(AppError::Validation(_))));

        let clash = ordering
            .reorder(Caller::user(alice), scope, &items(&[(b, 0), (a, 0)]))
            .await;
        assert!(matches!(clash, Err(AppError::Validation(_))));

        let out_of_range = ordering
            .reorder(Caller::user(alice), scope, &items(&[(b, 0), (a, 2)]))
            .await;
        assert!(matches!(out_of_range, Err(AppError::Validation(_))));

        let foreign = ordering
            .reorder(Caller::user(bob), scope, &items(&[(b, 0), (a, 1)]))
            .await;
        assert!(matches!(foreign, Err(AppError::Forbidden(_))));

        let order: Vec<i64> = repo
            .scope_members(scope)
            .await
            .unwrap()
            .iter()
            .map(|m| m.member_id)
            .collect();
        assert_eq!(order, vec![a, b]);
    }

    #[tokio::test]
    async fn test_group_prayers_require_membership() {
        let repo = create_test_repo().await;
        let ordering = service(&repo);
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let choir = group(&repo, alice, "Choir").await.group_profile_id;

        let p = prayer(&repo, alice, "x").await.prayer_id;
        repo.insert_access(p, Grantee::Group(choir), alice).await.unwrap();

        let scope = Scope::GranteePrayers(Grantee::Group(choir));
        let submission = items(&[(p, 0)]);

        let outsider = ordering.reorder(Caller::user(bob), scope, &submission).await;
        assert!(matches!(outsider, Err(AppError::Forbidden(_))));

        ordering.reorder(Caller::user(alice), scope, &submission).await.unwrap();
        ordering.reorder(Caller::admin(bob), scope, &submission).await.unwrap();
    }

    #[tokio::test]
    async fn test_subject_prayers_owner_only() {
        let repo = create_test_repo().await;
        let ordering = service(&repo);
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;

        let subject = repo
            .create_subject(alice, SubjectType::Individual, "Mom", None, (None, LinkStatus::Unlinked))
            .await
            .unwrap()
            .prayer_subject_id;

        let mut ids = Vec::new();
        for title in ["a", "b"] {
            let p = repo
                .create_prayer(
                    alice,
                    &CreatePrayerRequest {
                        prayer_title: title.to_string(),
                        prayer_subject_id: Some(subject),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            ids.push(p.prayer_id);
        }

        let scope = Scope::SubjectPrayers(subject);
        let submission = items(&[(ids[1], 0), (ids[0], 1)]);

        let denied = ordering.reorder(Caller::user(bob), scope, &submission).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        ordering.reorder(Caller::user(alice), scope, &submission).await.unwrap();
        let listed = repo.list_subject_prayers(subject).await.unwrap();
        assert_eq!(listed[0].prayer_id, ids[1]);

        let missing = ordering
            .reorder(Caller::user(alice), Scope::SubjectPrayers(999), &submission)
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
