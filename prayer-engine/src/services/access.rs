//! Access resolution
//!
//! A user can see a prayer when a grant names them directly or names a group
//! they actively belong to. Admins can see everything.

use crate::database::{EffectiveGrant, PrayerAccess, Repository};
use crate::error::Result;

#[derive(Clone)]
pub struct AccessResolver {
    repo: Repository,
}

impl AccessResolver {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Every `(user, grant)` pair for a prayer, ordered by
    /// `(effective_user_id, access_type)`
    pub async fn effective_grantees(&self, prayer_id: i64) -> Result<Vec<EffectiveGrant>> {
        self.repo.effective_grantees(prayer_id).await
    }

    pub async fn can_read(&self, user_id: i64, prayer_id: i64, is_admin: bool) -> Result<bool> {
        if is_admin {
            return Ok(true);
        }

        let grants = self.repo.effective_grants_for_user(prayer_id, user_id).await?;
        Ok(!grants.is_empty())
    }

    /// The grant a user's view of the prayer is attributed to
    pub async fn display_grant(&self, user_id: i64, prayer_id: i64) -> Result<Option<PrayerAccess>> {
        let grants = self.repo.effective_grants_for_user(prayer_id, user_id).await?;
        Ok(grants.into_iter().next().map(|g| g.access))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;
    use crate::database::Grantee;

    #[tokio::test]
    async fn test_can_read_through_group() {
        let repo = create_test_repo().await;
        let resolver = AccessResolver::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let carol = user(&repo, "carol").await.user_profile_id;

        let choir = group(&repo, alice, "Choir").await.group_profile_id;
        repo.activate_membership(bob, choir).await.unwrap();

        let p = prayer(&repo, alice, "Exams").await.prayer_id;
        assert!(!resolver.can_read(bob, p, false).await.unwrap());

        repo.insert_access(p, Grantee::Group(choir), alice).await.unwrap();
        assert!(resolver.can_read(bob, p, false).await.unwrap());
        assert!(!resolver.can_read(carol, p, false).await.unwrap());
        assert!(resolver.can_read(carol, p, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_display_grant_prefers_group_then_user() {
        let repo = create_test_repo().await;
        let resolver = AccessResolver::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;

        let p = prayer(&repo, alice, "Family").await.prayer_id;
        assert!(resolver.display_grant(bob, p).await.unwrap().is_none());

        let choir = group(&repo, alice, "Choir").await.group_profile_id;
        repo.insert_access(p, Grantee::Group(choir), alice).await.unwrap();

        // "group" sorts before "user"
        let grant = resolver.display_grant(alice, p).await.unwrap().unwrap();
        assert_eq!(grant.grantee, Grantee::Group(choir));

        let everyone = resolver.effective_grantees(p).await.unwrap();
        assert_eq!(everyone.len(), 2);
    }
}
