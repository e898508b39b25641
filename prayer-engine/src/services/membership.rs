//! Membership service
//!
//! Group membership lookups used by every authorization decision, plus the
//! group lifecycle operations that keep `UserGroups` ordered.

use super::{require_text, Caller};
use crate::config::MAX_GROUP_NAME_LENGTH;
use crate::database::sequence::Scope;
use crate::database::{
    CreateGroupRequest, GroupMembership, GroupProfile, Grantee, MemberGroup, Repository,
};
use crate::error::{AppError, Result};

/// Service for group membership
#[derive(Clone)]
pub struct MembershipService {
    repo: Repository,
}

impl MembershipService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Active membership check. Always reads the store.
    pub async fn is_member(&self, user_id: i64, group_id: i64) -> Result<bool> {
        self.repo.is_member(user_id, group_id).await
    }

    /// Active members of a group, by user id, minus `excluding`
    pub async fn members_of(&self, group_id: i64, excluding: &[i64]) -> Result<Vec<i64>> {
        self.repo.members_of(group_id, excluding).await
    }

    /// Admins pass, everyone else must be an active member
    pub async fn require_member(&self, caller: Caller, group_id: i64) -> Result<()> {
        if caller.is_admin || self.repo.is_member(caller.user_id, group_id).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "User {} is not a member of group {}",
            caller.user_id, group_id
        )))
    }

    /// Authorize access to a grantee's own lists (prayers, categories).
    /// Users manage their own; groups are managed by their members.
    pub async fn authorize_grantee(&self, caller: Caller, grantee: Grantee) -> Result<()> {
        match grantee {
            Grantee::User(user_id) => {
                if !caller.acts_as(user_id) {
                    return Err(AppError::Forbidden(format!(
                        "User {} cannot manage the lists of user {}",
                        caller.user_id, user_id
                    )));
                }
                self.repo.get_user(user_id).await?;
            }
            Grantee::Group(group_id) => {
                self.repo.get_group(group_id).await?;
                self.require_member(caller, group_id).await?;
            }
        }

        Ok(())
    }

    pub async fn create_group(&self, caller: Caller, req: CreateGroupRequest) -> Result<GroupProfile> {
        let group_name = require_text(&req.group_name, "Group name", MAX_GROUP_NAME_LENGTH)?;

        tracing::info!("Creating group '{}' for user {}", group_name, caller.user_id);

        let group = self
            .repo
            .create_group(
                caller.user_id,
                &CreateGroupRequest {
                    group_name,
                    group_description: req.group_description,
                },
            )
            .await?;

        tracing::info!("Group created successfully: {}", group.group_profile_id);

        Ok(group)
    }

    /// Add a user to a group. Users join themselves; the group's creator or
    /// an admin may add anyone.
    pub async fn join_group(&self, caller: Caller, user_id: i64, group_id: i64) -> Result<GroupMembership> {
        let group = self.repo.get_group(group_id).await?;
        self.repo.get_user(user_id).await?;

        if !caller.acts_as(user_id) && group.created_by != caller.user_id {
            return Err(AppError::Forbidden(format!(
                "User {} cannot add members to group {}",
                caller.user_id, group_id
            )));
        }

        let membership = self.repo.activate_membership(user_id, group_id).await?;

        tracing::info!("User {} joined group {}", user_id, group_id);

        Ok(membership)
    }

    /// Deactivate a membership and close the gap in the user's group list
    pub async fn leave_group(&self, caller: Caller, user_id: i64, group_id: i64) -> Result<()> {
        let group = self.repo.get_group(group_id).await?;

        if !caller.acts_as(user_id) && group.created_by != caller.user_id {
            return Err(AppError::Forbidden(format!(
                "User {} cannot remove members from group {}",
                caller.user_id, group_id
            )));
        }

        self.repo.deactivate_membership(user_id, group_id).await?;

        tracing::info!("User {} left group {}", user_id, group_id);

        Ok(())
    }

    /// A user's groups in their chosen order
    pub async fn list_user_groups(&self, caller: Caller, user_id: i64) -> Result<Vec<MemberGroup>> {
        if !caller.acts_as(user_id) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot view the groups of user {}",
                caller.user_id, user_id
            )));
        }

        self.repo.repair_scope_if_needed(Scope::UserGroups(user_id)).await?;
        self.repo.list_user_groups(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;

    fn named(name: &str) -> CreateGroupRequest {
        CreateGroupRequest {
            group_name: name.to_string(),
            group_description: None,
        }
    }

    #[tokio::test]
    async fn test_join_rules() {
        let repo = create_test_repo().await;
        let service = MembershipService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let carol = user(&repo, "carol").await.user_profile_id;

        let choir = service
            .create_group(Caller::user(alice), named("  Choir "))
            .await
            .unwrap();
        assert_eq!(choir.group_name, "Choir");
        let gid = choir.group_profile_id;

        // bob cannot enrol carol, but can enrol himself
        let denied = service.join_group(Caller::user(bob), carol, gid).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        service.join_group(Caller::user(bob), bob, gid).await.unwrap();

        // the creator can enrol carol
        service.join_group(Caller::user(alice), carol, gid).await.unwrap();
        assert_eq!(service.members_of(gid, &[alice]).await.unwrap(), vec![bob, carol]);

        let again = service.join_group(Caller::user(bob), bob, gid).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_leave_and_rejoin_appends() {
        let repo = create_test_repo().await;
        let service = MembershipService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let caller = Caller::user(alice);

        let a = service.create_group(caller, named("A")).await.unwrap().group_profile_id;
        let b = service.create_group(caller, named("B")).await.unwrap().group_profile_id;
        let c = service.create_group(caller, named("C")).await.unwrap().group_profile_id;

        service.leave_group(caller, alice, a).await.unwrap();
        assert!(!service.is_member(alice, a).await.unwrap());

        service.join_group(caller, alice, a).await.unwrap();

        let groups = service.list_user_groups(caller, alice).await.unwrap();
        let order: Vec<(i64, i64)> = groups
            .iter()
            .map(|g| (g.group.group_profile_id, g.group_display_sequence))
            .collect();
        assert_eq!(order, vec![(b, 0), (c, 1), (a, 2)]);
    }

    #[tokio::test]
    async fn test_list_requires_self_or_admin() {
        let repo = create_test_repo().await;
        let service = MembershipService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        group(&repo, alice, "G").await;

        let peek = service.list_user_groups(Caller::user(bob), alice).await;
        assert!(matches!(peek, Err(AppError::Forbidden(_))));
        assert_eq!(service.list_user_groups(Caller::admin(bob), alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_authorize_grantee() {
        let repo = create_test_repo().await;
        let service = MembershipService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let g = group(&repo, alice, "G").await.group_profile_id;

        service.authorize_grantee(Caller::user(alice), Grantee::Group(g)).await.unwrap();
        let outsider = service.authorize_grantee(Caller::user(bob), Grantee::Group(g)).await;
        assert!(matches!(outsider, Err(AppError::Forbidden(_))));
        service.authorize_grantee(Caller::admin(bob), Grantee::Group(g)).await.unwrap();

        let missing = service.authorize_grantee(Caller::admin(bob), Grantee::Group(404)).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let other = service.authorize_grantee(Caller::user(bob), Grantee::User(alice)).await;
        assert!(matches!(other, Err(AppError::Forbidden(_))));
    }
}
