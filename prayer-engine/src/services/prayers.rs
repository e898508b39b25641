//! Prayers service
//!
//! Decides who may create, read, update, share, revoke and delete a prayer,
//! and carries out the cascade that turns "remove my own grant on my own
//! prayer" into a full delete.

use super::notifications::{NotificationKind, Notifier};
use super::{require_text, AccessResolver, Caller, MembershipService};
use crate::config::MAX_PRAYER_TITLE_LENGTH;
use crate::database::sequence::Scope;
use crate::database::{
    CreatePrayerRequest, GrantedPrayer, Grantee, Prayer, PrayerAccess, PrayerUpdate, PrayerView,
    Repository,
};
use crate::error::{AppError, Result};
use chrono::Utc;

/// What a grant removal ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRemoval {
    /// A single grant was deleted
    GrantRemoved,
    /// The owner's own grant was removed, taking every grant and the prayer with it
    PrayerDeleted { grants_removed: u64 },
}

/// Service for prayers and their grants
#[derive(Clone)]
pub struct PrayersService {
    repo: Repository,
    access: AccessResolver,
    membership: MembershipService,
    notifier: Notifier,
}

impl PrayersService {
    pub fn new(
        repo: Repository,
        access: AccessResolver,
        membership: MembershipService,
        notifier: Notifier,
    ) -> Self {
        Self {
            repo,
            access,
            membership,
            notifier,
        }
    }

    /// Create a prayer owned by `owner_id`, with the owner's personal grant
    pub async fn create_prayer(
        &self,
        caller: Caller,
        owner_id: i64,
        req: CreatePrayerRequest,
    ) -> Result<Prayer> {
        if !caller.acts_as(owner_id) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot create prayers for user {}",
                caller.user_id, owner_id
            )));
        }

        require_text(&req.prayer_title, "Prayer title", MAX_PRAYER_TITLE_LENGTH)?;
        if let Some(prayer_type) = &req.prayer_type {
            if prayer_type.trim().is_empty() {
                return Err(AppError::Validation("Prayer type cannot be empty".to_string()));
            }
        }

        self.repo.get_user(owner_id).await?;

        if let Some(subject_id) = req.prayer_subject_id {
            self.require_owned_subject(subject_id, owner_id).await?;
        }

        tracing::info!("Creating prayer for user {}", owner_id);

        let prayer = self.repo.create_prayer(owner_id, &req).await?;

        tracing::info!("Prayer created successfully: {}", prayer.prayer_id);

        Ok(prayer)
    }

    /// Read a prayer together with the grant the caller sees it through
    pub async fn get_prayer(&self, caller: Caller, prayer_id: i64) -> Result<PrayerView> {
        let prayer = self.repo.get_prayer(prayer_id).await?;

        if !self
            .access
            .can_read(caller.user_id, prayer_id, caller.is_admin)
            .await?
        {
            return Err(AppError::Forbidden(format!(
                "User {} has no access to prayer {}",
                caller.user_id, prayer_id
            )));
        }

        let access = self.access.display_grant(caller.user_id, prayer_id).await?;

        Ok(PrayerView { prayer, access })
    }

    /// Merge-patch a prayer. Only the creator or an admin may update.
    pub async fn update_prayer(
        &self,
        caller: Caller,
        prayer_id: i64,
        mut patch: PrayerUpdate,
    ) -> Result<Prayer> {
        let prayer = self.repo.get_prayer(prayer_id).await?;

        if !caller.acts_as(prayer.created_by) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot update prayer {}",
                caller.user_id, prayer_id
            )));
        }

        if let Some(title) = &patch.prayer_title {
            require_text(title, "Prayer title", MAX_PRAYER_TITLE_LENGTH)?;
        }
        if let Some(prayer_type) = &patch.prayer_type {
            if prayer_type.trim().is_empty() {
                return Err(AppError::Validation("Prayer type cannot be empty".to_string()));
            }
        }
        if let Some(Some(subject_id)) = patch.prayer_subject_id {
            self.require_owned_subject(subject_id, prayer.created_by).await?;
        }

        match patch.is_answered {
            Some(true) if patch.answered_at.is_none() && !prayer.is_answered => {
                patch.answered_at = Some(Some(Utc::now()));
            }
            Some(false) => patch.answered_at = Some(None),
            _ => {}
        }

        tracing::debug!("Updating prayer: {}", prayer_id);

        let updated = self.repo.update_prayer(&prayer, &patch, caller.user_id).await?;

        tracing::debug!("Prayer updated successfully: {}", prayer_id);

        Ok(updated)
    }

    /// Soft delete a prayer. Blocked while any grant remains.
    pub async fn delete_prayer(&self, caller: Caller, prayer_id: i64) -> Result<()> {
        let prayer = self.repo.get_prayer(prayer_id).await?;

        if !caller.acts_as(prayer.created_by) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot delete prayer {}",
                caller.user_id, prayer_id
            )));
        }

        tracing::info!("Deleting prayer: {}", prayer_id);

        self.repo.soft_delete_prayer(&prayer, caller.user_id).await?;

        tracing::info!("Prayer deleted successfully: {}", prayer_id);

        Ok(())
    }

    /// Share a prayer with a user or group
    pub async fn add_access(
        &self,
        caller: Caller,
        prayer_id: i64,
        grantee: Grantee,
    ) -> Result<PrayerAccess> {
        self.repo.get_prayer(prayer_id).await?;

        if !self
            .access
            .can_read(caller.user_id, prayer_id, caller.is_admin)
            .await?
        {
            return Err(AppError::Forbidden(format!(
                "User {} has no access to prayer {}",
                caller.user_id, prayer_id
            )));
        }

        match grantee {
            Grantee::User(user_id) => {
                self.repo.get_user(user_id).await?;
            }
            Grantee::Group(group_id) => {
                self.repo.get_group(group_id).await?;
                self.membership.require_member(caller, group_id).await?;
            }
        }

        if self.repo.find_access(prayer_id, grantee).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Prayer {} is already shared with {}",
                prayer_id, grantee
            )));
        }

        tracing::info!("Sharing prayer {} with {}", prayer_id, grantee);

        let access = self.repo.insert_access(prayer_id, grantee, caller.user_id).await?;

        let recipients = match grantee {
            Grantee::User(user_id) if user_id == caller.user_id => Vec::new(),
            Grantee::User(user_id) => vec![user_id],
            Grantee::Group(group_id) => {
                match self.membership.members_of(group_id, &[caller.user_id]).await {
                    Ok(members) => members,
                    Err(e) => {
                        tracing::warn!("Could not resolve recipients for group {}: {}", group_id, e);
                        Vec::new()
                    }
                }
            }
        };
        self.notifier.publish(
            recipients,
            NotificationKind::PrayerShared {
                prayer_id,
                shared_by: caller.user_id,
                grantee,
            },
        );

        Ok(access)
    }

    /// Revoke a grant, cascading to a full delete when the owner removes
    /// their own grant on their own prayer
    pub async fn remove_access(
        &self,
        caller: Caller,
        prayer_id: i64,
        access_id: i64,
    ) -> Result<AccessRemoval> {
        let prayer = self.repo.get_prayer(prayer_id).await?;

        let access = self
            .repo
            .get_access(access_id)
            .await?
            .filter(|a| a.prayer_id == prayer_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Access {} not found on prayer {}",
                    access_id, prayer_id
                ))
            })?;

        match access.grantee {
            Grantee::Group(group_id) => {
                if !self.membership.is_member(caller.user_id, group_id).await? {
                    return Err(AppError::Forbidden(format!(
                        "User {} is not a member of group {}",
                        caller.user_id, group_id
                    )));
                }

                let group_creator = match self.repo.get_group(group_id).await {
                    Ok(group) => group.created_by == caller.user_id,
                    Err(AppError::NotFound(_)) => false,
                    Err(e) => return Err(e),
                };

                if !(caller.is_admin || group_creator || prayer.created_by == caller.user_id) {
                    return Err(AppError::Forbidden(format!(
                        "User {} cannot revoke group {}'s access to prayer {}",
                        caller.user_id, group_id, prayer_id
                    )));
                }
            }
            Grantee::User(user_id)
                if user_id == prayer.created_by && user_id == caller.user_id =>
            {
                tracing::info!("Owner removed own grant, deleting prayer {}", prayer_id);

                let grants_removed = self
                    .repo
                    .cascade_delete_prayer(&prayer, caller.user_id)
                    .await?;

                tracing::info!(
                    "Prayer {} deleted with {} grant(s)",
                    prayer_id,
                    grants_removed
                );

                return Ok(AccessRemoval::PrayerDeleted { grants_removed });
            }
            Grantee::User(user_id) => {
                if !(caller.acts_as(user_id) || prayer.created_by == caller.user_id) {
                    return Err(AppError::Forbidden(format!(
                        "User {} cannot revoke user {}'s access to prayer {}",
                        caller.user_id, user_id, prayer_id
                    )));
                }
            }
        }

        self.repo.delete_access(&access).await?;

        tracing::info!("Revoked access {} on prayer {}", access_id, prayer_id);

        Ok(AccessRemoval::GrantRemoved)
    }

    /// A user's or group's prayers in display order
    pub async fn list_prayers(&self, caller: Caller, grantee: Grantee) -> Result<Vec<GrantedPrayer>> {
        self.membership.authorize_grantee(caller, grantee).await?;

        self.repo
            .repair_scope_if_needed(Scope::GranteePrayers(grantee))
            .await?;
        self.repo.list_granted_prayers(grantee).await
    }

    async fn require_owned_subject(&self, subject_id: i64, owner_id: i64) -> Result<()> {
        let subject = self.repo.get_subject(subject_id).await?;

        if subject.created_by != owner_id {
            return Err(AppError::Forbidden(format!(
                "Prayer subject {} belongs to another user",
                subject_id
            )));
        }

        Ok(())
    }
}
