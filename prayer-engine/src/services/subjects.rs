//! Prayer subjects service
//!
//! Subjects are the people, families and groups a user prays for. Family
//! and group subjects contain individual members. A subject may be linked to
//! a real account, either directly by its owner or through a connection
//! request (see `connections`).

use super::{require_text, Caller};
use crate::config::MAX_DISPLAY_NAME_LENGTH;
use crate::database::sequence::Scope;
use crate::database::repository::SubjectChanges;
use crate::database::{
    CreateSubjectRequest, LinkStatus, PrayerSubject, PrayerSubjectMembership, Repository,
    SubjectType, SubjectUpdate, SubjectWithPrayers,
};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct SubjectsService {
    repo: Repository,
}

impl SubjectsService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn create_subject(
        &self,
        caller: Caller,
        owner_id: i64,
        req: CreateSubjectRequest,
    ) -> Result<PrayerSubject> {
        if !caller.acts_as(owner_id) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot create prayer subjects for user {}",
                caller.user_id, owner_id
            )));
        }

        let display_name = require_text(
            &req.prayer_subject_display_name,
            "Display name",
            MAX_DISPLAY_NAME_LENGTH,
        )?;
        let subject_type: SubjectType = req.prayer_subject_type.parse().map_err(AppError::Validation)?;

        self.repo.get_user(owner_id).await?;

        let link = match req.user_profile_id {
            Some(user_id) if user_id > 0 => {
                if user_id == owner_id {
                    return Err(AppError::Validation(
                        "A subject linked to its owner is the owner's self subject".to_string(),
                    ));
                }
                self.repo.get_user(user_id).await?;
                (Some(user_id), LinkStatus::Linked)
            }
            _ => (None, LinkStatus::Unlinked),
        };

        tracing::info!("Creating {:?} prayer subject for user {}", subject_type, owner_id);

        let subject = self
            .repo
            .create_subject(
                owner_id,
                subject_type,
                &display_name,
                req.notes.as_deref(),
                link,
            )
            .await?;

        tracing::info!("Prayer subject created successfully: {}", subject.prayer_subject_id);

        Ok(subject)
    }

    /// Return the user's own linked "self" subject, creating it on first use
    pub async fn ensure_self_subject(&self, user_id: i64) -> Result<PrayerSubject> {
        if let Some(existing) = self.repo.find_self_subject(user_id).await? {
            return Ok(existing);
        }

        let user = self.repo.get_user(user_id).await?;
        let full_name = format!("{} {}", user.first_name.trim(), user.last_name.trim());
        let display_name = match full_name.trim() {
            "" => user.username.clone(),
            name => name.to_string(),
        };

        let subject = self
            .repo
            .create_subject(
                user_id,
                SubjectType::Individual,
                &display_name,
                None,
                (Some(user_id), LinkStatus::Linked),
            )
            .await?;

        tracing::info!("Created self subject {} for user {}", subject.prayer_subject_id, user_id);

        Ok(subject)
    }

    pub async fn update_subject(
        &self,
        caller: Caller,
        subject_id: i64,
        update: SubjectUpdate,
    ) -> Result<PrayerSubject> {
        let subject = self.repo.get_subject(subject_id).await?;

        if !caller.acts_as(subject.created_by) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot update prayer subject {}",
                caller.user_id, subject_id
            )));
        }

        let mut changes = SubjectChanges::default();

        if let Some(name) = &update.prayer_subject_display_name {
            changes.display_name = Some(require_text(name, "Display name", MAX_DISPLAY_NAME_LENGTH)?);
        }

        if let Some(raw) = &update.prayer_subject_type {
            let new_type: SubjectType = raw.parse().map_err(AppError::Validation)?;

            if new_type != subject.prayer_subject_type {
                if !new_type.is_collective() && self.repo.count_subject_members(subject_id).await? > 0 {
                    return Err(AppError::Validation(format!(
                        "Prayer subject {} still has members; remove them before changing it to individual",
                        subject_id
                    )));
                }

                if new_type.is_collective() && self.repo.is_member_subject(subject_id).await? {
                    return Err(AppError::Validation(format!(
                        "Prayer subject {} is a member of a family or group and must stay individual",
                        subject_id
                    )));
                }
            }

            changes.subject_type = Some(new_type);
        }

        if let Some(notes) = update.notes {
            changes.notes = Some(notes);
        }

        if let Some(link) = update.user_profile_id {
            changes.link = Some(match link {
                Some(user_id) if user_id > 0 => {
                    if subject.is_self_subject() && user_id != subject.created_by {
                        return Err(AppError::Validation(
                            "A self subject cannot be linked to another account".to_string(),
                        ));
                    }
                    if !subject.is_self_subject() && user_id == subject.created_by {
                        return Err(AppError::Validation(
                            "A subject linked to its owner is the owner's self subject".to_string(),
                        ));
                    }
                    self.repo.get_user(user_id).await?;
                    (Some(user_id), LinkStatus::Linked)
                }
                _ => {
                    if subject.is_self_subject() {
                        return Err(AppError::Validation(
                            "A self subject cannot be unlinked".to_string(),
                        ));
                    }
                    (None, LinkStatus::Unlinked)
                }
            });
        }

        tracing::debug!("Updating prayer subject: {}", subject_id);

        self.repo.update_subject(subject_id, &changes).await
    }

    /// Delete a subject. Self subjects can never be deleted.
    pub async fn delete_subject(&self, caller: Caller, subject_id: i64) -> Result<()> {
        let subject = self.repo.get_subject(subject_id).await?;

        if subject.is_self_subject() {
            return Err(AppError::Validation(
                "A self subject cannot be deleted".to_string(),
            ));
        }

        if !caller.acts_as(subject.created_by) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot delete prayer subject {}",
                caller.user_id, subject_id
            )));
        }

        tracing::info!("Deleting prayer subject: {}", subject_id);

        self.repo.delete_subject(&subject).await?;

        tracing::info!("Prayer subject deleted successfully: {}", subject_id);

        Ok(())
    }

    /// A user's subjects in order, each with its prayers and members
    pub async fn list_subjects(&self, caller: Caller, user_id: i64) -> Result<Vec<SubjectWithPrayers>> {
        if !caller.acts_as(user_id) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot view the prayer subjects of user {}",
                caller.user_id, user_id
            )));
        }

        self.repo.repair_scope_if_needed(Scope::UserSubjects(user_id)).await?;
        let subjects = self.repo.list_subjects(user_id).await?;

        let mut nested = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let id = subject.prayer_subject_id;

            self.repo.repair_scope_if_needed(Scope::SubjectPrayers(id)).await?;
            let prayers = self.repo.list_subject_prayers(id).await?;

            let members = if subject.prayer_subject_type.is_collective() {
                self.repo.list_subject_members(id).await?
            } else {
                Vec::new()
            };

            nested.push(SubjectWithPrayers {
                subject,
                prayers,
                members,
            });
        }

        Ok(nested)
    }

    /// Attach an individual subject to a family or group subject
    pub async fn add_member(
        &self,
        caller: Caller,
        group_subject_id: i64,
        member_subject_id: i64,
        role: Option<String>,
    ) -> Result<PrayerSubjectMembership> {
        let group = self.repo.get_subject(group_subject_id).await?;
        let member = self.repo.get_subject(member_subject_id).await?;

        if group_subject_id == member_subject_id {
            return Err(AppError::Validation(
                "A prayer subject cannot be a member of itself".to_string(),
            ));
        }
        if !group.prayer_subject_type.is_collective() {
            return Err(AppError::Validation(format!(
                "Prayer subject {} is not a family or group",
                group_subject_id
            )));
        }
        if member.prayer_subject_type != SubjectType::Individual {
            return Err(AppError::Validation(
                "Only individual prayer subjects can join a family or group".to_string(),
            ));
        }

        self.require_owner_of_both(caller, &group, &member)?;

        let role = role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let membership = self
            .repo
            .insert_subject_member(group_subject_id, member_subject_id, role.as_deref(), caller.user_id)
            .await?;

        tracing::info!(
            "Prayer subject {} joined subject {}",
            member_subject_id,
            group_subject_id
        );

        Ok(membership)
    }

    pub async fn remove_member(
        &self,
        caller: Caller,
        group_subject_id: i64,
        member_subject_id: i64,
    ) -> Result<()> {
        let group = self.repo.get_subject(group_subject_id).await?;
        let member = self.repo.get_subject(member_subject_id).await?;

        self.require_owner_of_both(caller, &group, &member)?;

        self.repo
            .delete_subject_member(group_subject_id, member_subject_id)
            .await?;

        tracing::info!(
            "Prayer subject {} left subject {}",
            member_subject_id,
            group_subject_id
        );

        Ok(())
    }

    pub async fn list_members(&self, caller: Caller, group_subject_id: i64) -> Result<Vec<PrayerSubject>> {
        let group = self.repo.get_subject(group_subject_id).await?;

        if !caller.acts_as(group.created_by) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot view prayer subject {}",
                caller.user_id, group_subject_id
            )));
        }

        self.repo.list_subject_members(group_subject_id).await
    }

    /// Remove a subject's link to an account
    pub async fn unlink(&self, caller: Caller, subject_id: i64) -> Result<()> {
        let subject = self.repo.get_subject(subject_id).await?;

        if subject.is_self_subject() {
            return Err(AppError::Validation(
                "A self subject cannot be unlinked".to_string(),
            ));
        }
        if subject.link_status != LinkStatus::Linked {
            return Err(AppError::Validation(format!(
                "Prayer subject {} is not linked",
                subject_id
            )));
        }

        let linked_user = subject.user_profile_id == Some(caller.user_id);
        if !(caller.acts_as(subject.created_by) || linked_user) {
            return Err(AppError::Forbidden(format!(
                "User {} cannot unlink prayer subject {}",
                caller.user_id, subject_id
            )));
        }

        self.repo
            .set_subject_link(subject_id, None, LinkStatus::Unlinked)
            .await?;

        tracing::info!("Prayer subject {} unlinked", subject_id);

        Ok(())
    }

    fn require_owner_of_both(
        &self,
        caller: Caller,
        group: &PrayerSubject,
        member: &PrayerSubject,
    ) -> Result<()> {
        if caller.acts_as(group.created_by) && caller.acts_as(member.created_by) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "User {} must own both prayer subject {} and {}",
            caller.user_id, group.prayer_subject_id, member.prayer_subject_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;
    use crate::database::CreatePrayerRequest;

    fn request(name: &str, subject_type: &str) -> CreateSubjectRequest {
        CreateSubjectRequest {
            prayer_subject_display_name: name.to_string(),
            prayer_subject_type: subject_type.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_subject_validation() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let caller = Caller::user(alice);

        let blank = service.create_subject(caller, alice, request("  ", "individual")).await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let bad_type = service.create_subject(caller, alice, request("Mom", "tribe")).await;
        assert!(matches!(bad_type, Err(AppError::Validation(_))));

        let foreign = service.create_subject(Caller::user(bob), alice, request("Mom", "individual")).await;
        assert!(matches!(foreign, Err(AppError::Forbidden(_))));

        let linked = service
            .create_subject(
                caller,
                alice,
                CreateSubjectRequest {
                    user_profile_id: Some(bob),
                    ..request("Bob", "individual")
                },
            )
            .await
            .unwrap();
        assert_eq!(linked.link_status, LinkStatus::Linked);
        assert_eq!(linked.user_profile_id, Some(bob));

        let ghost = service
            .create_subject(
                caller,
                alice,
                CreateSubjectRequest {
                    user_profile_id: Some(404),
                    ..request("Ghost", "individual")
                },
            )
            .await;
        assert!(matches!(ghost, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_self_subject_is_protected() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;

        let me = service.ensure_self_subject(alice).await.unwrap();
        assert!(me.is_self_subject());
        assert_eq!(me.prayer_subject_display_name, "alice");
        let again = service.ensure_self_subject(alice).await.unwrap();
        assert_eq!(again.prayer_subject_id, me.prayer_subject_id);

        for caller in [Caller::user(alice), Caller::admin(99)] {
            let deleted = service.delete_subject(caller, me.prayer_subject_id).await;
            assert!(matches!(deleted, Err(AppError::Validation(_))));

            let unlinked = service.unlink(caller, me.prayer_subject_id).await;
            assert!(matches!(unlinked, Err(AppError::Validation(_))));
        }

        let cleared = service
            .update_subject(
                Caller::user(alice),
                me.prayer_subject_id,
                SubjectUpdate {
                    user_profile_id: Some(None),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(cleared, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_owner_link_reserved_for_self_subject() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let caller = Caller::user(alice);

        let created = service
            .create_subject(
                caller,
                alice,
                CreateSubjectRequest {
                    user_profile_id: Some(alice),
                    ..request("Me again", "individual")
                },
            )
            .await;
        assert!(matches!(created, Err(AppError::Validation(_))));

        let friend = service
            .create_subject(caller, alice, request("Friend", "individual"))
            .await
            .unwrap();
        let relinked = service
            .update_subject(
                caller,
                friend.prayer_subject_id,
                SubjectUpdate {
                    user_profile_id: Some(Some(alice)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(relinked, Err(AppError::Validation(_))));

        let stored = repo.get_subject(friend.prayer_subject_id).await.unwrap();
        assert!(!stored.is_self_subject());
        assert_eq!(stored.link_status, LinkStatus::Unlinked);

        // the self subject may still be relinked to its own owner
        let me = service.ensure_self_subject(alice).await.unwrap();
        let kept = service
            .update_subject(
                caller,
                me.prayer_subject_id,
                SubjectUpdate {
                    user_profile_id: Some(Some(alice)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(kept.is_self_subject());
    }

    #[tokio::test]
    async fn test_downgrade_with_members_rejected() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let caller = Caller::user(alice);

        let family = service.create_subject(caller, alice, request("Smiths", "family")).await.unwrap();
        let kid = service.create_subject(caller, alice, request("Tim", "individual")).await.unwrap();

        service
            .add_member(caller, family.prayer_subject_id, kid.prayer_subject_id, Some("son".to_string()))
            .await
            .unwrap();

        let downgrade = service
            .update_subject(
                caller,
                family.prayer_subject_id,
                SubjectUpdate {
                    prayer_subject_type: Some("individual".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(downgrade, Err(AppError::Validation(_))));

        let upgrade = service
            .update_subject(
                caller,
                kid.prayer_subject_id,
                SubjectUpdate {
                    prayer_subject_type: Some("group".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(upgrade, Err(AppError::Validation(_))));

        service
            .remove_member(caller, family.prayer_subject_id, kid.prayer_subject_id)
            .await
            .unwrap();

        let downgraded = service
            .update_subject(
                caller,
                family.prayer_subject_id,
                SubjectUpdate {
                    prayer_subject_type: Some("individual".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(downgraded.prayer_subject_type, SubjectType::Individual);
    }

    #[tokio::test]
    async fn test_membership_guards() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let caller = Caller::user(alice);

        let family = service.create_subject(caller, alice, request("Smiths", "family")).await.unwrap();
        let other = service.create_subject(caller, alice, request("Joneses", "group")).await.unwrap();
        let kid = service.create_subject(caller, alice, request("Tim", "individual")).await.unwrap();
        let bobs = service
            .create_subject(Caller::user(bob), bob, request("Sam", "individual"))
            .await
            .unwrap();

        let fid = family.prayer_subject_id;

        let itself = service.add_member(caller, fid, fid, None).await;
        assert!(matches!(itself, Err(AppError::Validation(_))));

        let nested = service.add_member(caller, fid, other.prayer_subject_id, None).await;
        assert!(matches!(nested, Err(AppError::Validation(_))));

        let into_individual = service
            .add_member(caller, kid.prayer_subject_id, kid.prayer_subject_id + 100, None)
            .await;
        assert!(matches!(into_individual, Err(AppError::NotFound(_))));

        let foreign = service.add_member(caller, fid, bobs.prayer_subject_id, None).await;
        assert!(matches!(foreign, Err(AppError::Forbidden(_))));

        service.add_member(caller, fid, kid.prayer_subject_id, None).await.unwrap();
        let dup = service.add_member(caller, fid, kid.prayer_subject_id, None).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        assert_eq!(service.list_members(caller, fid).await.unwrap().len(), 1);

        service.remove_member(caller, fid, kid.prayer_subject_id).await.unwrap();
        let absent = service.remove_member(caller, fid, kid.prayer_subject_id).await;
        assert!(matches!(absent, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unlink_rules() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let carol = user(&repo, "carol").await.user_profile_id;

        let unlinked = service
            .create_subject(Caller::user(alice), alice, request("Pat", "individual"))
            .await
            .unwrap();
        let not_linked = service.unlink(Caller::user(alice), unlinked.prayer_subject_id).await;
        assert!(matches!(not_linked, Err(AppError::Validation(_))));

        let linked = service
            .update_subject(
                Caller::user(alice),
                unlinked.prayer_subject_id,
                SubjectUpdate {
                    user_profile_id: Some(Some(bob)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(linked.link_status, LinkStatus::Linked);

        let stranger = service.unlink(Caller::user(carol), linked.prayer_subject_id).await;
        assert!(matches!(stranger, Err(AppError::Forbidden(_))));

        // the linked user may remove the link
        service.unlink(Caller::user(bob), linked.prayer_subject_id).await.unwrap();
        let after = repo.get_subject(linked.prayer_subject_id).await.unwrap();
        assert_eq!(after.link_status, LinkStatus::Unlinked);
        assert_eq!(after.user_profile_id, None);
    }

    #[tokio::test]
    async fn test_list_and_delete_subjects() {
        let repo = create_test_repo().await;
        let service = SubjectsService::new(repo.clone());
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let caller = Caller::user(alice);

        let mom = service.create_subject(caller, alice, request("Mom", "individual")).await.unwrap();
        let dad = service.create_subject(caller, alice, request("Dad", "individual")).await.unwrap();

        let p = repo
            .create_prayer(
                alice,
                &CreatePrayerRequest {
                    prayer_title: "Surgery".to_string(),
                    prayer_subject_id: Some(mom.prayer_subject_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let listed = service.list_subjects(caller, alice).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].prayers.len(), 1);
        assert!(listed[1].prayers.is_empty());

        let peek = service.list_subjects(Caller::user(bob), alice).await;
        assert!(matches!(peek, Err(AppError::Forbidden(_))));

        service.delete_subject(caller, mom.prayer_subject_id).await.unwrap();

        let detached = repo.get_prayer(p.prayer_id).await.unwrap();
        assert_eq!(detached.prayer_subject_id, None);

        let listed = service.list_subjects(caller, alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject.prayer_subject_id, dad.prayer_subject_id);
        assert_eq!(listed[0].subject.display_sequence, 0);
    }
}
