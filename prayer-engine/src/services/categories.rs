//! Categories service
//!
//! Users and groups file the prayers granted to them into named categories.
//! A category holds grants, never prayers directly, so the same prayer can
//! sit in a different category for each grantee.

use super::{require_text, Caller, MembershipService};
use crate::config::MAX_CATEGORY_NAME_LENGTH;
use crate::database::sequence::Scope;
use crate::database::{
    CategoryWithItems, CreateCategoryRequest, Grantee, PrayerCategory, PrayerCategoryItem,
    Repository,
};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct CategoriesService {
    repo: Repository,
    membership: MembershipService,
}

impl CategoriesService {
    pub fn new(repo: Repository, membership: MembershipService) -> Self {
        Self { repo, membership }
    }

    pub async fn create_category(
        &self,
        caller: Caller,
        owner: Grantee,
        req: CreateCategoryRequest,
    ) -> Result<PrayerCategory> {
        let category_name = require_text(&req.category_name, "Category name", MAX_CATEGORY_NAME_LENGTH)?;

        self.membership.authorize_grantee(caller, owner).await?;

        tracing::info!("Creating category '{}' for {}", category_name, owner);

        self.repo
            .create_category(
                owner,
                &CreateCategoryRequest {
                    category_name,
                    category_color: req.category_color,
                },
                caller.user_id,
            )
            .await
    }

    /// An owner's categories in order, each with its items in order
    pub async fn list_categories(&self, caller: Caller, owner: Grantee) -> Result<Vec<CategoryWithItems>> {
        self.membership.authorize_grantee(caller, owner).await?;

        self.repo.repair_scope_if_needed(Scope::Categories(owner)).await?;
        let categories = self.repo.list_categories(owner).await?;

        let mut nested = Vec::with_capacity(categories.len());
        for category in categories {
            self.repo
                .repair_scope_if_needed(Scope::CategoryItems(category.prayer_category_id))
                .await?;
            let items = self.repo.list_category_items(category.prayer_category_id).await?;
            nested.push(CategoryWithItems { category, items });
        }

        Ok(nested)
    }

    /// File a grant under a category, moving it out of any other one
    pub async fn assign(
        &self,
        caller: Caller,
        category_id: i64,
        access_id: i64,
    ) -> Result<PrayerCategoryItem> {
        let category = self.repo.get_category(category_id).await?;
        self.membership.authorize_grantee(caller, category.owner).await?;

        let access = self
            .repo
            .get_access(access_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Access {} not found", access_id)))?;

        if access.grantee != category.owner {
            return Err(AppError::Validation(format!(
                "Access {} belongs to {}, not to the owner of category {}",
                access_id, access.grantee, category_id
            )));
        }

        self.repo.get_prayer(access.prayer_id).await?;

        self.repo
            .assign_category_item(category_id, access_id, caller.user_id)
            .await
    }

    pub async fn remove(&self, caller: Caller, category_id: i64, access_id: i64) -> Result<()> {
        let category = self.repo.get_category(category_id).await?;
        self.membership.authorize_grantee(caller, category.owner).await?;

        self.repo.remove_category_item(category_id, access_id).await
    }

    pub async fn delete_category(&self, caller: Caller, category_id: i64) -> Result<()> {
        let category = self.repo.get_category(category_id).await?;
        self.membership.authorize_grantee(caller, category.owner).await?;

        tracing::info!("Deleting category: {}", category_id);

        self.repo.delete_category(&category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;

    fn named(name: &str) -> CreateCategoryRequest {
        CreateCategoryRequest {
            category_name: name.to_string(),
            category_color: Some("#aabbcc".to_string()),
        }
    }

    #[tokio::test]
    async fn test_group_categories_require_membership() {
        let repo = create_test_repo().await;
        let service = CategoriesService::new(repo.clone(), MembershipService::new(repo.clone()));
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let choir = group(&repo, alice, "Choir").await.group_profile_id;
        let owner = Grantee::Group(choir);

        let outsider = service.create_category(Caller::user(bob), owner, named("Sick")).await;
        assert!(matches!(outsider, Err(AppError::Forbidden(_))));

        let blank = service.create_category(Caller::user(alice), owner, named(" ")).await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let sick = service
            .create_category(Caller::user(alice), owner, named("Sick"))
            .await
            .unwrap();
        assert_eq!(sick.owner, owner);
    }

    #[tokio::test]
    async fn test_assign_requires_matching_owner() {
        let repo = create_test_repo().await;
        let service = CategoriesService::new(repo.clone(), MembershipService::new(repo.clone()));
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let caller = Caller::user(alice);

        let mine = service
            .create_category(caller, Grantee::User(alice), named("Family"))
            .await
            .unwrap();

        let p = prayer(&repo, alice, "Dad").await.prayer_id;
        let own_grant = repo.find_access(p, Grantee::User(alice)).await.unwrap().unwrap();
        let bobs_grant = repo.insert_access(p, Grantee::User(bob), alice).await.unwrap();

        let wrong_owner = service
            .assign(caller, mine.prayer_category_id, bobs_grant.prayer_access_id)
            .await;
        assert!(matches!(wrong_owner, Err(AppError::Validation(_))));

        service
            .assign(caller, mine.prayer_category_id, own_grant.prayer_access_id)
            .await
            .unwrap();

        let listed = service.list_categories(caller, Grantee::User(alice)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].items.len(), 1);

        let peek = service.delete_category(Caller::user(bob), mine.prayer_category_id).await;
        assert!(matches!(peek, Err(AppError::Forbidden(_))));

        service
            .remove(caller, mine.prayer_category_id, own_grant.prayer_access_id)
            .await
            .unwrap();
        service.delete_category(caller, mine.prayer_category_id).await.unwrap();
        assert!(service
            .list_categories(caller, Grantee::User(alice))
            .await
            .unwrap()
            .is_empty());
    }
}
