//! Prayer categories and the grants filed under them

use super::Repository;
use crate::database::models::*;
use crate::database::sequence::{self, Scope};
use crate::error::{AppError, Result};
use chrono::Utc;

impl Repository {
    /// Create a category at the end of its owner's list
    pub async fn create_category(
        &self,
        owner: Grantee,
        req: &CreateCategoryRequest,
        created_by: i64,
    ) -> Result<PrayerCategory> {
        let mut tx = self.begin_write().await?;

        let position = sequence::next_sequence(&mut tx, Scope::Categories(owner)).await?;
        let name = req.category_name.trim();

        let category = sqlx::query_as::<_, PrayerCategory>(
            r#"
            INSERT INTO prayer_categories (
                category_type, category_type_id, category_name, category_color,
                display_sequence, created_by, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(owner.kind())
        .bind(owner.id())
        .bind(name)
        .bind(&req.category_color)
        .bind(position)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::conflict_on_unique(e, format!("Category '{}' already exists", name)))?;

        tx.commit().await?;

        tracing::debug!(
            "Created category {} for {}",
            category.prayer_category_id,
            owner
        );
        Ok(category)
    }

    pub async fn get_category(&self, id: i64) -> Result<PrayerCategory> {
        sqlx::query_as::<_, PrayerCategory>(
            "SELECT * FROM prayer_categories WHERE prayer_category_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))
    }

    /// Categories owned by a user or group, in display order
    pub async fn list_categories(&self, owner: Grantee) -> Result<Vec<PrayerCategory>> {
        let categories = sqlx::query_as::<_, PrayerCategory>(
            r#"
            SELECT * FROM prayer_categories
            WHERE category_type = ? AND category_type_id = ?
            ORDER BY display_sequence, prayer_category_id
            "#,
        )
        .bind(owner.kind())
        .bind(owner.id())
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Items in a category, in display order
    pub async fn list_category_items(&self, category_id: i64) -> Result<Vec<PrayerCategoryItem>> {
        let items = sqlx::query_as::<_, PrayerCategoryItem>(
            r#"
            SELECT * FROM prayer_category_items
            WHERE prayer_category_id = ?
            ORDER BY display_sequence, prayer_access_id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// File a grant under a category. A grant lives in at most one category,
    /// so filing it elsewhere moves it out of its previous one.
    pub async fn assign_category_item(
        &self,
        category_id: i64,
        access_id: i64,
        created_by: i64,
    ) -> Result<PrayerCategoryItem> {
        let mut tx = self.begin_write().await?;

        let existing = sqlx::query_as::<_, PrayerCategoryItem>(
            "SELECT * FROM prayer_category_items WHERE prayer_access_id = ?",
        )
        .bind(access_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(item) = existing {
            if item.prayer_category_id == category_id {
                return Ok(item);
            }

            sqlx::query("DELETE FROM prayer_category_items WHERE prayer_category_item_id = ?")
                .bind(item.prayer_category_item_id)
                .execute(&mut *tx)
                .await?;

            sequence::resequence(&mut tx, Scope::CategoryItems(item.prayer_category_id)).await?;
        }

        let position = sequence::next_sequence(&mut tx, Scope::CategoryItems(category_id)).await?;

        let item = sqlx::query_as::<_, PrayerCategoryItem>(
            r#"
            INSERT INTO prayer_category_items
                (prayer_category_id, prayer_access_id, display_sequence, created_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(category_id)
        .bind(access_id)
        .bind(position)
        .bind(created_by)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Filed access {} under category {}", access_id, category_id);
        Ok(item)
    }

    pub async fn remove_category_item(&self, category_id: i64, access_id: i64) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let rows = sqlx::query(
            "DELETE FROM prayer_category_items WHERE prayer_category_id = ? AND prayer_access_id = ?",
        )
        .bind(category_id)
        .bind(access_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Access {} is not in category {}",
                access_id, category_id
            )));
        }

        sequence::resequence(&mut tx, Scope::CategoryItems(category_id)).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Delete a category (its items go with it) and close the owner's list
    pub async fn delete_category(&self, category: &PrayerCategory) -> Result<()> {
        let mut tx = self.begin_write().await?;

        let rows = sqlx::query("DELETE FROM prayer_categories WHERE prayer_category_id = ?")
            .bind(category.prayer_category_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::NotFound(format!(
                "Category {} not found",
                category.prayer_category_id
            )));
        }

        sequence::resequence(&mut tx, Scope::Categories(category.owner)).await?;
        tx.commit().await?;

        tracing::debug!("Deleted category {}", category.prayer_category_id);
        Ok(())
    }
}
