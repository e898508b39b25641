//! Database schema and migrations
//!
//! Migrations are plain SQL files compiled into the binary and recorded in
//! `schema_version` once applied. WAL mode lets handlers read while a
//! unit-of-work transaction is writing.

use crate::error::Result;
use sqlx::sqlite::SqlitePool;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: include_str!("migrations/001_initial_schema.sql"),
}];

/// Bring the schema up to the latest version
pub async fn initialize_database(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Initializing database schema");

    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    // Cascades on category items and subject edges depend on this
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await?;

    tracing::info!("Current schema version: {}", current);

    let pending = MIGRATIONS.iter().filter(|m| m.version > current);
    for migration in pending {
        apply_migration(pool, migration).await?;
    }

    tracing::info!("Database initialization complete");
    Ok(())
}

async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    tracing::info!(
        "Applying migration {} ({})",
        migration.version,
        migration.name
    );

    let mut tx = pool.begin().await?;

    let statements = migration
        .sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty());
    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query("INSERT INTO schema_version (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::debug!("Migration {} committed", migration.version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn bare_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_creates_prayer_tables() {
        let pool = bare_pool().await;
        initialize_database(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('prayers', 'prayer_access', 'prayer_subjects', 'connection_requests')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 4);

        let name: String = sqlx::query_scalar("SELECT name FROM schema_version WHERE version = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "initial_schema");
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let pool = bare_pool().await;

        initialize_database(&pool).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = bare_pool().await;
        initialize_database(&pool).await.unwrap();

        let orphan = sqlx::query(
            "INSERT INTO prayer_access (prayer_id, access_type, access_type_id, display_sequence, created_by, created_at) \
             VALUES (999, 'user', 1, 0, 1, CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await;
        assert!(orphan.is_err());
    }
}
