//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::AppConfig;
use crate::database::{self, Repository};
use crate::error::Result;
use crate::services::notifications::{self, LoggingSink, Notifier};
use crate::services::{
    AccessResolver, CategoriesService, ConnectionsService, MembershipService, OrderingService,
    PrayersService, SubjectsService,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub membership: MembershipService,
    pub access: AccessResolver,
    pub prayers: PrayersService,
    pub ordering: OrderingService,
    pub subjects: SubjectsService,
    pub connections: ConnectionsService,
    pub categories: CategoriesService,
}

impl AppState {
    /// Wire every service over one pool and one notification queue
    pub fn new(pool: SqlitePool, notifier: Notifier) -> Self {
        let repo = Repository::new(pool);
        let membership = MembershipService::new(repo.clone());
        let access = AccessResolver::new(repo.clone());

        Self {
            prayers: PrayersService::new(
                repo.clone(),
                access.clone(),
                membership.clone(),
                notifier.clone(),
            ),
            ordering: OrderingService::new(repo.clone(), membership.clone()),
            subjects: SubjectsService::new(repo.clone()),
            connections: ConnectionsService::new(repo.clone(), notifier),
            categories: CategoriesService::new(repo.clone(), membership.clone()),
            membership,
            access,
            repo,
        }
    }
}

/// Application setup - called once on startup.
///
/// Opens the database, runs migrations and starts the notification
/// dispatcher. The dispatcher stops once the returned state (and every
/// clone of it) has been dropped.
pub async fn setup(config: &AppConfig) -> Result<(AppState, JoinHandle<()>)> {
    tracing::info!("Initializing application");
    tracing::info!("Database path: {:?}", config.database_path);

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = database::create_pool(&config.database_path).await?;

    let (notifier, rx) = Notifier::channel(config.notification_queue_capacity);
    let dispatcher = notifications::spawn_dispatcher(rx, Arc::new(LoggingSink));

    let state = AppState::new(pool, notifier);

    tracing::info!("Application initialized successfully");

    Ok((state, dispatcher))
}
