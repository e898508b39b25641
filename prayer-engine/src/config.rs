//! Application configuration
//!
//! Central location for configuration constants, resource limits,
//! and validation boundaries used throughout the engine, plus the
//! environment-driven runtime configuration read by the binary.

use std::path::PathBuf;

// ===== Database =====

/// Maximum pooled connections for the application pool
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// Seconds a writer waits on a locked database before failing
pub const DB_BUSY_TIMEOUT_SECS: u64 = 5;

// ===== Notifications =====

/// Default capacity of the outbound notification queue.
/// Publishing into a full queue drops the notification with a warning.
pub const DEFAULT_NOTIFICATION_QUEUE_CAPACITY: usize = 256;

// ===== Validation Limits =====

/// Maximum length of a prayer title
pub const MAX_PRAYER_TITLE_LENGTH: usize = 255;

/// Maximum length of a prayer subject display name
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Maximum length of a category name
pub const MAX_CATEGORY_NAME_LENGTH: usize = 50;

/// Maximum length of a group name
pub const MAX_GROUP_NAME_LENGTH: usize = 100;

/// Maximum length of a connection request message
pub const MAX_CONNECTION_MESSAGE_LENGTH: usize = 500;

/// Prayer type used when a create request omits one
pub const DEFAULT_PRAYER_TYPE: &str = "general";

// ===== Environment =====

const DB_PATH_VAR: &str = "PRAYER_ENGINE_DB_PATH";
const NOTIFY_CAPACITY_VAR: &str = "PRAYER_ENGINE_NOTIFY_CAPACITY";
const DEFAULT_DB_PATH: &str = "prayer-engine.db";

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub notification_queue_capacity: usize,
}

impl AppConfig {
    /// Read configuration from the process environment, falling back to defaults
    pub fn from_env() -> Self {
        let database_path = std::env::var(DB_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let notification_queue_capacity = match std::env::var(NOTIFY_CAPACITY_VAR) {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(
                        "Ignoring invalid {}={:?}, using {}",
                        NOTIFY_CAPACITY_VAR,
                        raw,
                        DEFAULT_NOTIFICATION_QUEUE_CAPACITY
                    );
                    DEFAULT_NOTIFICATION_QUEUE_CAPACITY
                }
            },
            Err(_) => DEFAULT_NOTIFICATION_QUEUE_CAPACITY,
        };

        Self {
            database_path,
            notification_queue_capacity,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            notification_queue_capacity: DEFAULT_NOTIFICATION_QUEUE_CAPACITY,
        }
    }
}
