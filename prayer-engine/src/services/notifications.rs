//! Notifications service
//!
//! Mutations publish notifications onto a bounded in-process queue after
//! they commit. A detached dispatcher task drains the queue into a
//! [`NotificationSink`]. Publishing never fails the request that caused it.

use crate::database::{ConnectionStatus, Grantee};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NotificationKind {
    #[serde(rename_all = "camelCase")]
    PrayerShared {
        prayer_id: i64,
        shared_by: i64,
        grantee: Grantee,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionRequested {
        connection_request_id: i64,
        requester_id: i64,
        prayer_subject_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionResponded {
        connection_request_id: i64,
        responder_id: i64,
        status: ConnectionStatus,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipients: Vec<i64>,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
}

/// Delivery transport (push, email, websocket, ...)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Sink that only writes notifications to the log
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            "Notification {} for users {:?}: {:?}",
            notification.id,
            notification.recipients,
            notification.kind
        );
        Ok(())
    }
}

/// Producer half of the notification queue
#[derive(Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    /// Create a bounded queue and the notifier that feeds it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that drops everything it is given
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a notification. Never blocks and never fails the caller.
    pub fn publish(&self, recipients: Vec<i64>, kind: NotificationKind) {
        if recipients.is_empty() {
            return;
        }

        let Some(tx) = &self.tx else {
            return;
        };

        let notification = Notification {
            id: Uuid::new_v4(),
            recipients,
            kind,
            created_at: Utc::now(),
        };

        match tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                tracing::warn!("Notification queue full, dropping notification {}", n.id);
            }
            Err(TrySendError::Closed(n)) => {
                tracing::warn!("Notification queue closed, dropping notification {}", n.id);
            }
        }
    }
}

/// Drain the queue into a sink until every notifier has been dropped
pub fn spawn_dispatcher(
    mut rx: mpsc::Receiver<Notification>,
    sink: Arc<dyn NotificationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Starting notification dispatcher");

        while let Some(notification) = rx.recv().await {
            if let Err(e) = sink.deliver(&notification).await {
                tracing::error!("Failed to deliver notification {}: {}", notification.id, e);
            }
        }

        tracing::info!("Notification dispatcher stopped");
    })
}
