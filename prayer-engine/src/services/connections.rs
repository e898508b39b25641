//! Connection requests service
//!
//! A subject's owner asks another account to confirm that the subject is
//! them. Sending pre-links the subject as `pending`; the target then accepts
//! (`linked`) or declines (`declined`, link cleared).

use super::notifications::{NotificationKind, Notifier};
use super::Caller;
use crate::config::MAX_CONNECTION_MESSAGE_LENGTH;
use crate::database::{
    ConnectionRequest, ConnectionStatus, LinkStatus, Repository, SendConnectionRequest,
};
use crate::error::{AppError, Result};
use serde::Deserialize;

/// Which side of a request a listing is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

#[derive(Clone)]
pub struct ConnectionsService {
    repo: Repository,
    notifier: Notifier,
}

impl ConnectionsService {
    pub fn new(repo: Repository, notifier: Notifier) -> Self {
        Self { repo, notifier }
    }

    pub async fn send_request(
        &self,
        caller: Caller,
        req: SendConnectionRequest,
    ) -> Result<ConnectionRequest> {
        let subject = self.repo.get_subject(req.prayer_subject_id).await?;
        self.repo.get_user(req.target_user_profile_id).await?;

        if subject.created_by != caller.user_id {
            return Err(AppError::Forbidden(format!(
                "Only the creator of prayer subject {} may request a connection",
                subject.prayer_subject_id
            )));
        }

        if req.target_user_profile_id == caller.user_id {
            return Err(AppError::Validation(
                "Cannot send a connection request to yourself".to_string(),
            ));
        }

        let message = req
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        if let Some(m) = message {
            if m.chars().count() > MAX_CONNECTION_MESSAGE_LENGTH {
                return Err(AppError::Validation(format!(
                    "Message cannot exceed {} characters",
                    MAX_CONNECTION_MESSAGE_LENGTH
                )));
            }
        }

        if subject.link_status == LinkStatus::Linked {
            return Err(AppError::Conflict(format!(
                "Prayer subject {} is already linked",
                subject.prayer_subject_id
            )));
        }

        if self
            .repo
            .has_pending_request(caller.user_id, req.target_user_profile_id, subject.prayer_subject_id)
            .await?
        {
            return Err(AppError::Conflict(
                "A connection request for this subject and user is already pending".to_string(),
            ));
        }

        tracing::info!(
            "User {} requesting connection of subject {} to user {}",
            caller.user_id,
            subject.prayer_subject_id,
            req.target_user_profile_id
        );

        let request = self
            .repo
            .create_connection_request(
                caller.user_id,
                req.target_user_profile_id,
                subject.prayer_subject_id,
                message,
            )
            .await?;

        self.notifier.publish(
            vec![request.target_user_profile_id],
            NotificationKind::ConnectionRequested {
                connection_request_id: request.connection_request_id,
                requester_id: caller.user_id,
                prayer_subject_id: request.prayer_subject_id,
            },
        );

        Ok(request)
    }

    /// Accept or decline a pending request. Only its target may answer.
    pub async fn respond(
        &self,
        caller: Caller,
        request_id: i64,
        status: &str,
    ) -> Result<ConnectionRequest> {
        let request = self.repo.get_connection_request(request_id).await?;

        if request.target_user_profile_id != caller.user_id {
            return Err(AppError::Forbidden(format!(
                "User {} is not the target of connection request {}",
                caller.user_id, request_id
            )));
        }

        let status: ConnectionStatus = status.parse().map_err(AppError::Validation)?;
        if status == ConnectionStatus::Pending {
            return Err(AppError::Validation(
                "A connection request can only be accepted or declined".to_string(),
            ));
        }

        if request.status != ConnectionStatus::Pending {
            return Err(AppError::Validation(format!(
                "Connection request {} is no longer pending",
                request_id
            )));
        }

        let resolved = self.repo.resolve_connection_request(&request, status).await?;

        tracing::info!("Connection request {} {:?}", request_id, status);

        self.notifier.publish(
            vec![resolved.requester_user_profile_id],
            NotificationKind::ConnectionResponded {
                connection_request_id: request_id,
                responder_id: caller.user_id,
                status,
            },
        );

        Ok(resolved)
    }

    /// Pending requests the caller has received or sent
    pub async fn list_requests(
        &self,
        caller: Caller,
        direction: RequestDirection,
    ) -> Result<Vec<ConnectionRequest>> {
        match direction {
            RequestDirection::Incoming => self.repo.list_incoming_requests(caller.user_id).await,
            RequestDirection::Outgoing => self.repo.list_outgoing_requests(caller.user_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::*;
    use crate::database::SubjectType;
    use crate::services::notifications::Notification;
    use tokio::sync::mpsc;

    async fn setup() -> (Repository, ConnectionsService, mpsc::Receiver<Notification>) {
        let repo = create_test_repo().await;
        let (notifier, rx) = Notifier::channel(8);
        let service = ConnectionsService::new(repo.clone(), notifier);
        (repo, service, rx)
    }

    async fn subject(repo: &Repository, owner: i64) -> i64 {
        repo.create_subject(owner, SubjectType::Individual, "Friend", None, (None, LinkStatus::Unlinked))
            .await
            .unwrap()
            .prayer_subject_id
    }

    fn send(target: i64, subject: i64) -> SendConnectionRequest {
        SendConnectionRequest {
            target_user_profile_id: target,
            prayer_subject_id: subject,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_send_guards() {
        let (repo, service, _rx) = setup().await;
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let s = subject(&repo, alice).await;

        let missing_subject = service.send_request(Caller::user(alice), send(bob, 999)).await;
        assert!(matches!(missing_subject, Err(AppError::NotFound(_))));

        let missing_target = service.send_request(Caller::user(alice), send(999, s)).await;
        assert!(matches!(missing_target, Err(AppError::NotFound(_))));

        // admins get no bypass here
        let not_owner = service.send_request(Caller::admin(bob), send(bob, s)).await;
        assert!(matches!(not_owner, Err(AppError::Forbidden(_))));

        let to_self = service.send_request(Caller::user(alice), send(alice, s)).await;
        assert!(matches!(to_self, Err(AppError::Validation(_))));

        service.send_request(Caller::user(alice), send(bob, s)).await.unwrap();
        let dup = service.send_request(Caller::user(alice), send(bob, s)).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_accept_flow_notifies_both_sides() {
        let (repo, service, mut rx) = setup().await;
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let carol = user(&repo, "carol").await.user_profile_id;
        let s = subject(&repo, alice).await;

        let request = service
            .send_request(Caller::user(alice), send(bob, s))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().recipients, vec![bob]);

        let incoming = service
            .list_requests(Caller::user(bob), RequestDirection::Incoming)
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);

        let wrong_user = service
            .respond(Caller::user(carol), request.connection_request_id, "accepted")
            .await;
        assert!(matches!(wrong_user, Err(AppError::Forbidden(_))));

        let bad_status = service
            .respond(Caller::user(bob), request.connection_request_id, "maybe")
            .await;
        assert!(matches!(bad_status, Err(AppError::Validation(_))));

        let resolved = service
            .respond(Caller::user(bob), request.connection_request_id, "accepted")
            .await
            .unwrap();
        assert_eq!(resolved.status, ConnectionStatus::Accepted);
        assert_eq!(rx.recv().await.unwrap().recipients, vec![alice]);

        let linked = repo.get_subject(s).await.unwrap();
        assert_eq!(linked.link_status, LinkStatus::Linked);
        assert_eq!(linked.user_profile_id, Some(bob));

        let twice = service
            .respond(Caller::user(bob), request.connection_request_id, "declined")
            .await;
        assert!(matches!(twice, Err(AppError::Validation(_))));

        let relink = service.send_request(Caller::user(alice), send(carol, s)).await;
        assert!(matches!(relink, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_decline_clears_link() {
        let (repo, service, _rx) = setup().await;
        let alice = user(&repo, "alice").await.user_profile_id;
        let bob = user(&repo, "bob").await.user_profile_id;
        let s = subject(&repo, alice).await;

        let request = service
            .send_request(Caller::user(alice), send(bob, s))
            .await
            .unwrap();
        assert_eq!(repo.get_subject(s).await.unwrap().link_status, LinkStatus::Pending);

        service
            .respond(Caller::user(bob), request.connection_request_id, "declined")
            .await
            .unwrap();

        let declined = repo.get_subject(s).await.unwrap();
        assert_eq!(declined.link_status, LinkStatus::Declined);
        assert_eq!(declined.user_profile_id, None);

        let outgoing = service
            .list_requests(Caller::user(alice), RequestDirection::Outgoing)
            .await
            .unwrap();
        assert!(outgoing.is_empty());
    }
}
