use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, Set};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{channel_key, ChannelPublisher, EntityKind, FanoutPolicy, NotificationType, Transition};
use crate::{entities::notification, errors::ServiceError};

/// Persists notifications and pushes them to each recipient's live channel.
///
/// Lifecycle code calls [`record`](Self::record) or [`fan_out`](Self::fan_out)
/// with its open transaction and [`publish_all`](Self::publish_all) once that
/// transaction has committed. The stored row is authoritative; live delivery
/// is at most once.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Arc<DatabaseConnection>,
    publisher: Arc<dyn ChannelPublisher>,
    policy: Arc<FanoutPolicy>,
}

impl NotificationDispatcher {
    pub fn new(
        db: Arc<DatabaseConnection>,
        publisher: Arc<dyn ChannelPublisher>,
        policy: Arc<FanoutPolicy>,
    ) -> Self {
        Self {
            db,
            publisher,
            policy,
        }
    }

    /// Stores one notification using the caller's connection or transaction
    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        recipient_id: Uuid,
        notification_type: NotificationType,
        message: &str,
        request_id: Option<Uuid>,
    ) -> Result<notification::Model, ServiceError> {
        let model = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_id: Set(recipient_id),
            message: Set(message.to_string()),
            notification_type: Set(notification_type.to_string()),
            request_id: Set(request_id),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        counter!("equipment_notifications.persisted", 1);
        Ok(model)
    }

    /// Records one notification per recipient selected by the fan-out policy
    #[instrument(skip(self, conn, message))]
    pub async fn fan_out<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: EntityKind,
        transition: Transition,
        requester: Option<Uuid>,
        notification_type: NotificationType,
        message: &str,
        request_id: Option<Uuid>,
    ) -> Result<Vec<notification::Model>, ServiceError> {
        let recipients = self
            .policy
            .resolve(conn, kind, transition, requester)
            .await?;
        debug!(recipients = recipients.len(), "fanning out notification");

        let mut stored = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            stored.push(
                self.record(conn, recipient, notification_type, message, request_id)
                    .await?,
            );
        }
        Ok(stored)
    }

    /// Live payload for a stored notification
    pub fn payload(notification: &notification::Model) -> Value {
        let mut data = json!({
            "notification_id": notification.id,
            "created_at": notification.created_at.to_rfc3339(),
        });
        if let Some(request_id) = notification.request_id {
            data["request_id"] = json!(request_id);
        }
        json!({
            "type": "notification",
            "message": notification.message,
            "notification_type": notification.notification_type,
            "data": data,
        })
    }

    /// Pushes a stored notification to its recipient. Failures are logged only.
    pub async fn publish(&self, notification: &notification::Model) {
        let key = channel_key(notification.recipient_id);
        let payload = Self::payload(notification).to_string();

        match self.publisher.publish(&key, &payload).await {
            Ok(receivers) => debug!(
                channel = %key,
                notification_id = %notification.id,
                receivers,
                "notification published"
            ),
            Err(e) => {
                counter!("equipment_notifications.publish_failed", 1);
                warn!(
                    channel = %key,
                    notification_id = %notification.id,
                    error = %e,
                    "live notification delivery failed; record kept"
                );
            }
        }
    }

    /// Publishes a committed batch; each recipient's delivery is independent
    pub async fn publish_all(&self, notifications: &[notification::Model]) {
        join_all(notifications.iter().map(|n| self.publish(n))).await;
    }

    /// Persists a notification for `recipient_id` and publishes it
    #[instrument(skip(self, message))]
    pub async fn notify(
        &self,
        recipient_id: Uuid,
        notification_type: NotificationType,
        message: &str,
    ) -> Result<notification::Model, ServiceError> {
        let stored = self
            .record(&*self.db, recipient_id, notification_type, message, None)
            .await?;
        self.publish(&stored).await;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::publisher::{MockChannelPublisher, PublishError};
    use mockall::predicate::eq;

    fn stored(request_id: Option<Uuid>) -> notification::Model {
        notification::Model {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            message: "Your request has been approved".into(),
            notification_type: NotificationType::RequestApproved.to_string(),
            request_id,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    fn dispatcher(publisher: MockChannelPublisher) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(DatabaseConnection::Disconnected),
            Arc::new(publisher),
            Arc::new(FanoutPolicy::empty()),
        )
    }

    #[test]
    fn payload_carries_ids_and_tag() {
        let request_id = Uuid::new_v4();
        let n = stored(Some(request_id));
        let payload = NotificationDispatcher::payload(&n);

        assert_eq!(payload["message"], "Your request has been approved");
        assert_eq!(payload["notification_type"], "request_approved");
        assert_eq!(payload["data"]["notification_id"], json!(n.id));
        assert_eq!(payload["data"]["request_id"], json!(request_id));
        assert!(payload["data"]["created_at"].is_string());
    }

    #[test]
    fn payload_omits_missing_request_id() {
        let payload = NotificationDispatcher::payload(&stored(None));
        assert!(payload["data"].get("request_id").is_none());
    }

    #[tokio::test]
    async fn publishes_to_recipient_channel() {
        let n = stored(None);
        let mut publisher = MockChannelPublisher::new();
        publisher
            .expect_publish()
            .with(eq(channel_key(n.recipient_id)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(1));

        dispatcher(publisher).publish(&n).await;
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let mut publisher = MockChannelPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(PublishError::Transport("connection reset".into())));

        dispatcher(publisher).publish(&stored(None)).await;
    }
}
