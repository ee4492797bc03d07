use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::activity_log;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends after a commit; the state change already happened so a closed
    /// channel is only logged.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            counter!("equipment_events.dropped", 1);
            warn!("{}", e);
        }
    }
}

/// Domain events emitted after lifecycle changes commit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    RequestSubmitted {
        request_id: Uuid,
        item_id: Uuid,
        requester_id: Uuid,
        quantity: i32,
    },
    RequestStatusChanged {
        request_id: Uuid,
        actor_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ItemsIssued {
        request_id: Option<Uuid>,
        actor_id: Uuid,
        serial_numbers: Vec<String>,
    },
    RepairRequestSubmitted {
        repair_request_id: Uuid,
        issued_item_id: Uuid,
        requester_id: Uuid,
    },
    RepairStatusChanged {
        repair_request_id: Uuid,
        actor_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ItemDamaged {
        issued_item_id: Uuid,
        repair_request_id: Option<Uuid>,
        actor_id: Uuid,
    },
    ItemCreated {
        item_id: Uuid,
        actor_id: Uuid,
    },
    ItemDeleted {
        item_id: Uuid,
        actor_id: Uuid,
    },
    NotificationsMarkedRead {
        user_id: Uuid,
        count: u64,
    },
}

impl Event {
    /// Short action name stored in the activity log
    pub fn action(&self) -> &'static str {
        match self {
            Event::RequestSubmitted { .. } => "request_submitted",
            Event::RequestStatusChanged { .. } => "request_status_changed",
            Event::ItemsIssued { .. } => "items_issued",
            Event::RepairRequestSubmitted { .. } => "repair_request_submitted",
            Event::RepairStatusChanged { .. } => "repair_status_changed",
            Event::ItemDamaged { .. } => "item_damaged",
            Event::ItemCreated { .. } => "item_created",
            Event::ItemDeleted { .. } => "item_deleted",
            Event::NotificationsMarkedRead { .. } => "notifications_marked_read",
        }
    }

    /// The user who caused the event
    pub fn actor(&self) -> Option<Uuid> {
        match self {
            Event::RequestSubmitted { requester_id, .. }
            | Event::RepairRequestSubmitted { requester_id, .. } => Some(*requester_id),
            Event::RequestStatusChanged { actor_id, .. }
            | Event::ItemsIssued { actor_id, .. }
            | Event::RepairStatusChanged { actor_id, .. }
            | Event::ItemDamaged { actor_id, .. }
            | Event::ItemCreated { actor_id, .. }
            | Event::ItemDeleted { actor_id, .. } => Some(*actor_id),
            Event::NotificationsMarkedRead { user_id, .. } => Some(*user_id),
        }
    }
}

/// Writes one activity log row for `event`
pub async fn record_activity(db: &DatabaseConnection, event: &Event) -> Result<(), sea_orm::DbErr> {
    let details = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));
    activity_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(event.actor()),
        action: Set(event.action().to_string()),
        details: Set(details),
        timestamp: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map(|_| ())
}

/// Long-running loop turning domain events into activity log rows
pub async fn process_events(mut rx: mpsc::Receiver<Event>, db: Arc<DatabaseConnection>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(action = event.action(), "Received event");

        if let Err(e) = record_activity(&db, &event).await {
            error!(
                "Failed to record activity for event {}: {}",
                event.action(),
                e
            );
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = Event::ItemDeleted {
            item_id: Uuid::nil(),
            actor_id: Uuid::nil(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "item_deleted");
        assert_eq!(event.action(), "item_deleted");
    }

    #[tokio::test]
    async fn closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::NotificationsMarkedRead {
                user_id: Uuid::new_v4(),
                count: 0
            })
            .await
            .is_err());
        sender
            .send_or_log(Event::NotificationsMarkedRead {
                user_id: Uuid::new_v4(),
                count: 0,
            })
            .await;
    }
}
