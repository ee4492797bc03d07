//! Persisted notifications with best-effort live delivery.

pub mod dispatcher;
pub mod policy;
pub mod publisher;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub use dispatcher::NotificationDispatcher;
pub use policy::{EntityKind, FanoutPolicy, RecipientSelector, Transition};
pub use publisher::{ChannelPublisher, InMemoryChannelPublisher, PublishError, RedisChannelPublisher};

/// Type tag stored with each notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    RequestSubmitted,
    RequestApproved,
    RequestDenied,
    ItemIssued,
    RequestCompleted,
    RepairSubmitted,
    RepairInProcess,
    RepairCompleted,
    ItemDamaged,
    ItemDeleted,
}

/// Live channel for one user
pub fn channel_key(user_id: Uuid) -> String {
    format!("user_{}_notifications", user_id)
}
