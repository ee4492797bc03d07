use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Redis publish failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Publish failed: {0}")]
    Transport(String),
}

/// Real-time transport for per-user notification channels
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    /// Publishes `payload` on `channel_key`, returning how many live
    /// subscribers received it.
    async fn publish(&self, channel_key: &str, payload: &str) -> Result<usize, PublishError>;
}

/// In-process broadcast channels keyed by channel name
#[derive(Debug, Default)]
pub struct InMemoryChannelPublisher {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl InMemoryChannelPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a channel, creating it on first use
    pub fn subscribe(&self, channel_key: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel_key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[async_trait]
impl ChannelPublisher for InMemoryChannelPublisher {
    async fn publish(&self, channel_key: &str, payload: &str) -> Result<usize, PublishError> {
        // No subscriber yet means nobody is online; the stored record covers it.
        let delivered = match self.channels.get(channel_key) {
            Some(sender) => sender.send(payload.to_string()).unwrap_or(0),
            None => {
                debug!(channel = channel_key, "no live subscribers");
                return Ok(0);
            }
        };
        if delivered == 0 {
            // Everyone unsubscribed; the next subscribe recreates the channel.
            self.channels
                .remove_if(channel_key, |_, sender| sender.receiver_count() == 0);
        }
        Ok(delivered)
    }
}

/// Redis `PUBLISH` transport
#[derive(Clone)]
pub struct RedisChannelPublisher {
    connection: ConnectionManager,
}

impl RedisChannelPublisher {
    pub async fn connect(client: redis::Client) -> Result<Self, PublishError> {
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl ChannelPublisher for RedisChannelPublisher {
    async fn publish(&self, channel_key: &str, payload: &str) -> Result<usize, PublishError> {
        let mut conn = self.connection.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel_key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_payloads() {
        let publisher = InMemoryChannelPublisher::new();
        let mut rx = publisher.subscribe("user_1_notifications");

        let delivered = publisher
            .publish("user_1_notifications", "{\"message\":\"hi\"}")
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap(), "{\"message\":\"hi\"}");
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let publisher = InMemoryChannelPublisher::new();
        assert_eq!(publisher.publish("user_2_notifications", "{}").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn channels_are_isolated_per_key() {
        let publisher = InMemoryChannelPublisher::new();
        let mut a = publisher.subscribe("user_a_notifications");
        let _b = publisher.subscribe("user_b_notifications");

        publisher.publish("user_b_notifications", "for-b").await.unwrap();
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn abandoned_channels_are_dropped_on_publish() {
        let publisher = InMemoryChannelPublisher::new();
        let rx = publisher.subscribe("user_3_notifications");
        let _kept = publisher.subscribe("user_4_notifications");
        drop(rx);

        assert_eq!(publisher.publish("user_3_notifications", "{}").await.unwrap(), 0);
        assert!(!publisher.channels.contains_key("user_3_notifications"));

        publisher.publish("user_4_notifications", "{}").await.unwrap();
        assert!(publisher.channels.contains_key("user_4_notifications"));

        let mut again = publisher.subscribe("user_3_notifications");
        assert_eq!(publisher.publish("user_3_notifications", "back").await.unwrap(), 1);
        assert_eq!(again.recv().await.unwrap(), "back");
    }
}
