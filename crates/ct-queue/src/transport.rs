//! Transport seam between the broker and the message store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueueResult;

/// Properties attached to a message at publish time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    /// Survive a broker restart
    pub persistent: bool,
    /// Drop the message if it is still waiting this long after publish
    pub expiration: Option<Duration>,
    /// Publish timestamp
    pub published_at: DateTime<Utc>,
}

impl MessageProperties {
    pub fn persistent(expiration: Duration) -> Self {
        Self {
            persistent: true,
            expiration: Some(expiration),
            published_at: Utc::now(),
        }
    }

    /// Expiration rendered as milliseconds, the unit stored on the wire.
    pub fn expiration_ms(&self) -> Option<u64> {
        self.expiration.map(|ttl| ttl.as_millis() as u64)
    }

    /// A message expires only while it waits; once delivered it stays until acked.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiration {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
                self.published_at
                    .checked_add_signed(ttl)
                    .map(|deadline| now > deadline)
                    .unwrap_or(false)
            }
            None => false,
        }
    }
}

/// A message handed to a consumer and awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Transport-specific tag used to ack this delivery
    pub tag: String,
    /// Encoded envelope
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

/// Durable queue operations the broker needs.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Create the durable queue if it does not exist. Idempotent.
    async fn declare(&self, queue: &str) -> QueueResult<()>;

    async fn publish(&self, queue: &str, body: Vec<u8>, properties: MessageProperties) -> QueueResult<()>;

    /// Take up to `max` new messages, waiting at most `wait` for the first one.
    async fn fetch(&self, queue: &str, consumer: &str, max: usize, wait: Duration) -> QueueResult<Vec<Delivery>>;

    async fn ack(&self, queue: &str, tag: &str) -> QueueResult<()>;

    /// Remove every waiting message; returns how many were removed.
    async fn purge(&self, queue: &str) -> QueueResult<u64>;

    /// Number of messages in the queue.
    async fn len(&self, queue: &str) -> QueueResult<u64>;

    /// Take over deliveries held by another consumer that has not touched
    /// them for at least `min_idle`.
    async fn reclaim(
        &self,
        _queue: &str,
        _consumer: &str,
        _min_idle: Duration,
        _max: usize,
    ) -> QueueResult<Vec<Delivery>> {
        Ok(Vec::new())
    }

    /// Reset the idle time of a delivery this consumer still holds, so peers
    /// do not reclaim it while its handler runs. Returns false when the
    /// delivery is no longer held by `consumer`.
    async fn touch(&self, _queue: &str, _consumer: &str, _tag: &str) -> QueueResult<bool> {
        Ok(true)
    }

    /// Release the connection. Later calls fail with `QueueError::Closed`.
    async fn close(&self);
}
