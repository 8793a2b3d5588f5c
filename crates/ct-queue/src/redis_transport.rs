//! Redis Streams transport.
//!
//! Each queue is a stream with one consumer group. Publish is `XADD`, fetch
//! is `XREADGROUP`, ack is `XACK` followed by `XDEL`. Deliveries left pending
//! by a crashed consumer are taken over with `XCLAIM`; a live consumer
//! resets the idle time of its in-flight entries with a zero-idle `XCLAIM`
//! to itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::transport::{Delivery, MessageProperties, QueueTransport};

const FIELD_BODY: &str = "body";
const FIELD_PERSISTENT: &str = "persistent";
const FIELD_EXPIRATION: &str = "expiration";
const FIELD_PUBLISHED_AT: &str = "published_at";

/// Queue transport backed by Redis Streams.
pub struct RedisTransport {
    client: redis::Client,
    group: String,
    /// Shared channel for publish, ack and declare. Blocking reads use their own connection.
    channel: Mutex<Option<MultiplexedConnection>>,
    closed: AtomicBool,
}

impl RedisTransport {
    /// Open a client. No connection is made until first use.
    pub fn new(redis_url: &str, group: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            group: group.into(),
            channel: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Lock the shared channel, opening the connection on first use.
    ///
    /// Commands are issued while the guard is held, one writer at a time.
    async fn channel(&self) -> QueueResult<MutexGuard<'_, Option<MultiplexedConnection>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let mut guard = self.channel.lock().await;
        if guard.is_none() {
            let conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| QueueError::connection_failed(e.to_string()))?;
            info!("Opened Redis queue channel");
            *guard = Some(conn);
        }
        Ok(guard)
    }

    fn decode_entry(entry: &StreamId) -> Option<Delivery> {
        let body: Vec<u8> = entry.get(FIELD_BODY)?;
        let persistent = entry
            .get::<String>(FIELD_PERSISTENT)
            .map(|v| v == "1")
            .unwrap_or(true);
        let expiration = entry
            .get::<String>(FIELD_EXPIRATION)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis);
        let published_at = entry
            .get::<String>(FIELD_PUBLISHED_AT)
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(Delivery {
            tag: entry.id.clone(),
            body,
            properties: MessageProperties {
                persistent,
                expiration,
                published_at,
            },
        })
    }

    async fn collect(&self, queue: &str, entries: Vec<StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            match Self::decode_entry(&entry) {
                Some(delivery) => deliveries.push(delivery),
                None => {
                    warn!(queue, id = %entry.id, "Stream entry has no body, dropping");
                    self.ack(queue, &entry.id).await.ok();
                }
            }
        }
        deliveries
    }
}

#[async_trait]
impl QueueTransport for RedisTransport {
    async fn declare(&self, queue: &str) -> QueueResult<()> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group {} on {}", self.group, queue),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {} on {}", self.group, queue);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>, properties: MessageProperties) -> QueueResult<()> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(queue)
            .arg("*")
            .arg(FIELD_BODY)
            .arg(body)
            .arg(FIELD_PERSISTENT)
            .arg(if properties.persistent { "1" } else { "0" })
            .arg(FIELD_PUBLISHED_AT)
            .arg(properties.published_at.to_rfc3339());
        if let Some(ms) = properties.expiration_ms() {
            cmd.arg(FIELD_EXPIRATION).arg(ms.to_string());
        }

        let id: String = cmd
            .query_async(conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;
        debug!("Published message {} to {}", id, queue);
        Ok(())
    }

    async fn fetch(&self, queue: &str, consumer: &str, max: usize, wait: Duration) -> QueueResult<Vec<Delivery>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::fetch_failed(e.to_string()))?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(consumer)
            .arg("COUNT")
            .arg(max)
            .arg("BLOCK")
            .arg(wait.as_millis() as u64)
            .arg("STREAMS")
            .arg(queue)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        Ok(self.collect(queue, entries).await)
    }

    async fn ack(&self, queue: &str, tag: &str) -> QueueResult<()> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;

        redis::cmd("XACK")
            .arg(queue)
            .arg(&self.group)
            .arg(tag)
            .query_async::<()>(conn)
            .await?;

        redis::cmd("XDEL")
            .arg(queue)
            .arg(tag)
            .query_async::<()>(conn)
            .await?;

        debug!("Acknowledged message {} on {}", tag, queue);
        Ok(())
    }

    async fn purge(&self, queue: &str) -> QueueResult<u64> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;
        let removed: u64 = redis::cmd("XTRIM")
            .arg(queue)
            .arg("MAXLEN")
            .arg(0)
            .query_async(conn)
            .await?;
        Ok(removed)
    }

    async fn len(&self, queue: &str) -> QueueResult<u64> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;
        let len: u64 = conn.xlen(queue).await?;
        Ok(len)
    }

    async fn reclaim(&self, queue: &str, consumer: &str, min_idle: Duration, max: usize) -> QueueResult<Vec<Delivery>> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(queue)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(max)
            .query_async(conn)
            .await?;

        let stale: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.consumer != consumer && p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| p.id)
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(queue)
            .arg(&self.group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(&stale)
            .query_async(conn)
            .await?;

        drop(channel);

        if !claimed.ids.is_empty() {
            info!("Reclaimed {} stale deliveries on {}", claimed.ids.len(), queue);
        }
        Ok(self.collect(queue, claimed.ids).await)
    }

    async fn touch(&self, queue: &str, consumer: &str, tag: &str) -> QueueResult<bool> {
        let mut channel = self.channel().await?;
        let conn = channel.as_mut().ok_or(QueueError::Closed)?;

        let owned: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(queue)
            .arg(&self.group)
            .arg(tag)
            .arg(tag)
            .arg(1)
            .arg(consumer)
            .query_async(&mut *conn)
            .await?;
        if owned.ids.is_empty() {
            return Ok(false);
        }

        // XCLAIM to the current owner resets the idle time; JUSTID leaves the delivery count alone
        let _: Vec<String> = redis::cmd("XCLAIM")
            .arg(queue)
            .arg(&self.group)
            .arg(consumer)
            .arg(0)
            .arg(tag)
            .arg("JUSTID")
            .query_async(conn)
            .await?;
        Ok(true)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.channel.lock().await.take().is_some() {
            info!("Closed Redis queue channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_decode_entry() {
        let mut map = HashMap::new();
        map.insert(FIELD_BODY.to_string(), redis::Value::BulkString(b"{}".to_vec()));
        map.insert(FIELD_PERSISTENT.to_string(), redis::Value::BulkString(b"1".to_vec()));
        map.insert(FIELD_EXPIRATION.to_string(), redis::Value::BulkString(b"1500".to_vec()));
        map.insert(
            FIELD_PUBLISHED_AT.to_string(),
            redis::Value::BulkString(b"2024-01-01T00:00:00+00:00".to_vec()),
        );
        let entry = StreamId {
            id: "1-0".to_string(),
            map,
        };

        let delivery = RedisTransport::decode_entry(&entry).unwrap();
        assert_eq!(delivery.tag, "1-0");
        assert_eq!(delivery.body, b"{}");
        assert!(delivery.properties.persistent);
        assert_eq!(delivery.properties.expiration, Some(Duration::from_millis(1500)));
        assert_eq!(delivery.properties.published_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_decode_entry_without_body() {
        let entry = StreamId {
            id: "1-0".to_string(),
            map: HashMap::new(),
        };
        assert!(RedisTransport::decode_entry(&entry).is_none());
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let transport = RedisTransport::new("redis://localhost:6379", "workers").unwrap();
        transport.close().await;
        assert!(matches!(transport.declare("q").await, Err(QueueError::Closed)));
        assert!(matches!(
            transport.fetch("q", "c", 1, Duration::from_millis(1)).await,
            Err(QueueError::Closed)
        ));
    }
}
