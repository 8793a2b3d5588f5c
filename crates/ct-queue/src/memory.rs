//! In-process transport.
//!
//! Same delivery semantics as the Redis transport (FIFO, unacked messages
//! held by their consumer until acked, idle deliveries reclaimable by
//! peers) without a server. Used for local runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::transport::{Delivery, MessageProperties, QueueTransport};

/// A delivery handed to a consumer and not yet acked.
struct Pending {
    body: Vec<u8>,
    properties: MessageProperties,
    consumer: String,
    touched: Instant,
}

#[derive(Default)]
struct MemoryQueue {
    ready: VecDeque<(Vec<u8>, MessageProperties)>,
    unacked: HashMap<String, Pending>,
    notify: Arc<Notify>,
}

/// Queue transport backed by process memory.
#[derive(Default)]
pub struct MemoryTransport {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    next_tag: AtomicU64,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn queues(&self) -> QueueResult<MutexGuard<'_, HashMap<String, MemoryQueue>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        Ok(self.queues.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Deliveries handed out but not yet acked.
    pub fn unacked_len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn declare(&self, queue: &str) -> QueueResult<()> {
        self.queues()?.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>, properties: MessageProperties) -> QueueResult<()> {
        let mut queues = self.queues()?;
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::publish_failed(format!("queue {} not declared", queue)))?;
        q.ready.push_back((body, properties));
        q.notify.notify_one();
        Ok(())
    }

    async fn fetch(&self, queue: &str, consumer: &str, max: usize, wait: Duration) -> QueueResult<Vec<Delivery>> {
        let notify = {
            let mut queues = self.queues()?;
            let q = queues
                .get_mut(queue)
                .ok_or_else(|| QueueError::fetch_failed(format!("queue {} not declared", queue)))?;
            if q.ready.is_empty() {
                Some(Arc::clone(&q.notify))
            } else {
                None
            }
        };

        if let Some(notify) = notify {
            // A publish between the check and here leaves a permit, so this returns at once.
            let _ = tokio::time::timeout(wait, notify.notified()).await;
        }

        let mut queues = self.queues()?;
        let Some(q) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let mut deliveries = Vec::new();
        while deliveries.len() < max {
            let Some((body, properties)) = q.ready.pop_front() else {
                break;
            };
            let tag = self.next_tag.fetch_add(1, Ordering::SeqCst).to_string();
            q.unacked.insert(
                tag.clone(),
                Pending {
                    body: body.clone(),
                    properties: properties.clone(),
                    consumer: consumer.to_string(),
                    touched: Instant::now(),
                },
            );
            deliveries.push(Delivery { tag, body, properties });
        }
        Ok(deliveries)
    }

    async fn ack(&self, queue: &str, tag: &str) -> QueueResult<()> {
        let mut queues = self.queues()?;
        let removed = queues
            .get_mut(queue)
            .and_then(|q| q.unacked.remove(tag))
            .is_some();
        if !removed {
            debug!(queue, tag, "Ack for unknown delivery tag");
        }
        Ok(())
    }

    async fn purge(&self, queue: &str) -> QueueResult<u64> {
        let mut queues = self.queues()?;
        Ok(queues
            .get_mut(queue)
            .map(|q| {
                let n = q.ready.len() as u64;
                q.ready.clear();
                n
            })
            .unwrap_or(0))
    }

    async fn len(&self, queue: &str) -> QueueResult<u64> {
        let queues = self.queues()?;
        Ok(queues
            .get(queue)
            .map(|q| (q.ready.len() + q.unacked.len()) as u64)
            .unwrap_or(0))
    }

    async fn reclaim(&self, queue: &str, consumer: &str, min_idle: Duration, max: usize) -> QueueResult<Vec<Delivery>> {
        let mut queues = self.queues()?;
        let Some(q) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let mut stale: Vec<&String> = q
            .unacked
            .iter()
            .filter(|(_, p)| p.consumer != consumer && p.touched.elapsed() >= min_idle)
            .map(|(tag, _)| tag)
            .collect();
        stale.sort_by_key(|tag| tag.parse::<u64>().unwrap_or(u64::MAX));
        let stale: Vec<String> = stale.into_iter().take(max).cloned().collect();

        let mut deliveries = Vec::with_capacity(stale.len());
        for tag in stale {
            if let Some(pending) = q.unacked.get_mut(&tag) {
                debug!(queue, tag, from = %pending.consumer, to = consumer, "Reclaiming idle delivery");
                pending.consumer = consumer.to_string();
                pending.touched = Instant::now();
                deliveries.push(Delivery {
                    tag,
                    body: pending.body.clone(),
                    properties: pending.properties.clone(),
                });
            }
        }
        Ok(deliveries)
    }

    async fn touch(&self, queue: &str, consumer: &str, tag: &str) -> QueueResult<bool> {
        let mut queues = self.queues()?;
        let held = queues
            .get_mut(queue)
            .and_then(|q| q.unacked.get_mut(tag))
            .filter(|p| p.consumer == consumer);
        Ok(match held {
            Some(pending) => {
                pending.touched = Instant::now();
                true
            }
            None => false,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
