//! Queue broker: publish and prefetch-bounded consume over a shared transport.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ct_models::{TaskParameters, TaskType};

use crate::envelope::JobMessage;
use crate::error::{QueueError, QueueResult};
use crate::memory::MemoryTransport;
use crate::redis_transport::RedisTransport;
use crate::transport::{Delivery, MessageProperties, QueueTransport};

/// Which transport backs the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Redis,
    Memory,
}

impl QueueBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Redis URL
    pub redis_url: String,
    /// Suffix appended to every queue name
    pub shard: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Default time a message may wait before it expires
    pub task_ttl: Duration,
    /// How long a single fetch blocks waiting for messages
    pub fetch_block: Duration,
    /// How often a consumer looks for deliveries abandoned by dead peers
    pub reclaim_interval: Duration,
    /// Minimum idle time before an unacked delivery is taken over
    pub reclaim_min_idle: Duration,
    /// How often an in-flight delivery's idle time is reset while its handler runs
    pub keepalive_interval: Duration,
    /// How long shutdown waits for in-flight handlers
    pub shutdown_grace: Duration,
    /// Drop waiting messages when a consumer starts
    pub purge_on_start: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            shard: "0".to_string(),
            consumer_group: "ct:workers".to_string(),
            task_ttl: Duration::from_secs(60 * 60),
            fetch_block: Duration::from_millis(1000),
            reclaim_interval: Duration::from_secs(60),
            reclaim_min_idle: Duration::from_secs(60 * 60),
            keepalive_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(60),
            purge_on_start: false,
        }
    }
}

impl QueueConfig {
    /// Keep-alive period actually used: at most half the reclaim idle
    /// threshold, never zero.
    pub fn effective_keepalive(&self) -> Duration {
        self.keepalive_interval
            .min(self.reclaim_min_idle / 2)
            .max(Duration::from_millis(1))
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: std::env::var("QUEUE_BACKEND")
                .ok()
                .and_then(|s| QueueBackend::parse(&s))
                .unwrap_or(defaults.backend),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            shard: std::env::var("QUEUE_SHARD").unwrap_or(defaults.shard),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            task_ttl: std::env::var("QUEUE_TASK_TTL_MINUTES")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|m| Duration::from_secs(m.max(1) * 60))
                .unwrap_or(defaults.task_ttl),
            fetch_block: std::env::var("QUEUE_FETCH_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_block),
            reclaim_interval: std::env::var("QUEUE_RECLAIM_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reclaim_interval),
            reclaim_min_idle: std::env::var("QUEUE_RECLAIM_MIN_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reclaim_min_idle),
            keepalive_interval: std::env::var("QUEUE_KEEPALIVE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.keepalive_interval),
            shutdown_grace: defaults.shutdown_grace,
            purge_on_start: std::env::var("QUEUE_PURGE_ON_START")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }
}

/// Handles one task type. Errors are logged by the broker; the message is acked either way.
#[async_trait]
pub trait TaskHandler<T>: Send + Sync + 'static {
    type Error: fmt::Display + Send + 'static;

    async fn handle(&self, data: T, parameters: TaskParameters) -> Result<(), Self::Error>;
}

struct ConsumerSlot {
    queue: String,
    stop: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

struct BrokerInner {
    transport: Arc<dyn QueueTransport>,
    config: QueueConfig,
    consumer_name: String,
    declared: Mutex<HashSet<String>>,
    consumers: Mutex<Vec<ConsumerSlot>>,
}

/// Process-wide broker. Cheap to clone; all clones share one transport.
#[derive(Clone)]
pub struct QueueBroker {
    inner: Arc<BrokerInner>,
}

/// A running consumer. Dropping the handle does not stop it.
#[derive(Debug)]
pub struct ConsumerHandle {
    queue: String,
    concurrency: usize,
    stop: Option<Arc<watch::Sender<bool>>>,
}

impl ConsumerHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// False when the consumer was started with zero concurrency.
    pub fn is_consuming(&self) -> bool {
        self.stop.is_some()
    }

    /// Stop fetching new messages. In-flight handlers run to completion.
    pub fn stop(&self) {
        if let Some(stop) = &self.stop {
            let _ = stop.send(true);
        }
    }
}

impl QueueBroker {
    pub fn new(transport: Arc<dyn QueueTransport>, config: QueueConfig) -> Self {
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        Self {
            inner: Arc::new(BrokerInner {
                transport,
                config,
                consumer_name,
                declared: Mutex::new(HashSet::new()),
                consumers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build the transport named by `config.backend`.
    pub fn from_config(config: QueueConfig) -> QueueResult<Self> {
        let transport: Arc<dyn QueueTransport> = match config.backend {
            QueueBackend::Redis => Arc::new(RedisTransport::new(&config.redis_url, config.consumer_group.clone())?),
            QueueBackend::Memory => Arc::new(MemoryTransport::new()),
        };
        info!("Queue broker using {:?} backend, shard {}", config.backend, config.shard);
        Ok(Self::new(transport, config))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Queue name for a task type on this broker's shard.
    pub fn queue_name(&self, task_type: TaskType) -> String {
        task_type.queue_name(&self.inner.config.shard)
    }

    async fn ensure_declared(&self, queue: &str) -> QueueResult<()> {
        let known = self
            .inner
            .declared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(queue);
        if known {
            return Ok(());
        }
        self.inner.transport.declare(queue).await?;
        self.inner
            .declared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(queue.to_string());
        Ok(())
    }

    /// Publish a persistent message. Failures are logged, never returned.
    pub async fn publish<T>(&self, queue: &str, message: &JobMessage<T>, ttl: Option<Duration>)
    where
        T: Serialize + fmt::Debug,
    {
        if let Err(e) = self.try_publish(queue, message, ttl).await {
            error!(queue, "Failed to publish {}: {}", message, e);
        }
    }

    /// Publish a persistent message and report the outcome.
    pub async fn try_publish<T>(&self, queue: &str, message: &JobMessage<T>, ttl: Option<Duration>) -> QueueResult<()>
    where
        T: Serialize + fmt::Debug,
    {
        self.ensure_declared(queue).await?;
        let body = message.to_bytes()?;
        let properties = MessageProperties::persistent(ttl.unwrap_or(self.inner.config.task_ttl));
        self.inner.transport.publish(queue, body, properties).await?;
        debug!(queue, "Published {}", message);
        Ok(())
    }

    /// Remove every waiting message from `queue`.
    pub async fn purge(&self, queue: &str) -> QueueResult<u64> {
        self.ensure_declared(queue).await?;
        let removed = self.inner.transport.purge(queue).await?;
        info!(queue, "Purged {} waiting messages", removed);
        Ok(removed)
    }

    /// Number of messages in `queue`, waiting or unacked.
    pub async fn len(&self, queue: &str) -> QueueResult<u64> {
        self.inner.transport.len(queue).await
    }

    /// Start delivering messages from `queue` to `handler`, at most
    /// `concurrency` at a time. Zero concurrency declares the queue only.
    pub async fn consume<T, H>(&self, queue: &str, handler: Arc<H>, concurrency: usize) -> QueueResult<ConsumerHandle>
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        H: TaskHandler<T>,
    {
        self.ensure_declared(queue).await?;

        if concurrency == 0 {
            info!(queue, "Concurrency is 0, not consuming");
            return Ok(ConsumerHandle {
                queue: queue.to_string(),
                concurrency,
                stop: None,
            });
        }

        if self.inner.config.purge_on_start {
            self.purge(queue).await?;
        }

        let (stop, stop_rx) = watch::channel(false);
        let stop = Arc::new(stop);
        let dispatcher = Dispatcher {
            transport: Arc::clone(&self.inner.transport),
            queue: queue.to_string(),
            consumer: self.inner.consumer_name.clone(),
            concurrency,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            config: self.inner.config.clone(),
        };

        info!(queue, consumer = %self.inner.consumer_name, concurrency, "Starting consumer");
        let task = tokio::spawn(dispatcher.run(handler, stop_rx));

        self.inner
            .consumers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ConsumerSlot {
                queue: queue.to_string(),
                stop: Arc::clone(&stop),
                task,
            });

        Ok(ConsumerHandle {
            queue: queue.to_string(),
            concurrency,
            stop: Some(stop),
        })
    }

    /// Stop all consumers, wait for in-flight handlers and close the transport.
    pub async fn shutdown(&self) {
        let slots: Vec<ConsumerSlot> = std::mem::take(&mut *self.inner.consumers.lock().unwrap_or_else(|e| e.into_inner()));

        for slot in &slots {
            let _ = slot.stop.send(true);
        }
        for slot in slots {
            if let Err(e) = slot.task.await {
                error!(queue = %slot.queue, "Consumer task ended abnormally: {}", e);
            }
        }

        self.inner.transport.close().await;
        info!("Queue broker shut down");
    }
}

struct Dispatcher {
    transport: Arc<dyn QueueTransport>,
    queue: String,
    consumer: String,
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
}

impl Dispatcher {
    async fn run<T, H>(self, handler: Arc<H>, mut stop: watch::Receiver<bool>)
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        H: TaskHandler<T>,
    {
        let mut last_reclaim = Instant::now();

        loop {
            if *stop.borrow() {
                break;
            }

            let available = self.semaphore.available_permits();
            if available == 0 {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    permit = Arc::clone(&self.semaphore).acquire_owned() => {
                        drop(permit);
                        continue;
                    }
                }
            }

            let fetched = tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                result = self.transport.fetch(&self.queue, &self.consumer, available, self.config.fetch_block) => result,
            };

            match fetched {
                Ok(deliveries) => {
                    if !deliveries.is_empty() {
                        debug!(queue = %self.queue, "Fetched {} messages", deliveries.len());
                    }
                    for delivery in deliveries {
                        self.dispatch(&handler, delivery).await;
                    }
                }
                Err(QueueError::Closed) => {
                    warn!(queue = %self.queue, "Transport closed, stopping consumer");
                    break;
                }
                Err(e) => {
                    error!(queue = %self.queue, "Error fetching messages: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }

            if last_reclaim.elapsed() >= self.config.reclaim_interval {
                last_reclaim = Instant::now();
                self.reclaim(&handler).await;
            }
        }

        info!(queue = %self.queue, "Waiting for in-flight tasks to complete...");
        let drained = tokio::time::timeout(
            self.config.shutdown_grace,
            self.semaphore.acquire_many(self.concurrency as u32),
        )
        .await;
        if drained.is_err() {
            warn!(queue = %self.queue, "In-flight tasks still running after shutdown grace period");
        }
        info!(queue = %self.queue, "Consumer stopped");
    }

    async fn reclaim<T, H>(&self, handler: &Arc<H>)
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        H: TaskHandler<T>,
    {
        let max = self.semaphore.available_permits();
        if max == 0 {
            return;
        }
        match self
            .transport
            .reclaim(&self.queue, &self.consumer, self.config.reclaim_min_idle, max)
            .await
        {
            Ok(deliveries) => {
                for delivery in deliveries {
                    self.dispatch(handler, delivery).await;
                }
            }
            Err(e) => warn!(queue = %self.queue, "Failed to reclaim pending messages: {}", e),
        }
    }

    async fn ack(&self, tag: &str) {
        if let Err(e) = self.transport.ack(&self.queue, tag).await {
            error!(queue = %self.queue, "Failed to ack message {}: {}", tag, e);
        }
    }

    /// Decode and hand one delivery to the handler in its own task.
    async fn dispatch<T, H>(&self, handler: &Arc<H>, delivery: Delivery)
    where
        T: DeserializeOwned + fmt::Debug + Send + 'static,
        H: TaskHandler<T>,
    {
        if delivery.properties.is_expired(Utc::now()) {
            warn!(queue = %self.queue, tag = %delivery.tag, "Message expired before delivery, dropping");
            self.ack(&delivery.tag).await;
            return;
        }

        let message = match JobMessage::<T>::from_bytes(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                warn!(queue = %self.queue, tag = %delivery.tag, "Failed to decode message: {}", e);
                self.ack(&delivery.tag).await;
                return;
            }
        };

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(queue = %self.queue, "Semaphore closed, leaving message {} unacked", delivery.tag);
                return;
            }
        };

        let transport = Arc::clone(&self.transport);
        let queue = self.queue.clone();
        let consumer = self.consumer.clone();
        let keepalive = self.config.effective_keepalive();
        let handler = Arc::clone(handler);

        tokio::spawn(async move {
            let _permit = permit;
            let label = message.to_string();
            info!(queue = %queue, "Started {}", label);

            let JobMessage { data, parameters } = message;
            let mut work = tokio::spawn(async move { handler.handle(data, parameters).await });

            let mut heartbeat = tokio::time::interval(keepalive);
            heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            heartbeat.tick().await;
            let outcome = loop {
                tokio::select! {
                    outcome = &mut work => break outcome,
                    _ = heartbeat.tick() => {
                        match transport.touch(&queue, &consumer, &delivery.tag).await {
                            Ok(true) => {}
                            Ok(false) => warn!(queue = %queue, tag = %delivery.tag, "Delivery was taken over by another consumer"),
                            Err(e) => warn!(queue = %queue, tag = %delivery.tag, "Failed to refresh delivery: {}", e),
                        }
                    }
                }
            };

            match outcome {
                Ok(Ok(())) => info!(queue = %queue, "Completed {}", label),
                Ok(Err(e)) => error!(queue = %queue, "Task failed {}: {}", label, e),
                Err(e) if e.is_panic() => error!(queue = %queue, "Task panicked {}", label),
                Err(e) => error!(queue = %queue, "Task aborted {}: {}", label, e),
            }

            if let Err(e) = transport.ack(&queue, &delivery.tag).await {
                error!(queue = %queue, "Failed to ack message {}: {}", delivery.tag, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskHandler<String> for Counting {
        type Error = String;

        async fn handle(&self, data: String, _parameters: TaskParameters) -> Result<(), String> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if data == "bad" {
                return Err("bad input".to_string());
            }
            if data == "panic" {
                panic!("handler panic");
            }
            Ok(())
        }
    }

    fn memory_broker() -> (QueueBroker, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let config = QueueConfig {
            backend: QueueBackend::Memory,
            fetch_block: Duration::from_millis(20),
            ..QueueConfig::default()
        };
        (QueueBroker::new(transport.clone(), config), transport)
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(QueueBackend::parse("Redis"), Some(QueueBackend::Redis));
        assert_eq!(QueueBackend::parse("memory"), Some(QueueBackend::Memory));
        assert_eq!(QueueBackend::parse("rabbit"), None);
    }

    #[test]
    fn test_queue_name_uses_shard() {
        let (broker, _) = memory_broker();
        assert_eq!(broker.queue_name(TaskType::Transcribe), "Transcribe_0");
    }

    #[tokio::test]
    async fn test_failed_and_panicking_handlers_still_ack() {
        let (broker, transport) = memory_broker();
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Counting { seen: seen.clone() });

        for data in ["ok", "bad", "panic"] {
            broker.publish("q", &JobMessage::new(data.to_string()), None).await;
        }

        broker.consume::<String, _>("q", handler, 2).await.unwrap();

        let s = seen.clone();
        wait_for(move || s.load(Ordering::SeqCst) == 3).await;
        let t = transport.clone();
        wait_for(move || t.unacked_len("q") == 0).await;

        assert_eq!(broker.len("q").await.unwrap(), 0);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_expired_and_malformed_messages_are_dropped() {
        let (broker, transport) = memory_broker();
        let seen = Arc::new(AtomicUsize::new(0));

        transport.declare("q").await.unwrap();
        let mut stale = MessageProperties::persistent(Duration::from_secs(60));
        stale.published_at = Utc::now() - chrono::Duration::minutes(5);
        transport
            .publish("q", JobMessage::new("old".to_string()).to_bytes().unwrap(), stale)
            .await
            .unwrap();
        transport
            .publish("q", b"not json".to_vec(), MessageProperties::persistent(Duration::from_secs(60)))
            .await
            .unwrap();

        broker
            .consume::<String, _>("q", Arc::new(Counting { seen: seen.clone() }), 1)
            .await
            .unwrap();

        for _ in 0..200 {
            if transport.len("q").await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.len("q").await.unwrap(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_concurrency_does_not_consume() {
        let (broker, _) = memory_broker();
        broker.publish("q", &JobMessage::new("ok".to_string()), None).await;

        let seen = Arc::new(AtomicUsize::new(0));
        let handle = broker
            .consume::<String, _>("q", Arc::new(Counting { seen: seen.clone() }), 0)
            .await
            .unwrap();

        assert!(!handle.is_consuming());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(broker.len("q").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_swallowed() {
        let (broker, _) = memory_broker();
        broker.shutdown().await;

        broker.publish("q", &JobMessage::new("late".to_string()), None).await;
        let result = broker.try_publish("q", &JobMessage::new("late".to_string()), None).await;
        assert!(matches!(result, Err(QueueError::Closed)));
    }

    struct Slow {
        seen: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl TaskHandler<String> for Slow {
        type Error = String;

        async fn handle(&self, _data: String, _parameters: TaskParameters) -> Result<(), String> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    fn reclaiming_config() -> QueueConfig {
        QueueConfig {
            backend: QueueBackend::Memory,
            fetch_block: Duration::from_millis(10),
            reclaim_interval: Duration::from_millis(10),
            reclaim_min_idle: Duration::from_millis(80),
            keepalive_interval: Duration::from_millis(15),
            ..QueueConfig::default()
        }
    }

    #[test]
    fn test_effective_keepalive() {
        let config = QueueConfig::default();
        assert_eq!(config.effective_keepalive(), Duration::from_secs(60));

        let config = QueueConfig {
            reclaim_min_idle: Duration::from_secs(10),
            ..QueueConfig::default()
        };
        assert_eq!(config.effective_keepalive(), Duration::from_secs(5));

        let config = QueueConfig {
            reclaim_min_idle: Duration::ZERO,
            ..QueueConfig::default()
        };
        assert_eq!(config.effective_keepalive(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_abandoned_delivery_is_reclaimed_once() {
        let transport = Arc::new(MemoryTransport::new());
        transport.declare("q").await.unwrap();
        transport
            .publish(
                "q",
                JobMessage::new("orphan".to_string()).to_bytes().unwrap(),
                MessageProperties::persistent(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        // A consumer that fetched the message and then died
        let taken = transport.fetch("q", "worker-gone", 1, Duration::from_millis(10)).await.unwrap();
        assert_eq!(taken.len(), 1);

        let broker = QueueBroker::new(transport.clone(), reclaiming_config());
        let seen = Arc::new(AtomicUsize::new(0));
        broker
            .consume::<String, _>("q", Arc::new(Counting { seen: seen.clone() }), 1)
            .await
            .unwrap();

        let t = transport.clone();
        wait_for(move || t.unacked_len("q") == 0).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(transport.len("q").await.unwrap(), 0);
        broker.shutdown().await;
    }

    #[tokio::test]
    async fn test_running_delivery_is_not_reclaimed_by_peer() {
        let transport = Arc::new(MemoryTransport::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Slow {
            seen: seen.clone(),
            delay: Duration::from_millis(400),
        });

        let first = QueueBroker::new(transport.clone(), reclaiming_config());
        let second = QueueBroker::new(transport.clone(), reclaiming_config());
        first.consume::<String, _>("q", handler.clone(), 1).await.unwrap();
        second.consume::<String, _>("q", handler, 1).await.unwrap();

        first.publish("q", &JobMessage::new("lecture".to_string()), None).await;

        let s = seen.clone();
        wait_for(move || s.load(Ordering::SeqCst) >= 1).await;
        let t = transport.clone();
        wait_for(move || t.unacked_len("q") == 0).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        first.shutdown().await;
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_purge_on_start() {
        let transport = Arc::new(MemoryTransport::new());
        let config = QueueConfig {
            backend: QueueBackend::Memory,
            purge_on_start: true,
            fetch_block: Duration::from_millis(20),
            ..QueueConfig::default()
        };
        let broker = QueueBroker::new(transport, config);
        broker.publish("q", &JobMessage::new("stale".to_string()), None).await;

        let seen = Arc::new(AtomicUsize::new(0));
        broker
            .consume::<String, _>("q", Arc::new(Counting { seen: seen.clone() }), 1)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        broker.shutdown().await;
    }
}
