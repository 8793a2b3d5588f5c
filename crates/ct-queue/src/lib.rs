//! Durable task queue for the task engine.
//!
//! This crate provides:
//! - Task publishing with persistence and per-message TTL
//! - Prefetch-bounded concurrent consumption with ack-after-handler
//! - Redis Streams and in-memory transports
//! - A per-process registry that keeps one task per resource in flight

pub mod broker;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod redis_transport;
pub mod registry;
pub mod transport;

pub use broker::{ConsumerHandle, QueueBackend, QueueBroker, QueueConfig, TaskHandler};
pub use envelope::JobMessage;
pub use error::{QueueError, QueueResult};
pub use memory::MemoryTransport;
pub use redis_transport::RedisTransport;
pub use registry::{ActiveTaskGuard, ActiveTaskRegistry, AlreadyInProgress};
pub use transport::{Delivery, MessageProperties, QueueTransport};
