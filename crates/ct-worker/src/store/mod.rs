//! Persistence of videos, captions and job records.

mod memory;
mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

use ct_models::{Caption, TranscriptionJob, VideoId, VideoRecord};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Storage the transcription pipeline reads from and writes to.
///
/// Captions are append-only per `(video, language)`; a resumed run only adds
/// captions past what is already stored.
#[async_trait]
pub trait CaptionStore: Send + Sync {
    async fn put_video(&self, video: &VideoRecord) -> StoreResult<()>;

    async fn load_video(&self, id: &VideoId) -> StoreResult<VideoRecord>;

    /// Stored captions for `language`, ordered by index.
    async fn existing_captions(&self, id: &VideoId, language: &str) -> StoreResult<Vec<Caption>>;

    async fn append_captions(&self, id: &VideoId, language: &str, captions: &[Caption]) -> StoreResult<()>;

    async fn set_transcription_status(&self, id: &VideoId, status: &str) -> StoreResult<()>;

    async fn load_job(&self, id: &VideoId) -> StoreResult<Option<TranscriptionJob>>;

    async fn save_job(&self, job: &TranscriptionJob) -> StoreResult<()>;
}
