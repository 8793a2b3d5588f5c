//! Redis-backed store.
//!
//! Layout:
//! - `ct:video:{id}` JSON video record
//! - `ct:captions:{id}:{language}` list of JSON captions in index order
//! - `ct:job:{id}` JSON job record

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use ct_models::{Caption, TranscriptionJob, VideoId, VideoRecord};

use super::{CaptionStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn video_key(id: &VideoId) -> String {
        format!("ct:video:{}", id)
    }

    fn captions_key(id: &VideoId, language: &str) -> String {
        format!("ct:captions:{}:{}", id, language)
    }

    fn job_key(id: &VideoId) -> String {
        format!("ct:job:{}", id)
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl CaptionStore for RedisStore {
    async fn put_video(&self, video: &VideoRecord) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(video)?;
        conn.set::<_, _, ()>(Self::video_key(&video.id), payload).await?;
        Ok(())
    }

    async fn load_video(&self, id: &VideoId) -> StoreResult<VideoRecord> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(Self::video_key(id)).await?;
        let payload = payload.ok_or_else(|| StoreError::NotFound(format!("video {}", id)))?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn existing_captions(&self, id: &VideoId, language: &str) -> StoreResult<Vec<Caption>> {
        let mut conn = self.connection().await?;
        let entries: Vec<String> = conn.lrange(Self::captions_key(id, language), 0, -1).await?;
        entries
            .iter()
            .map(|entry| serde_json::from_str(entry).map_err(StoreError::from))
            .collect()
    }

    async fn append_captions(&self, id: &VideoId, language: &str, captions: &[Caption]) -> StoreResult<()> {
        if captions.is_empty() {
            return Ok(());
        }
        let entries = captions
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(Self::captions_key(id, language), entries).await?;
        debug!(video_id = %id, language, count = captions.len(), "Appended captions");
        Ok(())
    }

    async fn set_transcription_status(&self, id: &VideoId, status: &str) -> StoreResult<()> {
        let mut video = self.load_video(id).await?;
        video.transcription_status = Some(status.to_string());
        self.put_video(&video).await
    }

    async fn load_job(&self, id: &VideoId) -> StoreResult<Option<TranscriptionJob>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.get(Self::job_key(id)).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn save_job(&self, job: &TranscriptionJob) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;
        conn.set::<_, _, ()>(Self::job_key(&job.video_id), payload).await?;
        Ok(())
    }
}
