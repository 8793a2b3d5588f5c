//! In-process store for local runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use ct_models::{Caption, TranscriptionJob, VideoId, VideoRecord};

use super::{CaptionStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    videos: HashMap<VideoId, VideoRecord>,
    captions: HashMap<(VideoId, String), Vec<Caption>>,
    jobs: HashMap<VideoId, TranscriptionJob>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_appends: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `append_captions` fail.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn captions(&self, id: &VideoId, language: &str) -> Vec<Caption> {
        self.lock()
            .captions
            .get(&(id.clone(), language.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn job(&self, id: &VideoId) -> Option<TranscriptionJob> {
        self.lock().jobs.get(id).cloned()
    }

    pub fn video(&self, id: &VideoId) -> Option<VideoRecord> {
        self.lock().videos.get(id).cloned()
    }
}

#[async_trait]
impl CaptionStore for MemoryStore {
    async fn put_video(&self, video: &VideoRecord) -> StoreResult<()> {
        self.lock().videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn load_video(&self, id: &VideoId) -> StoreResult<VideoRecord> {
        self.video(id)
            .ok_or_else(|| StoreError::NotFound(format!("video {}", id)))
    }

    async fn existing_captions(&self, id: &VideoId, language: &str) -> StoreResult<Vec<Caption>> {
        Ok(self.captions(id, language))
    }

    async fn append_captions(&self, id: &VideoId, language: &str, captions: &[Caption]) -> StoreResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("caption writes are failing".to_string()));
        }
        self.lock()
            .captions
            .entry((id.clone(), language.to_string()))
            .or_default()
            .extend_from_slice(captions);
        Ok(())
    }

    async fn set_transcription_status(&self, id: &VideoId, status: &str) -> StoreResult<()> {
        let mut state = self.lock();
        let video = state
            .videos
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("video {}", id)))?;
        video.transcription_status = Some(status.to_string());
        Ok(())
    }

    async fn load_job(&self, id: &VideoId) -> StoreResult<Option<TranscriptionJob>> {
        Ok(self.job(id))
    }

    async fn save_job(&self, job: &TranscriptionJob) -> StoreResult<()> {
        self.lock().jobs.insert(job.video_id.clone(), job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_captions_append_in_order() {
        let store = MemoryStore::new();
        let id = VideoId::from_string("v1");
        let first = Caption::new(1, Duration::ZERO, Duration::from_secs(1), "a");
        let second = Caption::new(2, Duration::from_secs(1), Duration::from_secs(2), "b");

        store.append_captions(&id, "en-US", &[first.clone()]).await.unwrap();
        store.append_captions(&id, "en-US", &[second.clone()]).await.unwrap();

        assert_eq!(store.existing_captions(&id, "en-US").await.unwrap(), vec![first, second]);
        assert!(store.existing_captions(&id, "es").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_requires_video() {
        let store = MemoryStore::new();
        let id = VideoId::from_string("v1");
        assert!(matches!(
            store.set_transcription_status(&id, "NoError").await,
            Err(StoreError::NotFound(_))
        ));

        store.put_video(&VideoRecord::new("v1", "/a.wav")).await.unwrap();
        store.set_transcription_status(&id, "NoError").await.unwrap();
        assert!(store.load_video(&id).await.unwrap().is_transcribed());
    }

    #[tokio::test]
    async fn test_fail_appends() {
        let store = MemoryStore::new();
        store.set_fail_appends(true);
        let result = store
            .append_captions(&VideoId::from_string("v1"), "en-US", &[])
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
