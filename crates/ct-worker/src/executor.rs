//! Queue-facing task handlers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use ct_models::{TaskParameters, TaskType, VideoId};
use ct_queue::TaskHandler;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::orchestrator::TranscriptionOrchestrator;

/// Handles `Transcribe` tasks. The payload is the video id.
#[derive(Clone)]
pub struct TranscriptionHandler {
    orchestrator: Arc<TranscriptionOrchestrator>,
}

impl TranscriptionHandler {
    pub fn new(orchestrator: Arc<TranscriptionOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<TranscriptionOrchestrator> {
        &self.orchestrator
    }
}

#[async_trait]
impl TaskHandler<String> for TranscriptionHandler {
    type Error = WorkerError;

    async fn handle(&self, data: String, parameters: TaskParameters) -> WorkerResult<()> {
        let task_type = TaskType::Transcribe.as_str();
        metrics::record_job_consumed(task_type);

        let video_id = VideoId::from_string(data);
        match self.orchestrator.process(&video_id, &parameters).await {
            Ok(outcome) => {
                debug!(video_id = %video_id, ?outcome, "Transcription task handled");
                Ok(())
            }
            Err(e) if e.is_already_in_progress() => {
                info!(video_id = %video_id, "{}", e);
                Ok(())
            }
            Err(e) => {
                metrics::record_job_failed(task_type);
                Err(e)
            }
        }
    }
}
