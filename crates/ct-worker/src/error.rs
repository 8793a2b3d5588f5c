//! Worker error types.

use thiserror::Error;

use ct_models::job::InvalidTransition;
use ct_queue::AlreadyInProgress;

use crate::key_pool::AlreadyBound;
use crate::recognizer::RecognizerError;
use crate::store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    AlreadyInProgress(#[from] AlreadyInProgress),

    #[error(transparent)]
    AlreadyBound(#[from] AlreadyBound),

    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job state error: {0}")]
    Transition(#[from] InvalidTransition),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// A duplicate delivery for a video that is already being processed here.
    pub fn is_already_in_progress(&self) -> bool {
        matches!(self, WorkerError::AlreadyInProgress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_in_progress_passthrough() {
        let err: WorkerError = AlreadyInProgress {
            queue: "Transcribe_0".to_string(),
            resource_id: "v1".to_string(),
        }
        .into();
        assert!(err.is_already_in_progress());
        assert_eq!(err.to_string(), "Transcribe_0: task already in progress for v1");

        assert!(!WorkerError::config_error("bad").is_already_in_progress());
    }
}
