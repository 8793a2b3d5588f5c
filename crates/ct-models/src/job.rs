//! Transcription job records and their state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::VideoId;

/// Attempt counter bump for every run that reaches the recognizer.
pub const ATTEMPT_STEP: u32 = 10;

/// Attempt counter bump for a hard failure.
///
/// Large enough that retry heuristics looking at the counter leave the
/// video alone until an operator intervenes.
pub const FAILURE_ATTEMPT_STEP: u32 = 1000;

/// Sub-phase of a running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Resolving the video, existing captions and phrase hints
    StartingUp,
    /// Streaming recognition, aligning and persisting utterances
    Processing,
    /// Committing status and metadata
    Finalizing,
}

/// Lifecycle of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Created,
    Queued,
    Running(RunPhase),
    Succeeded,
    /// Session finished but some utterances could not be captioned
    SucceededWithErrors,
    /// Recoverable recognizer error; resume from the high-water mark
    Cancelled,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Queued => "queued",
            JobState::Running(RunPhase::StartingUp) => "starting_up",
            JobState::Running(RunPhase::Processing) => "processing",
            JobState::Running(RunPhase::Finalizing) => "finalizing",
            JobState::Succeeded => "succeeded",
            JobState::SucceededWithErrors => "succeeded_with_errors",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::SucceededWithErrors | JobState::Cancelled | JobState::Failed
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running(_))
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Terminal jobs may be queued again (resume or force re-run). Any
    /// running phase may fail.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        use RunPhase::*;

        match (*self, next) {
            (Created, Queued) => true,
            (Queued, Running(StartingUp)) => true,
            (Running(StartingUp), Running(Processing)) => true,
            (Running(StartingUp), Succeeded) => true,
            (Running(Processing), Running(Finalizing)) => true,
            (Running(Finalizing), Succeeded | SucceededWithErrors | Cancelled | Failed) => true,
            (Running(_), Failed) => true,
            (from, Queued) => from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// Persisted progress of the transcription of one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionJob {
    /// Video being transcribed
    pub video_id: VideoId,
    /// Current state
    #[serde(default)]
    pub state: JobState,
    /// Attempt counter (see [`ATTEMPT_STEP`] and [`FAILURE_ATTEMPT_STEP`])
    #[serde(default)]
    pub attempts: u32,
    /// Last recognizer error code (`NoError` on a clean run)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    /// Latest persisted caption end per output language
    #[serde(default)]
    pub last_success_time: BTreeMap<String, Duration>,
    /// Error message of the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl TranscriptionJob {
    pub fn new(video_id: impl Into<VideoId>) -> Self {
        let now = Utc::now();
        Self {
            video_id: video_id.into(),
            state: JobState::Created,
            attempts: 0,
            status_code: None,
            last_success_time: BTreeMap::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Bring a job that is not running to `Running(StartingUp)`.
    ///
    /// A job found in a running phase was abandoned by a crashed process;
    /// it is failed first so the restart is still a legal path.
    pub fn begin_run(&mut self) -> Result<(), InvalidTransition> {
        if self.state.is_running() {
            self.transition(JobState::Failed)?;
        }
        if self.state != JobState::Queued {
            self.transition(JobState::Queued)?;
        }
        self.transition(JobState::Running(RunPhase::StartingUp))
    }

    /// Count one recognition attempt.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(ATTEMPT_STEP);
        self.updated_at = Utc::now();
    }

    /// Mark a hard failure from whatever state the job is in.
    pub fn record_hard_failure(&mut self, error: impl Into<String>) {
        self.state = JobState::Failed;
        self.attempts = self.attempts.saturating_add(FAILURE_ATTEMPT_STEP);
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Raise the high-water mark for `language` to `end` if it is later.
    pub fn advance_high_water(&mut self, language: &str, end: Duration) {
        let entry = self
            .last_success_time
            .entry(language.to_string())
            .or_insert(Duration::ZERO);
        if end > *entry {
            *entry = end;
        }
    }

    pub fn high_water(&self, language: &str) -> Duration {
        self.last_success_time
            .get(language)
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}
