//! Shared data models for the ClassTranscribe task engine.
//!
//! This crate provides Serde-serializable types for:
//! - Task types and task parameters carried by queue messages
//! - Captions and timed words
//! - Recognition/translation language tables
//! - Transcription job state and its lifecycle

pub mod caption;
pub mod job;
pub mod language;
pub mod task;
pub mod time;
pub mod video;
pub mod word;

// Re-export common types
pub use caption::Caption;
pub use job::{JobState, RunPhase, TranscriptionJob};
pub use task::{TaskParameters, TaskType};
pub use time::{duration_to_ticks, ticks_to_duration, Ticks, TICKS_PER_MILLISECOND, TICKS_PER_SECOND};
pub use video::{VideoId, VideoRecord, TRANSCRIBED_STATUS};
pub use word::Word;
