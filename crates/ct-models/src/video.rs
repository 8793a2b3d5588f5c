//! Video identity and the subset of video metadata the task engine reads.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transcription status stored on a video once recognition finished cleanly.
///
/// Any other value is the last recognizer error code.
pub const TRANSCRIBED_STATUS: &str = "NoError";

/// Unique identifier for a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video fields needed to start a transcription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Video ID
    pub id: VideoId,
    /// Path of the extracted audio track, as seen by the recognizer gateway
    pub audio_path: String,
    /// Last transcription status (`NoError` once complete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_status: Option<String>,
    /// Whether any playlist/media holding this video asked for recognition
    #[serde(default)]
    pub recognition_requested: bool,
    /// Newline separated phrase hints for the recognizer
    #[serde(default)]
    pub phrase_hints: String,
}

impl VideoRecord {
    pub fn new(id: impl Into<VideoId>, audio_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audio_path: audio_path.into(),
            transcription_status: None,
            recognition_requested: true,
            phrase_hints: String::new(),
        }
    }

    /// Set phrase hints.
    pub fn with_phrase_hints(mut self, hints: impl Into<String>) -> Self {
        self.phrase_hints = hints.into();
        self
    }

    /// Set whether recognition was requested.
    pub fn with_recognition_requested(mut self, requested: bool) -> Self {
        self.recognition_requested = requested;
        self
    }

    /// True once a transcription run finished without a recognizer error.
    pub fn is_transcribed(&self) -> bool {
        self.transcription_status.as_deref() == Some(TRANSCRIBED_STATUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_serializes_transparently() {
        let id = VideoId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_is_transcribed() {
        let mut video = VideoRecord::new("v1", "/data/v1.wav");
        assert!(!video.is_transcribed());

        video.transcription_status = Some("ServiceTimeout".into());
        assert!(!video.is_transcribed());

        video.transcription_status = Some(TRANSCRIBED_STATUS.into());
        assert!(video.is_transcribed());
    }
}
