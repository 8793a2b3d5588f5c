//! Caption records.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A persisted caption line.
///
/// Indices are 1-based and contiguous within one transcription language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    /// Position within the transcription
    pub index: u32,
    /// Start time in the original (untrimmed) media
    pub begin: Duration,
    /// End time in the original (untrimmed) media
    pub end: Duration,
    /// Caption text
    pub text: String,
}

impl Caption {
    pub fn new(index: u32, begin: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            index,
            begin,
            end,
            text: text.into(),
        }
    }

    /// Length of the caption on screen.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.begin)
    }
}

/// Latest end time across `captions`, or zero when empty.
pub fn last_end(captions: &[Caption]) -> Duration {
    captions.iter().map(|c| c.end).max().unwrap_or(Duration::ZERO)
}
