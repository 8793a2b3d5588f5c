//! Task types and the parameters carried alongside every queued task.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of background task.
///
/// Discriminants are stable: they are stored alongside job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    PeriodicCheck = 1,
    DownloadAllPlaylists = 2,
    DownloadPlaylistInfo = 3,
    DownloadMedia = 4,
    ConvertMedia = 5,
    Transcribe = 6,
    ProcessVideo = 7,
    Aggregator = 8,
    GenerateVTTFile = 9,
    QueueAwaker = 10,
    SceneDetection = 11,
    UpdateBoxToken = 12,
    CreateBoxToken = 13,
    UpdateOffering = 14,
    ReTranscribePlaylist = 15,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::PeriodicCheck => "PeriodicCheck",
            TaskType::DownloadAllPlaylists => "DownloadAllPlaylists",
            TaskType::DownloadPlaylistInfo => "DownloadPlaylistInfo",
            TaskType::DownloadMedia => "DownloadMedia",
            TaskType::ConvertMedia => "ConvertMedia",
            TaskType::Transcribe => "Transcribe",
            TaskType::ProcessVideo => "ProcessVideo",
            TaskType::Aggregator => "Aggregator",
            TaskType::GenerateVTTFile => "GenerateVTTFile",
            TaskType::QueueAwaker => "QueueAwaker",
            TaskType::SceneDetection => "SceneDetection",
            TaskType::UpdateBoxToken => "UpdateBoxToken",
            TaskType::CreateBoxToken => "CreateBoxToken",
            TaskType::UpdateOffering => "UpdateOffering",
            TaskType::ReTranscribePlaylist => "ReTranscribePlaylist",
        }
    }

    /// Durable queue name for this task type on the given shard.
    pub fn queue_name(&self, shard: &str) -> String {
        format!("{}_{}", self.as_str(), shard)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-task options published with the task payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParameters {
    /// Redo the work even if it looks complete
    #[serde(default)]
    pub force: bool,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TaskParameters {
    /// Parameters with `force` set.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }

    /// Attach a metadata object.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Display for TaskParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskParameters(force={}; metadata={})", self.force, self.metadata)
    }
}
