//! Recognizer that replays a fixed list of events.
//!
//! Used by local runs without a recognition gateway and by tests that need
//! a deterministic session.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{RecognitionEvent, RecognitionRequest, RecognitionSession, RecognizerError, SpeechRecognizer};

#[derive(Debug, Clone, Default)]
pub struct ScriptedRecognizer {
    events: Vec<RecognitionEvent>,
    start_failure: Option<String>,
    requests: Arc<Mutex<Vec<RecognitionRequest>>>,
}

impl ScriptedRecognizer {
    pub fn new(events: Vec<RecognitionEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// A recognizer whose sessions never start.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            start_failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecognitionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn start(&self, request: RecognitionRequest) -> Result<RecognitionSession, RecognizerError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(message) = &self.start_failure {
            return Err(RecognizerError::Unavailable(message.clone()));
        }

        let (tx, session) = RecognitionSession::channel(self.events.len().max(1));
        let events = self.events.clone();
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_pool::Credential;
    use ct_models::VideoId;
    use std::time::Duration;

    fn request() -> RecognitionRequest {
        RecognitionRequest {
            video_id: VideoId::from_string("v1"),
            credential: Credential::new("key-0", "secret", "eastus"),
            source_language: "en-US".to_string(),
            target_languages: vec![],
            phrase_hints: vec![],
            audio_path: String::new(),
            start_offset: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_replays_events_then_closes() {
        let recognizer = ScriptedRecognizer::new(vec![
            RecognitionEvent::SessionStarted,
            RecognitionEvent::SessionStopped,
        ]);
        let mut session = recognizer.start(request()).await.unwrap();

        assert_eq!(session.next().await, Some(RecognitionEvent::SessionStarted));
        assert_eq!(session.next().await, Some(RecognitionEvent::SessionStopped));
        assert_eq!(session.next().await, None);
        assert_eq!(recognizer.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_start() {
        let recognizer = ScriptedRecognizer::failing("down");
        assert!(matches!(
            recognizer.start(request()).await,
            Err(RecognizerError::Unavailable(_))
        ));
        assert_eq!(recognizer.requests().len(), 1);
    }
}
