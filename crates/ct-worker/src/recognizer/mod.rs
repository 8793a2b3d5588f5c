//! Speech recognizer boundary.
//!
//! A recognition run is a [`RecognitionSession`]: a bounded channel of
//! [`RecognitionEvent`]s delivered in the order the service emits them and
//! consumed by a single task.

mod http;
mod payload;
mod scripted;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ct_models::language::{is_supported_recognition, is_supported_translation, short_code};
use ct_models::{Ticks, VideoId};

use crate::key_pool::Credential;

pub use http::HttpRecognizer;
pub use payload::{parse_detailed_result, PayloadError, RecognizedWord, Utterance};
pub use scripted::ScriptedRecognizer;

/// Estimated byte budget of the service's phrase list.
const PHRASE_LIST_BUDGET: usize = 1 << 16;

/// Errors starting a recognition session.
#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("Recognizer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Recognizer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Recognizer unavailable: {0}")]
    Unavailable(String),
}

/// Everything the service needs to transcribe one video.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub video_id: VideoId,
    pub credential: Credential,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub phrase_hints: Vec<String>,
    pub audio_path: String,
    /// Audio before this point is skipped; reported times are relative to it
    pub start_offset: Duration,
}

/// Why a session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    Error,
    EndOfStream,
}

/// Service error classification attached to a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationCode {
    NoError,
    AuthenticationFailure,
    BadRequest,
    TooManyRequests,
    Forbidden,
    ConnectionFailure,
    ServiceTimeout,
    ServiceError,
    ServiceUnavailable,
    RuntimeError,
}

impl CancellationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationCode::NoError => "NoError",
            CancellationCode::AuthenticationFailure => "AuthenticationFailure",
            CancellationCode::BadRequest => "BadRequest",
            CancellationCode::TooManyRequests => "TooManyRequests",
            CancellationCode::Forbidden => "Forbidden",
            CancellationCode::ConnectionFailure => "ConnectionFailure",
            CancellationCode::ServiceTimeout => "ServiceTimeout",
            CancellationCode::ServiceError => "ServiceError",
            CancellationCode::ServiceUnavailable => "ServiceUnavailable",
            CancellationCode::RuntimeError => "RuntimeError",
        }
    }

    /// Transient failures worth resuming from the high-water mark.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CancellationCode::ServiceTimeout | CancellationCode::ServiceUnavailable | CancellationCode::ConnectionFailure
        )
    }
}

impl fmt::Display for CancellationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal cancellation of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub reason: CancellationReason,
    pub code: CancellationCode,
    pub details: String,
}

impl Cancellation {
    pub fn error(code: CancellationCode, details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::Error,
            code,
            details: details.into(),
        }
    }

    pub fn end_of_stream() -> Self {
        Self {
            reason: CancellationReason::EndOfStream,
            code: CancellationCode::NoError,
            details: String::new(),
        }
    }

    /// The audio ran out; not a failure.
    pub fn is_end_of_stream(&self) -> bool {
        self.reason == CancellationReason::EndOfStream || self.code == CancellationCode::NoError
    }
}

/// One event of a recognition session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    SessionStarted,
    /// A recognized utterance, or the reason its payload was rejected
    Recognized(Result<Utterance, PayloadError>),
    /// Speech at `offset` could not be recognized
    NoMatch { offset: Ticks },
    Canceled(Cancellation),
    SessionStopped,
}

/// Receiving half of a recognition session.
#[derive(Debug)]
pub struct RecognitionSession {
    events: mpsc::Receiver<RecognitionEvent>,
}

impl RecognitionSession {
    /// Create a session and the sender a recognizer feeds it through.
    pub fn channel(capacity: usize) -> (mpsc::Sender<RecognitionEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { events: rx })
    }

    /// Next event; `None` once the recognizer has gone away.
    pub async fn next(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }
}

/// A remote speech recognition and translation service.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start(&self, request: RecognitionRequest) -> Result<RecognitionSession, RecognizerError>;
}

/// Split phrase hints on newlines, keeping as many as fit the phrase list budget.
///
/// Each phrase costs two bytes per character plus 16 bytes of overhead.
pub fn phrase_hints(raw: &str) -> Vec<String> {
    let mut used = 0usize;
    let mut phrases = Vec::new();
    for phrase in raw.split('\n').map(|p| p.trim_end_matches('\r')) {
        used += 2 * phrase.chars().count() + 16;
        if used >= PHRASE_LIST_BUDGET {
            info!("Phrase hints exceed the phrase list budget; ignoring the remainder");
            break;
        }
        if !phrase.is_empty() {
            phrases.push(phrase.to_string());
        }
    }
    phrases
}

/// Translation targets the service should produce for `source`.
///
/// Targets sharing the source's language are produced by recognition
/// itself; unsupported targets are dropped.
pub fn target_languages(source: &str, requested: &[String]) -> Vec<String> {
    if !is_supported_recognition(source) {
        error!("Unknown recognition language ({}); recognition may fail", source);
    }
    let source_code = short_code(source);
    let mut targets = Vec::new();
    for language in requested {
        if short_code(language) == source_code {
            continue;
        }
        if !is_supported_translation(language) {
            warn!("Skipping unsupported target {}", language);
            continue;
        }
        if !targets.contains(language) {
            info!("Adding target {}", language);
            targets.push(language.clone());
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_codes() {
        assert!(CancellationCode::ServiceTimeout.is_recoverable());
        assert!(CancellationCode::ServiceUnavailable.is_recoverable());
        assert!(CancellationCode::ConnectionFailure.is_recoverable());
        assert!(!CancellationCode::AuthenticationFailure.is_recoverable());
        assert!(!CancellationCode::NoError.is_recoverable());
    }

    #[test]
    fn test_code_wire_names() {
        let code: CancellationCode = serde_json::from_str("\"ServiceTimeout\"").unwrap();
        assert_eq!(code, CancellationCode::ServiceTimeout);
        assert_eq!(code.to_string(), "ServiceTimeout");
    }

    #[test]
    fn test_phrase_hints_budget() {
        assert_eq!(phrase_hints("alpha\n\nbeta\r\n"), vec!["alpha", "beta"]);

        // 2 * 1000 + 16 bytes each: 32 phrases fit under 64 KiB, the 33rd does not
        let long = "x".repeat(1000);
        let raw = vec![long.as_str(); 40].join("\n");
        assert_eq!(phrase_hints(&raw).len(), 32);
    }

    #[test]
    fn test_target_languages() {
        let requested: Vec<String> = ["en-US", "en", "es", "xx-YY", "es", "zh-Hans"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(target_languages("en-US", &requested), vec!["es", "zh-Hans"]);
    }

    #[tokio::test]
    async fn test_session_preserves_order() {
        let (tx, mut session) = RecognitionSession::channel(4);
        tokio::spawn(async move {
            tx.send(RecognitionEvent::SessionStarted).await.ok();
            tx.send(RecognitionEvent::NoMatch { offset: 5 }).await.ok();
            tx.send(RecognitionEvent::SessionStopped).await.ok();
        });

        assert_eq!(session.next().await, Some(RecognitionEvent::SessionStarted));
        assert_eq!(session.next().await, Some(RecognitionEvent::NoMatch { offset: 5 }));
        assert_eq!(session.next().await, Some(RecognitionEvent::SessionStopped));
        assert_eq!(session.next().await, None);
    }
}
