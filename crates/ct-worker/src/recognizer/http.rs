//! Recognizer reached over HTTP.
//!
//! The gateway accepts a JSON job description and streams back one JSON
//! event per line until the session ends.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ct_models::Ticks;

use super::payload::{parse_detailed_value, PayloadError};
use super::{
    Cancellation, CancellationCode, CancellationReason, RecognitionEvent, RecognitionRequest, RecognitionSession,
    RecognizerError, SpeechRecognizer,
};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    video_id: &'a str,
    region: &'a str,
    source_language: &'a str,
    target_languages: &'a [String],
    phrase_hints: &'a [String],
    audio_path: &'a str,
    start_offset_seconds: f64,
    word_level_timestamps: bool,
    output_format: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    SessionStarted,
    Recognized {
        result: serde_json::Value,
    },
    NoMatch {
        #[serde(default)]
        offset: Ticks,
    },
    Canceled {
        reason: CancellationReason,
        code: CancellationCode,
        #[serde(default)]
        details: String,
    },
    SessionStopped,
}

/// Decode one line of the event stream. Blank lines yield nothing.
pub(crate) fn decode_line(line: &[u8]) -> Option<RecognitionEvent> {
    let line = std::str::from_utf8(line).map(str::trim).unwrap_or("");
    if line.is_empty() {
        return None;
    }
    let event = match serde_json::from_str::<WireEvent>(line) {
        Ok(WireEvent::SessionStarted) => RecognitionEvent::SessionStarted,
        Ok(WireEvent::Recognized { result }) => RecognitionEvent::Recognized(parse_detailed_value(result)),
        Ok(WireEvent::NoMatch { offset }) => RecognitionEvent::NoMatch { offset },
        Ok(WireEvent::Canceled { reason, code, details }) => {
            RecognitionEvent::Canceled(Cancellation { reason, code, details })
        }
        Ok(WireEvent::SessionStopped) => RecognitionEvent::SessionStopped,
        Err(e) => RecognitionEvent::Recognized(Err(PayloadError::Malformed(e.to_string()))),
    };
    Some(event)
}

fn is_terminal(event: &RecognitionEvent) -> bool {
    matches!(event, RecognitionEvent::Canceled(_) | RecognitionEvent::SessionStopped)
}

/// Recognizer backed by an HTTP gateway in front of the speech service.
#[derive(Debug, Clone)]
pub struct HttpRecognizer {
    http: Client,
    endpoint: String,
    channel_capacity: usize,
}

impl HttpRecognizer {
    pub fn new(endpoint: impl Into<String>, channel_capacity: usize) -> Result<Self, RecognizerError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("ct-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            channel_capacity,
        })
    }

    /// Forward stream lines as events until a terminal event or the stream ends.
    async fn pump(response: reqwest::Response, tx: mpsc::Sender<RecognitionEvent>, video_id: String) {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!(video_id = %video_id, "Recognition stream failed: {}", e);
                    let _ = tx
                        .send(RecognitionEvent::Canceled(Cancellation::error(
                            CancellationCode::ConnectionFailure,
                            e.to_string(),
                        )))
                        .await;
                    return;
                }
                None => break,
            };

            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(event) = decode_line(&line) {
                    let terminal = is_terminal(&event);
                    if tx.send(event).await.is_err() {
                        debug!(video_id = %video_id, "Session receiver dropped, closing stream");
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
            }
        }

        if let Some(event) = decode_line(&buffer) {
            let terminal = is_terminal(&event);
            if tx.send(event).await.is_err() || terminal {
                return;
            }
        }

        warn!(video_id = %video_id, "Recognition stream ended without a session end event");
        let _ = tx
            .send(RecognitionEvent::Canceled(Cancellation::error(
                CancellationCode::ConnectionFailure,
                "stream ended unexpectedly",
            )))
            .await;
    }
}

#[async_trait]
impl SpeechRecognizer for HttpRecognizer {
    async fn start(&self, request: RecognitionRequest) -> Result<RecognitionSession, RecognizerError> {
        let body = GatewayRequest {
            video_id: request.video_id.as_str(),
            region: &request.credential.region,
            source_language: &request.source_language,
            target_languages: &request.target_languages,
            phrase_hints: &request.phrase_hints,
            audio_path: &request.audio_path,
            start_offset_seconds: request.start_offset.as_secs_f64(),
            word_level_timestamps: true,
            output_format: "detailed",
        };

        info!(
            video_id = %request.video_id,
            key = %request.credential.id,
            targets = ?request.target_languages,
            "Starting recognition session"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(SUBSCRIPTION_KEY_HEADER, request.credential.api_key())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecognizerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, session) = RecognitionSession::channel(self.channel_capacity);
        tokio::spawn(Self::pump(response, tx, request.video_id.to_string()));
        Ok(session)
    }
}
