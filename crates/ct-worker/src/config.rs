//! Worker configuration.

use std::fmt;
use std::net::SocketAddr;

use ct_models::language::ENGLISH_AMERICAN;

/// Where captions, videos and job records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Transcription jobs handled concurrently (0 disables the consumer)
    pub transcription_concurrency: usize,
    /// `key,region` pairs separated by `;`
    pub subscription_keys: String,
    /// Recognition dialect of the audio
    pub source_language: String,
    /// Requested caption languages
    pub translations: Vec<String>,
    /// Write placeholder captions instead of calling the recognizer
    pub mock_recognition: bool,
    /// Recognition gateway URL
    pub recognizer_endpoint: String,
    /// Capacity of the per-session event channel
    pub recognition_channel_capacity: usize,
    /// Operator webhook; failures are only logged when unset
    pub notify_webhook_url: Option<String>,
    /// Soft maximum length of a caption line
    pub caption_max_chars: usize,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
    pub store_backend: StoreBackend,
    /// Redis URL for the caption store
    pub redis_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            transcription_concurrency: 2,
            subscription_keys: String::new(),
            source_language: ENGLISH_AMERICAN.to_string(),
            translations: vec![ENGLISH_AMERICAN.to_string()],
            mock_recognition: false,
            recognizer_endpoint: "http://localhost:5000/recognize".to_string(),
            recognition_channel_capacity: 64,
            notify_webhook_url: None,
            caption_max_chars: 40,
            metrics_addr: None,
            store_backend: StoreBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transcription_concurrency: std::env::var("TRANSCRIPTION_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transcription_concurrency),
            subscription_keys: std::env::var("AZURE_SUBSCRIPTION_KEYS").unwrap_or_default(),
            source_language: std::env::var("SPEECH_RECOGNITION_DIALECT")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.source_language),
            translations: std::env::var("LANGUAGE_TRANSLATIONS")
                .ok()
                .map(|s| parse_languages(&s))
                .filter(|langs| !langs.is_empty())
                .unwrap_or(defaults.translations),
            mock_recognition: std::env::var("MOCK_RECOGNITION")
                .map(|s| s == "MOCK")
                .unwrap_or(false),
            recognizer_endpoint: std::env::var("RECOGNIZER_ENDPOINT").unwrap_or(defaults.recognizer_endpoint),
            recognition_channel_capacity: std::env::var("RECOGNITION_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.recognition_channel_capacity),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            caption_max_chars: std::env::var("CAPTION_MAX_CHARS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.caption_max_chars),
            metrics_addr: std::env::var("METRICS_ADDR").ok().and_then(|s| s.parse().ok()),
            store_backend: match std::env::var("STORE_BACKEND").map(|s| s.to_lowercase()).as_deref() {
                Ok("memory") => StoreBackend::Memory,
                _ => StoreBackend::Redis,
            },
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
        }
    }

    /// Source language followed by the requested translations, without duplicates.
    pub fn output_languages(&self) -> Vec<String> {
        let mut languages = vec![self.source_language.clone()];
        for language in &self.translations {
            if !languages.contains(language) {
                languages.push(language.clone());
            }
        }
        languages
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("transcription_concurrency", &self.transcription_concurrency)
            .field("subscription_keys", &"<redacted>")
            .field("source_language", &self.source_language)
            .field("translations", &self.translations)
            .field("mock_recognition", &self.mock_recognition)
            .field("recognizer_endpoint", &self.recognizer_endpoint)
            .field("recognition_channel_capacity", &self.recognition_channel_capacity)
            .field("notify_webhook_url", &self.notify_webhook_url.as_ref().map(|_| "<set>"))
            .field("caption_max_chars", &self.caption_max_chars)
            .field("metrics_addr", &self.metrics_addr)
            .field("store_backend", &self.store_backend)
            .field("redis_url", &self.redis_url)
            .finish()
    }
}

/// Split a comma separated language list, dropping blanks.
pub fn parse_languages(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_languages() {
        assert_eq!(parse_languages("en-US, es ,,ko"), vec!["en-US", "es", "ko"]);
        assert!(parse_languages(" , ").is_empty());
    }

    #[test]
    fn test_output_languages_dedup() {
        let config = WorkerConfig {
            translations: vec!["en-US".to_string(), "es".to_string()],
            ..WorkerConfig::default()
        };
        assert_eq!(config.output_languages(), vec!["en-US", "es"]);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = WorkerConfig {
            subscription_keys: "secret-key,eastus".to_string(),
            ..WorkerConfig::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("<redacted>"));
    }
}
