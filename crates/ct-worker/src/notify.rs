//! Operator notifications for failures that need a human.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{WorkerError, WorkerResult};

#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    /// Deliver `message`. Delivery failures are logged, never returned.
    async fn notify(&self, message: &str);
}

/// Writes notifications to the error log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl OperatorNotifier for LogNotifier {
    async fn notify(&self, message: &str) {
        error!(operator_alert = true, "{}", message);
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts notifications to a chat webhook as `{"text": ...}`.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> WorkerResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build webhook client: {}", e)))?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl OperatorNotifier for WebhookNotifier {
    async fn notify(&self, message: &str) {
        error!(operator_alert = true, "{}", message);

        let result = self
            .http
            .post(&self.url)
            .json(&WebhookPayload { text: message })
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            warn!("Failed to deliver operator notification: {}", e);
        }
    }
}
