//! Prometheus metrics for the task engine.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install Prometheus exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_CONSUMED_TOTAL: &str = "ct_jobs_consumed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "ct_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "ct_jobs_failed_total";
    pub const JOBS_SKIPPED_TOTAL: &str = "ct_jobs_skipped_total";
    pub const JOB_DURATION_SECONDS: &str = "ct_job_duration_seconds";

    // Caption metrics
    pub const CAPTIONS_PERSISTED_TOTAL: &str = "ct_captions_persisted_total";
    pub const UTTERANCES_REJECTED_TOTAL: &str = "ct_utterances_rejected_total";

    // Key pool metrics
    pub const KEY_POOL_LOAD: &str = "ct_key_pool_load";
}

pub fn record_job_consumed(task_type: &str) {
    let labels = [("type", task_type.to_string())];
    counter!(names::JOBS_CONSUMED_TOTAL, &labels).increment(1);
}

/// Record a job that reached a terminal state.
pub fn record_job_completed(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_failed(task_type: &str) {
    let labels = [("type", task_type.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_job_skipped(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_SKIPPED_TOTAL, &labels).increment(1);
}

pub fn record_captions_persisted(language: &str, count: usize) {
    let labels = [("language", language.to_string())];
    counter!(names::CAPTIONS_PERSISTED_TOTAL, &labels).increment(count as u64);
}

pub fn record_utterance_rejected() {
    counter!(names::UTTERANCES_REJECTED_TOTAL).increment(1);
}

/// Update the load gauge of one credential.
pub fn set_key_load(key_id: &str, load: u32) {
    let labels = [("key", key_id.to_string())];
    gauge!(names::KEY_POOL_LOAD, &labels).set(load as f64);
}
