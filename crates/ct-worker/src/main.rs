//! Transcription worker binary.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{error, info, warn};

use ct_models::TaskType;
use ct_queue::{ActiveTaskRegistry, QueueBroker, QueueConfig};
use ct_worker::logging::init_tracing;
use ct_worker::metrics::init_metrics;
use ct_worker::notify::{LogNotifier, OperatorNotifier, WebhookNotifier};
use ct_worker::recognizer::{HttpRecognizer, SpeechRecognizer};
use ct_worker::store::{CaptionStore, MemoryStore, RedisStore};
use ct_worker::{
    Credential, KeyPool, OrchestratorSettings, StoreBackend, TranscriptionHandler, TranscriptionOrchestrator,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting ct-worker");

    let config = WorkerConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("Worker config: {:?}", config);
    info!("Queue config: {:?}", queue_config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
        info!("Serving metrics on {}", addr);
    }

    let keys = if config.mock_recognition && config.subscription_keys.trim().is_empty() {
        warn!("Mock recognition without subscription keys; using a placeholder credential");
        KeyPool::new(vec![Credential::new("mock", "", "local")])?
    } else {
        KeyPool::from_spec(&config.subscription_keys)?
    };

    let store: Arc<dyn CaptionStore> = match config.store_backend {
        StoreBackend::Redis => Arc::new(RedisStore::new(&config.redis_url).context("Failed to open caption store")?),
        StoreBackend::Memory => {
            warn!("Using the in-memory caption store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let recognizer: Arc<dyn SpeechRecognizer> = Arc::new(HttpRecognizer::new(
        config.recognizer_endpoint.clone(),
        config.recognition_channel_capacity,
    )?);

    let notifier: Arc<dyn OperatorNotifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };

    let broker = QueueBroker::from_config(queue_config)?;
    let queue = broker.queue_name(TaskType::Transcribe);

    let orchestrator = TranscriptionOrchestrator::new(
        ActiveTaskRegistry::new(queue.clone()),
        keys,
        recognizer,
        store,
        notifier,
        OrchestratorSettings::from_config(&config),
    );
    let handler = Arc::new(TranscriptionHandler::new(Arc::new(orchestrator)));

    let consumer = broker
        .consume::<String, _>(&queue, handler, config.transcription_concurrency)
        .await
        .with_context(|| format!("Failed to start consumer on {}", queue))?;
    info!(
        "Consuming {} with concurrency {}",
        consumer.queue(),
        consumer.concurrency()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");

    broker.shutdown().await;
    info!("ct-worker stopped");
    Ok(())
}
