//! Transcription tasks delivered through the queue broker.

use std::sync::Arc;
use std::time::Duration;

use ct_models::{JobState, TaskParameters, TaskType, VideoId, VideoRecord};
use ct_queue::{ActiveTaskRegistry, JobMessage, MemoryTransport, QueueBackend, QueueBroker, QueueConfig, TaskHandler};
use ct_worker::notify::LogNotifier;
use ct_worker::recognizer::{Cancellation, RecognitionEvent, ScriptedRecognizer};
use ct_worker::store::{CaptionStore, MemoryStore};
use ct_worker::{Credential, KeyPool, OrchestratorSettings, TranscriptionHandler, TranscriptionOrchestrator};

fn handler(store: &MemoryStore, queue: &str) -> Arc<TranscriptionHandler> {
    let orchestrator = TranscriptionOrchestrator::new(
        ActiveTaskRegistry::new(queue),
        KeyPool::new(vec![Credential::new("key-0", "secret", "eastus")]).unwrap(),
        Arc::new(ScriptedRecognizer::new(vec![
            RecognitionEvent::SessionStarted,
            RecognitionEvent::Canceled(Cancellation::end_of_stream()),
        ])),
        Arc::new(store.clone()),
        Arc::new(LogNotifier),
        OrchestratorSettings::default(),
    );
    Arc::new(TranscriptionHandler::new(Arc::new(orchestrator)))
}

#[tokio::test]
async fn test_published_task_is_transcribed() {
    let store = MemoryStore::new();
    store.put_video(&VideoRecord::new("v1", "/data/v1.wav")).await.unwrap();

    let transport = Arc::new(MemoryTransport::new());
    let broker = QueueBroker::new(
        transport.clone(),
        QueueConfig {
            backend: QueueBackend::Memory,
            fetch_block: Duration::from_millis(20),
            ..QueueConfig::default()
        },
    );
    let queue = broker.queue_name(TaskType::Transcribe);
    broker
        .consume::<String, _>(&queue, handler(&store, &queue), 2)
        .await
        .unwrap();
    broker.publish(&queue, &JobMessage::new("v1".to_string()), None).await;

    let id = VideoId::from_string("v1");
    for _ in 0..300 {
        if store.job(&id).is_some_and(|job| job.state.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.job(&id).map(|job| job.state), Some(JobState::Succeeded));

    broker.shutdown().await;
    assert_eq!(transport.unacked_len(&queue), 0);
}

#[tokio::test]
async fn test_duplicate_delivery_is_handled() {
    let store = MemoryStore::new();
    store.put_video(&VideoRecord::new("v1", "/data/v1.wav")).await.unwrap();
    let handler = handler(&store, "Transcribe_0");

    let _running = handler.orchestrator().registry().register("v1").unwrap();
    let result = handler.handle("v1".to_string(), TaskParameters::default()).await;
    assert!(result.is_ok());
    assert!(store.job(&VideoId::from_string("v1")).is_none());
}

#[tokio::test]
async fn test_failures_are_returned_to_the_broker() {
    let store = MemoryStore::new();
    let handler = handler(&store, "Transcribe_0");

    let result = handler.handle("missing".to_string(), TaskParameters::default()).await;
    assert!(result.is_err());
}
