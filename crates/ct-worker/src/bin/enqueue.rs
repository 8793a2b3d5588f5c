//! Publish a transcription task.
//!
//! ```text
//! ct-enqueue <VIDEO_ID> [--force] [--ttl-minutes N] [--audio-path PATH]
//! ```

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use ct_models::{TaskParameters, TaskType, VideoId, VideoRecord};
use ct_queue::{JobMessage, QueueBroker, QueueConfig};
use ct_worker::logging::init_tracing;
use ct_worker::store::{CaptionStore, RedisStore};
use ct_worker::{StoreBackend, WorkerConfig};

#[derive(Debug, Parser)]
#[command(name = "ct-enqueue", about = "Publish a transcription task")]
struct Args {
    /// Video to transcribe
    video_id: String,

    /// Transcribe even if the video is already transcribed
    #[arg(long)]
    force: bool,

    /// Message time-to-live in minutes (defaults to QUEUE_TASK_TTL_MINUTES)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    ttl_minutes: Option<u64>,

    /// Register the video in the caption store with this audio file first
    #[arg(long)]
    audio_path: Option<String>,

    /// Newline separated phrase hints stored with a registered video
    #[arg(long, requires = "audio_path")]
    phrase_hints: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let video_id = VideoId::from_string(args.video_id);

    if let Some(audio_path) = args.audio_path {
        let config = WorkerConfig::from_env();
        if config.store_backend == StoreBackend::Memory {
            bail!("--audio-path needs a shared store; STORE_BACKEND is memory");
        }
        let store = RedisStore::new(&config.redis_url).context("Failed to open caption store")?;
        let video = VideoRecord::new(video_id.clone(), audio_path)
            .with_phrase_hints(args.phrase_hints.unwrap_or_default());
        store.put_video(&video).await.context("Failed to register video")?;
        info!(video_id = %video_id, "Registered video");
    }

    let broker = QueueBroker::from_config(QueueConfig::from_env())?;
    let queue = broker.queue_name(TaskType::Transcribe);

    let parameters = if args.force {
        TaskParameters::forced()
    } else {
        TaskParameters::default()
    };
    let message = JobMessage::new(video_id.to_string()).with_parameters(parameters);
    let ttl = args.ttl_minutes.map(|m| Duration::from_secs(m * 60));

    broker
        .try_publish(&queue, &message, ttl)
        .await
        .with_context(|| format!("Failed to publish to {}", queue))?;
    info!("Published {} to {}", message, queue);

    broker.shutdown().await;
    Ok(())
}
