//! Transcription task engine.
//!
//! Consumes transcription jobs from the queue, leases a recognition
//! credential, streams recognized utterances through caption alignment and
//! persists the captions as they arrive.

pub mod aligner;
pub mod captions;
pub mod config;
pub mod error;
pub mod executor;
pub mod key_pool;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod recognizer;
pub mod store;

pub use config::{StoreBackend, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::TranscriptionHandler;
pub use key_pool::{AlreadyBound, Credential, KeyLease, KeyPool};
pub use orchestrator::{JobOutcome, OrchestratorSettings, SkipReason, TranscriptionOrchestrator};
