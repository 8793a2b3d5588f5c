//! Transcription of one video, end to end.
//!
//! A run registers the video with the queue's registry, works out where each
//! output language left off, leases a recognition credential, and persists
//! captions utterance by utterance while the recognition session streams.
//! The session's terminal event decides the job's final state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, Instrument};

use ct_models::caption::last_end;
use ct_models::{
    ticks_to_duration, Caption, JobState, RunPhase, TaskParameters, TranscriptionJob, VideoId, VideoRecord,
    TRANSCRIBED_STATUS,
};
use ct_queue::ActiveTaskRegistry;

use crate::aligner::{align_utterance, rebase_words};
use crate::captions::{interpolate_captions, mock_captions, words_to_captions};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::key_pool::KeyPool;
use crate::logging::JobLogger;
use crate::metrics;
use crate::notify::OperatorNotifier;
use crate::recognizer::{
    phrase_hints, target_languages, Cancellation, CancellationCode, RecognitionEvent, RecognitionRequest,
    RecognitionSession, SpeechRecognizer, Utterance,
};
use crate::store::CaptionStore;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Recognition dialect of the audio
    pub source_language: String,
    /// Requested caption languages
    pub translations: Vec<String>,
    /// Write placeholder captions instead of recognizing
    pub mock: bool,
    pub caption_max_chars: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            source_language: config.source_language.clone(),
            translations: config.translations.clone(),
            mock: config.mock_recognition,
            caption_max_chars: config.caption_max_chars,
        }
    }
}

/// Why a delivery was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Captions are complete and the job was not forced
    AlreadyTranscribed,
    /// No downstream consumer asked for recognition
    NotRequested,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyTranscribed => "already_transcribed",
            SkipReason::NotRequested => "not_requested",
        }
    }
}

/// Result of a successful `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Skipped(SkipReason),
    /// Placeholder captions were written
    Mocked,
    /// The recognition session ran; the job ended in this terminal state
    Finished(JobState),
}

/// How the recognition session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Completed,
    /// Recoverable service error; resume from the high-water mark
    Interrupted(CancellationCode),
    Fatal(Cancellation),
}

impl SessionEnd {
    fn classify(cancellation: Cancellation) -> Self {
        if cancellation.is_end_of_stream() {
            SessionEnd::Completed
        } else if cancellation.code.is_recoverable() {
            SessionEnd::Interrupted(cancellation.code)
        } else {
            SessionEnd::Fatal(cancellation)
        }
    }

    fn status_code(&self) -> &'static str {
        match self {
            SessionEnd::Completed => TRANSCRIBED_STATUS,
            SessionEnd::Interrupted(code) => code.as_str(),
            SessionEnd::Fatal(cancellation) => cancellation.code.as_str(),
        }
    }
}

/// Where one output language resumes.
#[derive(Debug, Clone, Copy)]
struct LanguageProgress {
    /// Index of the next caption written
    next_index: u32,
    /// Utterances beginning before this point are already captioned
    start_after: Duration,
}

#[derive(Debug, Default)]
struct SessionTally {
    utterances: usize,
    captions: usize,
    rejected: usize,
}

/// Drives transcription jobs for one worker process.
pub struct TranscriptionOrchestrator {
    registry: ActiveTaskRegistry,
    keys: KeyPool,
    recognizer: Arc<dyn SpeechRecognizer>,
    store: Arc<dyn CaptionStore>,
    notifier: Arc<dyn OperatorNotifier>,
    settings: OrchestratorSettings,
}

impl TranscriptionOrchestrator {
    pub fn new(
        registry: ActiveTaskRegistry,
        keys: KeyPool,
        recognizer: Arc<dyn SpeechRecognizer>,
        store: Arc<dyn CaptionStore>,
        notifier: Arc<dyn OperatorNotifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            keys,
            recognizer,
            store,
            notifier,
            settings,
        }
    }

    pub fn registry(&self) -> &ActiveTaskRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Transcribe `video_id`.
    ///
    /// Fails with `AlreadyInProgress` when this process is already working
    /// on the video. Any other error has been recorded on the job (as a hard
    /// failure) before it is returned.
    pub async fn process(&self, video_id: &VideoId, parameters: &TaskParameters) -> WorkerResult<JobOutcome> {
        let _registration = self.registry.register(video_id.as_str())?;
        let logger = JobLogger::new(video_id, "transcription");
        let span = logger.create_span();
        self.process_registered(video_id, parameters, &logger)
            .instrument(span)
            .await
    }

    async fn process_registered(
        &self,
        video_id: &VideoId,
        parameters: &TaskParameters,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        let video = self.store.load_video(video_id).await?;

        if video.is_transcribed() && !parameters.force {
            logger.log_progress("Already transcribed, skipping");
            metrics::record_job_skipped(SkipReason::AlreadyTranscribed.as_str());
            return Ok(JobOutcome::Skipped(SkipReason::AlreadyTranscribed));
        }
        if !video.recognition_requested {
            logger.log_progress("Recognition not requested, skipping");
            metrics::record_job_skipped(SkipReason::NotRequested.as_str());
            return Ok(JobOutcome::Skipped(SkipReason::NotRequested));
        }

        let mut job = match self.store.load_job(video_id).await? {
            Some(job) => job,
            None => TranscriptionJob::new(video_id.clone()),
        };

        logger.log_start(&format!("attempts={} force={}", job.attempts, parameters.force));
        let started = Instant::now();

        match self.run(&video, &mut job, logger).await {
            Ok(outcome) => {
                let label = match outcome {
                    JobOutcome::Finished(state) => state.as_str(),
                    JobOutcome::Mocked => "mocked",
                    JobOutcome::Skipped(reason) => reason.as_str(),
                };
                metrics::record_job_completed(label, started.elapsed().as_secs_f64());
                logger.log_completion(&format!(
                    "{} in {:.1}s (attempts={})",
                    label,
                    started.elapsed().as_secs_f64(),
                    job.attempts
                ));
                Ok(outcome)
            }
            Err(e) => {
                logger.log_error(&format!("Transcription failed: {}", e));
                job.record_hard_failure(e.to_string());
                if let Err(save_err) = self.store.save_job(&job).await {
                    logger.log_error(&format!("Failed to record failure: {}", save_err));
                }
                Err(e)
            }
        }
    }

    async fn run(&self, video: &VideoRecord, job: &mut TranscriptionJob, logger: &JobLogger) -> WorkerResult<JobOutcome> {
        let video_id = &video.id;
        job.begin_run()?;

        let source = self.settings.source_language.clone();
        let targets = target_languages(&source, &self.settings.translations);
        let languages: Vec<String> = std::iter::once(source.clone()).chain(targets.iter().cloned()).collect();

        if self.settings.mock {
            self.write_placeholders(video_id, &languages).await?;
            self.store.set_transcription_status(video_id, TRANSCRIBED_STATUS).await?;
            job.status_code = Some(TRANSCRIBED_STATUS.to_string());
            job.transition(JobState::Succeeded)?;
            self.store.save_job(job).await?;
            logger.log_progress("Mock recognition wrote placeholder captions");
            return Ok(JobOutcome::Mocked);
        }

        job.record_attempt();
        self.store.save_job(job).await?;

        let mut progress = BTreeMap::new();
        for language in &languages {
            let existing = self.store.existing_captions(video_id, language).await?;
            let start_after = last_end(&existing);
            job.advance_high_water(language, start_after);
            progress.insert(
                language.clone(),
                LanguageProgress {
                    next_index: existing.len() as u32 + 1,
                    start_after,
                },
            );
        }
        let restart_offset = progress
            .values()
            .map(|p| p.start_after)
            .min()
            .unwrap_or(Duration::ZERO);
        if restart_offset > Duration::ZERO {
            logger.log_progress(&format!("Resuming at {:?}", restart_offset));
        }

        job.transition(JobState::Running(RunPhase::Processing))?;

        let lease = self.keys.lease(video_id.as_str())?;
        let request = RecognitionRequest {
            video_id: video_id.clone(),
            credential: lease.credential().clone(),
            source_language: source,
            target_languages: targets,
            phrase_hints: phrase_hints(&video.phrase_hints),
            audio_path: video.audio_path.clone(),
            start_offset: restart_offset,
        };
        let mut session = self.recognizer.start(request).await?;
        let (end, tally) = self
            .drive(&mut session, job, &mut progress, restart_offset, logger)
            .await?;
        drop(lease);

        logger.log_progress(&format!(
            "Session ended: utterances={} captions={} rejected={}",
            tally.utterances, tally.captions, tally.rejected
        ));

        job.transition(JobState::Running(RunPhase::Finalizing))?;
        let status = end.status_code();
        self.store.set_transcription_status(video_id, status).await?;
        job.status_code = Some(status.to_string());

        let terminal = match &end {
            SessionEnd::Completed if tally.rejected > 0 => JobState::SucceededWithErrors,
            SessionEnd::Completed => JobState::Succeeded,
            SessionEnd::Interrupted(code) => {
                logger.log_warning(&format!(
                    "Recognition interrupted ({}); resume from {:?}",
                    code, job.last_success_time
                ));
                JobState::Cancelled
            }
            SessionEnd::Fatal(cancellation) => {
                let message = format!(
                    "Transcription of {} failed: {} {}",
                    video_id, cancellation.code, cancellation.details
                );
                logger.log_error(&message);
                self.notifier.notify(&message).await;
                job.error_message = Some(message);
                JobState::Failed
            }
        };
        job.transition(terminal)?;
        self.store.save_job(job).await?;

        Ok(JobOutcome::Finished(terminal))
    }

    /// Consume session events until the session ends.
    async fn drive(
        &self,
        session: &mut RecognitionSession,
        job: &mut TranscriptionJob,
        progress: &mut BTreeMap<String, LanguageProgress>,
        restart_offset: Duration,
        logger: &JobLogger,
    ) -> WorkerResult<(SessionEnd, SessionTally)> {
        let video_id = job.video_id.clone();
        let mut tally = SessionTally::default();

        while let Some(event) = session.next().await {
            match event {
                RecognitionEvent::SessionStarted => logger.log_progress("Recognition session started"),
                RecognitionEvent::Recognized(Ok(utterance)) => {
                    if utterance.is_empty() {
                        debug!(offset = utterance.offset, "Skipping empty utterance");
                        continue;
                    }
                    if utterance.words.is_empty() {
                        logger.log_warning(&format!("Utterance has no word timings: {}", utterance.text));
                        tally.rejected += 1;
                        metrics::record_utterance_rejected();
                        continue;
                    }
                    tally.utterances += 1;
                    let written = self
                        .persist_utterance(&video_id, job, progress, &utterance, restart_offset)
                        .await?;
                    if written == 0 {
                        continue;
                    }
                    tally.captions += written;
                    self.store.save_job(job).await?;
                }
                RecognitionEvent::Recognized(Err(e)) => {
                    logger.log_warning(&format!("Rejected recognition result: {}", e));
                    tally.rejected += 1;
                    metrics::record_utterance_rejected();
                }
                RecognitionEvent::NoMatch { offset } => {
                    logger.log_progress(&format!(
                        "No speech recognized at {:?}",
                        ticks_to_duration(offset) + restart_offset
                    ));
                }
                RecognitionEvent::Canceled(cancellation) => {
                    debug!(code = %cancellation.code, details = %cancellation.details, "Session canceled");
                    return Ok((SessionEnd::classify(cancellation), tally));
                }
                RecognitionEvent::SessionStopped => {
                    logger.log_progress("Recognition session stopped");
                    break;
                }
            }
        }

        Ok((SessionEnd::Completed, tally))
    }

    /// Align one utterance and append its captions for every output language.
    ///
    /// Returns the number of captions written.
    async fn persist_utterance(
        &self,
        video_id: &VideoId,
        job: &mut TranscriptionJob,
        progress: &mut BTreeMap<String, LanguageProgress>,
        utterance: &Utterance,
        restart_offset: Duration,
    ) -> WorkerResult<usize> {
        let max_chars = self.settings.caption_max_chars;
        let begin = ticks_to_duration(utterance.offset) + restart_offset;
        let end = ticks_to_duration(utterance.end()) + restart_offset;
        let mut written = 0;

        let source = self.settings.source_language.as_str();
        if let Some(state) = progress.get_mut(source) {
            if begin >= state.start_after {
                let mut words = utterance.timed_words();
                rebase_words(utterance.offset, &mut words);
                let aligned = align_utterance(&utterance.text, &words);
                let captions = words_to_captions(&aligned, state.next_index, restart_offset, max_chars);
                written += self.append(video_id, job, source, state, &captions).await?;
            }
        }

        for (language, text) in &utterance.translations {
            let Some(state) = progress.get_mut(language) else {
                debug!(language = %language, "Ignoring translation for a language not requested");
                continue;
            };
            if begin < state.start_after {
                continue;
            }
            let captions = interpolate_captions(text, begin, end, state.next_index, max_chars);
            written += self.append(video_id, job, language, state, &captions).await?;
        }

        Ok(written)
    }

    async fn append(
        &self,
        video_id: &VideoId,
        job: &mut TranscriptionJob,
        language: &str,
        state: &mut LanguageProgress,
        captions: &[Caption],
    ) -> WorkerResult<usize> {
        if captions.is_empty() {
            return Ok(0);
        }
        self.store.append_captions(video_id, language, captions).await?;
        state.next_index += captions.len() as u32;
        job.advance_high_water(language, last_end(captions));
        metrics::record_captions_persisted(language, captions.len());
        Ok(captions.len())
    }

    async fn write_placeholders(&self, video_id: &VideoId, languages: &[String]) -> WorkerResult<()> {
        for language in languages {
            let existing = self.store.existing_captions(video_id, language).await?;
            let captions = mock_captions(language, existing.len() as u32 + 1);
            self.store.append_captions(video_id, language, &captions).await?;
            metrics::record_captions_persisted(language, captions.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_end_classification() {
        assert_eq!(SessionEnd::classify(Cancellation::end_of_stream()), SessionEnd::Completed);
        assert_eq!(
            SessionEnd::classify(Cancellation::error(CancellationCode::ServiceTimeout, "slow")),
            SessionEnd::Interrupted(CancellationCode::ServiceTimeout)
        );
        assert!(matches!(
            SessionEnd::classify(Cancellation::error(CancellationCode::AuthenticationFailure, "bad key")),
            SessionEnd::Fatal(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SessionEnd::Completed.status_code(), "NoError");
        assert_eq!(
            SessionEnd::Interrupted(CancellationCode::ConnectionFailure).status_code(),
            "ConnectionFailure"
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = WorkerConfig {
            mock_recognition: true,
            caption_max_chars: 32,
            ..WorkerConfig::default()
        };
        let settings = OrchestratorSettings::from_config(&config);
        assert!(settings.mock);
        assert_eq!(settings.caption_max_chars, 32);
        assert_eq!(settings.source_language, "en-US");
    }
}
