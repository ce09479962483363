//! The turn state machine.
//!
//! One turn runs: admission → asset resolution (reuse or upload+poll) →
//! analysis → optional speech synthesis → assembly. A snapshot is emitted at
//! each phase boundary so a streaming caller can show progress; a caller that
//! ignores everything but the terminal result still gets a correct answer.
//!
//! All failures are converted to a terminal payload here at the boundary;
//! nothing propagates as an unhandled fault to the caller. Speech failure is
//! the one non-fatal kind: the turn degrades to text-only.

use std::borrow::Cow;

use tracing::{info, warn};

use crate::assemble::{self, RenderInput};
use crate::asset::RemoteAssetRecord;
use crate::backend::{SpeechBackend, VideoBackend};
use crate::config::AppConfig;
use crate::fingerprint::VideoFingerprint;
use crate::limiter::RateLimiter;
use crate::store::{AssetStore, RegisterError};
use crate::turn::{TurnCommand, TurnEmitter, TurnError, TurnInput, TurnOutcome, TurnPhase};

/// Marker appended when speech input is cut at the ceiling.
pub const TRUNCATION_MARKER: char = '…';

const REFUSAL_TEXT: &str = "The model declined to answer this question about the video.";

/// One user turn: free-text input, the selected video, and an identity token
/// for rate limiting.
pub struct TurnRequest {
    pub identity: String,
    pub input: String,
    pub video: Vec<u8>,
    pub video_name: String,
}

pub struct Orchestrator<V, S> {
    config: AppConfig,
    store: AssetStore,
    limiter: RateLimiter,
    video: V,
    speech: Option<S>,
}

impl<V: VideoBackend, S: SpeechBackend> Orchestrator<V, S> {
    pub fn new(config: AppConfig, video: V, speech: Option<S>) -> Self {
        let store = AssetStore::new(config.poll_options());
        let limiter = RateLimiter::new(config.limits.max_per_window, config.window());
        Self {
            config,
            store,
            limiter,
            video,
            speech,
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run one turn to completion. Never fails: errors become a terminal
    /// payload with `Errored` as the final emitted phase.
    pub async fn run_turn(&self, req: &TurnRequest, emitter: &TurnEmitter) -> TurnOutcome {
        match self.drive(req, emitter).await {
            Ok(outcome) => {
                emitter.emit(TurnPhase::Done, "turn complete");
                outcome
            }
            Err(err) => {
                warn!("turn failed: {err}");
                let payload = assemble::render_error(&err);
                emitter.emit(TurnPhase::Errored, err.to_string());
                TurnOutcome {
                    text: err.to_string(),
                    audio: None,
                    speech_failed: false,
                    payload,
                    error: Some(err),
                }
            }
        }
    }

    async fn drive(&self, req: &TurnRequest, emitter: &TurnEmitter) -> Result<TurnOutcome, TurnError> {
        emitter.emit(TurnPhase::Admitting, "checking quota");
        let input = TurnInput::parse(&req.input);

        // Control commands inspect or mutate the store; only analysis
        // questions consume quota.
        if matches!(input, TurnInput::Question(_)) && !self.limiter.admit(&req.identity) {
            return Err(TurnError::RateLimited {
                remaining: self.limiter.remaining(&req.identity),
            });
        }

        let fingerprint = VideoFingerprint::from_bytes(&req.video);
        let model = self.config.analysis.model.clone();

        match input {
            TurnInput::Command(TurnCommand::Status) => {
                let text = self.status_report(&fingerprint, &model);
                emitter.emit(TurnPhase::Assembling, "rendering status report");
                Ok(self.text_outcome(text, None))
            }
            TurnInput::Command(TurnCommand::Clear) => {
                let removed = self.store.invalidate(&self.video, &fingerprint).await;
                let text = if removed == 0 {
                    "Nothing to clear: this video has no cached registration.".to_string()
                } else {
                    format!("Cleared {removed} cached registration(s) for this video.")
                };
                emitter.emit(TurnPhase::Assembling, "rendering clear report");
                Ok(self.text_outcome(text, None))
            }
            TurnInput::Command(TurnCommand::Upload) => {
                self.check_size(&req.video)?;
                let record = self.resolve_or_register(&fingerprint, &model, req, emitter).await?;
                let text = format!(
                    "Video registered with the analysis service as {} ({}). Ask away.",
                    record.remote_handle,
                    record.redacted_uri()
                );
                emitter.emit(TurnPhase::Assembling, "rendering upload report");
                Ok(self.text_outcome(text, None))
            }
            TurnInput::Question(question) => {
                self.check_size(&req.video)?;
                let record = self.resolve_or_register(&fingerprint, &model, req, emitter).await?;
                self.answer(&question, &record, &req.identity, emitter).await
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        record: &RemoteAssetRecord,
        identity: &str,
        emitter: &TurnEmitter,
    ) -> Result<TurnOutcome, TurnError> {
        emitter.emit(TurnPhase::Analyzing, "analyzing the video");
        let answer = self
            .video
            .analyze(&record.remote_uri, question, self.config.analysis.word_target)
            .await
            .map_err(|err| {
                if err.is_unreachable() {
                    TurnError::BackendUnavailable(err.to_string())
                } else {
                    TurnError::AnalysisFailed(err.to_string())
                }
            })?;

        let remaining = Some(self.limiter.remaining(identity));

        let Some(text) = answer else {
            // Content-safety refusal: no speech for refusals.
            emitter.emit(TurnPhase::Assembling, "rendering refusal");
            return Ok(self.text_outcome(REFUSAL_TEXT.to_string(), remaining));
        };

        let (audio, speech_failed) = match &self.speech {
            Some(speech) => {
                emitter.emit(TurnPhase::SynthesizingSpeech, "generating spoken answer");
                let spoken = truncate_for_speech(&text, self.config.speech.char_ceiling);
                match speech.synthesize(&spoken).await {
                    Ok(bytes) => (Some(bytes), false),
                    Err(err) => {
                        // Never fatal: deliver text-only with the flag set.
                        warn!("{}", TurnError::SpeechFailed(err.to_string()));
                        (None, true)
                    }
                }
            }
            None => (None, false),
        };

        emitter.emit(TurnPhase::Assembling, "rendering response");
        let payload = assemble::render(&RenderInput {
            text: &text,
            audio: audio.as_deref(),
            speech_failed,
            remaining,
        });
        Ok(TurnOutcome {
            text,
            audio,
            speech_failed,
            payload,
            error: None,
        })
    }

    async fn resolve_or_register(
        &self,
        fingerprint: &VideoFingerprint,
        model: &str,
        req: &TurnRequest,
        emitter: &TurnEmitter,
    ) -> Result<RemoteAssetRecord, TurnError> {
        emitter.emit(
            TurnPhase::ResolvingAsset,
            format!("looking up cached upload for {}", fingerprint.short()),
        );

        match self.store.resolve(&self.video, fingerprint, model).await {
            Ok(Some(record)) => {
                info!("reusing cached upload {}", record.remote_handle);
                Ok(record)
            }
            Ok(None) => {
                let mb = req.video.len() as f64 / 1_048_576.0;
                emitter.emit(TurnPhase::Uploading, format!("uploading video ({mb:.1} MB)"));
                let display_name = if req.video_name.is_empty() {
                    format!("video_{}.mp4", fingerprint.short())
                } else {
                    req.video_name.clone()
                };
                self.store
                    .register(&self.video, fingerprint, model, &req.video, &display_name, |p| {
                        emitter.emit(
                            TurnPhase::AwaitingReady,
                            format!("waiting for remote processing ({}s)", p.elapsed.as_secs()),
                        );
                    })
                    .await
                    .map_err(map_register_error)
            }
            Err(err) => Err(TurnError::BackendUnavailable(err.to_string())),
        }
    }

    fn status_report(&self, fingerprint: &VideoFingerprint, model: &str) -> String {
        match self.store.lookup(fingerprint, model) {
            Some(record) => format!(
                "Cache status for {}: {} (model {}, registered {}, {})",
                fingerprint.short(),
                record.status.label(),
                record.model_hint,
                record.registered_at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.redacted_uri()
            ),
            None => {
                "No cached registration for this video. Ask a question or send /upload to register it."
                    .to_string()
            }
        }
    }

    fn check_size(&self, video: &[u8]) -> Result<(), TurnError> {
        let limit = self.config.limits.max_video_bytes;
        if video.len() as u64 > limit {
            return Err(TurnError::VideoTooLarge {
                size_bytes: video.len() as u64,
                limit_bytes: limit,
            });
        }
        Ok(())
    }

    fn text_outcome(&self, text: String, remaining: Option<u32>) -> TurnOutcome {
        let payload = assemble::render(&RenderInput {
            text: &text,
            audio: None,
            speech_failed: false,
            remaining,
        });
        TurnOutcome {
            text,
            audio: None,
            speech_failed: false,
            payload,
            error: None,
        }
    }
}

fn map_register_error(err: RegisterError) -> TurnError {
    match err {
        RegisterError::Upload(e) => TurnError::UploadFailed(e.to_string()),
        RegisterError::Processing(msg) => TurnError::ProcessingFailed(msg),
        RegisterError::Timeout { waited_secs } => TurnError::ProcessingTimeout { waited_secs },
        RegisterError::Unreachable(msg) => TurnError::BackendUnavailable(msg),
    }
}

/// Cut speech input at the ceiling, appending a visible ellipsis marker.
/// Input at or under the ceiling passes through unmodified.
pub fn truncate_for_speech(text: &str, ceiling: usize) -> Cow<'_, str> {
    if text.chars().count() <= ceiling {
        Cow::Borrowed(text)
    } else {
        let mut cut: String = text.chars().take(ceiling).collect();
        cut.push(TRUNCATION_MARKER);
        Cow::Owned(cut)
    }
}
