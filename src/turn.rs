//! Turn-level types: input parsing, phases, snapshots, and the error
//! taxonomy.
//!
//! A turn is one user message plus its evolving response. It is append-only:
//! once started it is never rolled back; failures produce a terminal error
//! payload rather than a deleted turn.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Control commands recognized at turn entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnCommand {
    /// Pre-upload the video without asking a question.
    Upload,
    /// Report the cache state for the current video.
    Status,
    /// Drop the cached registration (best-effort remote delete).
    Clear,
}

/// User input, parsed once at turn entry. Control tokens bypass the normal
/// analyze/synthesize path; everything else is a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    Question(String),
    Command(TurnCommand),
}

impl TurnInput {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "/upload" | "/cache" => TurnInput::Command(TurnCommand::Upload),
            "/status" => TurnInput::Command(TurnCommand::Status),
            "/clear" => TurnInput::Command(TurnCommand::Clear),
            _ => TurnInput::Question(raw.trim().to_string()),
        }
    }
}

/// Phases of one turn, in the order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Admitting,
    ResolvingAsset,
    Uploading,
    AwaitingReady,
    Analyzing,
    SynthesizingSpeech,
    Assembling,
    Done,
    Errored,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::Done | TurnPhase::Errored)
    }

    pub fn label(self) -> &'static str {
        match self {
            TurnPhase::Admitting => "admitting",
            TurnPhase::ResolvingAsset => "resolving asset",
            TurnPhase::Uploading => "uploading",
            TurnPhase::AwaitingReady => "awaiting ready",
            TurnPhase::Analyzing => "analyzing",
            TurnPhase::SynthesizingSpeech => "synthesizing speech",
            TurnPhase::Assembling => "assembling",
            TurnPhase::Done => "done",
            TurnPhase::Errored => "errored",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress snapshot pushed to the caller before the turn completes.
#[derive(Debug, Clone)]
pub struct TurnSnapshot {
    pub phase: TurnPhase,
    pub message: String,
}

/// Fire-and-forget snapshot channel. Emission has no correctness dependency:
/// a caller that drops the receiver, or supplies no channel at all, still
/// gets a correct terminal result.
pub struct TurnEmitter {
    tx: Option<UnboundedSender<TurnSnapshot>>,
}

impl TurnEmitter {
    pub fn new(tx: UnboundedSender<TurnSnapshot>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, phase: TurnPhase, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(TurnSnapshot {
                phase,
                message: message.into(),
            });
        }
    }
}

/// Everything that can end (or degrade) a turn.
///
/// `SpeechFailed` is the single non-fatal kind: it degrades the turn to
/// text-only output instead of failing it. Every other kind ends the turn in
/// `Errored`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("rate limit exceeded; {remaining} request(s) remaining in this window")]
    RateLimited { remaining: u32 },

    #[error(
        "video too large: {} MB (limit {} MB)",
        .size_bytes / 1_048_576,
        .limit_bytes / 1_048_576
    )]
    VideoTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("video upload failed: {0}")]
    UploadFailed(String),

    #[error("remote processing failed: {0}")]
    ProcessingFailed(String),

    #[error("timed out waiting for the video to become ready ({waited_secs}s)")]
    ProcessingTimeout { waited_secs: u64 },

    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("speech synthesis failed: {0}")]
    SpeechFailed(String),

    #[error("backend unreachable: {0}")]
    BackendUnavailable(String),
}

impl TurnError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TurnError::SpeechFailed(_))
    }
}

/// Terminal payload of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Answer text, command report, or error message.
    pub text: String,
    /// Synthesized audio, when speech is configured and succeeded.
    pub audio: Option<Vec<u8>>,
    /// Set when speech was attempted and failed (turn degraded to text-only).
    pub speech_failed: bool,
    /// Rendered display payload (text plus inline audio).
    pub payload: String,
    /// Present iff the turn ended in `Errored`.
    pub error: Option<TurnError>,
}
