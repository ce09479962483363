//! Shared test doubles: scripted in-memory backends and turn-driving helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use video_qa_agent::backend::{
    BackendError, RemoteFileState, SpeechBackend, UploadedAsset, VideoBackend,
};
use video_qa_agent::config::AppConfig;
use video_qa_agent::orchestrator::{Orchestrator, TurnRequest};
use video_qa_agent::turn::{TurnEmitter, TurnOutcome, TurnPhase};

pub const ANSWER: &str = "The clip shows a dog catching a frisbee in a park.";

#[derive(Default)]
struct MockVideoState {
    uploads: AtomicUsize,
    status_calls: AtomicUsize,
    deletes: AtomicUsize,
    analyze_calls: AtomicUsize,
    states: Mutex<VecDeque<RemoteFileState>>,
    fail_upload: AtomicBool,
    fail_delete: AtomicBool,
    fail_analyze: AtomicBool,
    unreachable: AtomicBool,
    refuse: AtomicBool,
}

/// Scripted stand-in for the video analysis service. Clones share state, so a
/// test can hand one clone to the orchestrator and keep another to assert on
/// call counts. `status` pops from a queue of states and reports Active once
/// the queue runs dry.
#[derive(Clone, Default)]
pub struct MockVideoBackend {
    inner: Arc<MockVideoState>,
}

impl MockVideoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue remote states for upcoming `status` calls. While the queue is
    /// non-empty, uploads report Processing so the poller runs.
    pub fn with_states(self, states: &[RemoteFileState]) -> Self {
        self.inner.states.lock().extend(states.iter().copied());
        self
    }

    pub fn push_state(&self, state: RemoteFileState) {
        self.inner.states.lock().push_back(state);
    }

    pub fn failing_upload(self) -> Self {
        self.inner.fail_upload.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_delete(self) -> Self {
        self.inner.fail_delete.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_analyze(self) -> Self {
        self.inner.fail_analyze.store(true, Ordering::SeqCst);
        self
    }

    pub fn refusing(self) -> Self {
        self.inner.refuse.store(true, Ordering::SeqCst);
        self
    }

    pub fn unreachable(self) -> Self {
        self.inner.unreachable.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_unreachable(&self, value: bool) {
        self.inner.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> usize {
        self.inner.uploads.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.inner.status_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.inner.deletes.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.inner.analyze_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            Err(BackendError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl VideoBackend for MockVideoBackend {
    async fn upload(
        &self,
        _bytes: &[u8],
        _display_name: &str,
    ) -> Result<UploadedAsset, BackendError> {
        self.check_reachable()?;
        let n = self.inner.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.fail_upload.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                message: "upload rejected".into(),
            });
        }
        let state = if self.inner.states.lock().is_empty() {
            RemoteFileState::Active
        } else {
            RemoteFileState::Processing
        };
        Ok(UploadedAsset {
            handle: format!("files/mock-{n}"),
            uri: format!("https://mock.invalid/v1beta/files/mock-{n}"),
            state,
        })
    }

    async fn status(&self, _handle: &str) -> Result<RemoteFileState, BackendError> {
        self.check_reachable()?;
        self.inner.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inner
            .states
            .lock()
            .pop_front()
            .unwrap_or(RemoteFileState::Active))
    }

    async fn delete(&self, _handle: &str) -> Result<(), BackendError> {
        self.inner.deletes.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_delete.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 404,
                message: "not found".into(),
            });
        }
        Ok(())
    }

    async fn analyze(
        &self,
        _file_uri: &str,
        _question: &str,
        _word_target: u32,
    ) -> Result<Option<String>, BackendError> {
        self.check_reachable()?;
        self.inner.analyze_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_analyze.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                message: "model error".into(),
            });
        }
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(ANSWER.to_string()))
    }
}

/// Scripted TTS service returning a fixed fake MP3 body. Clones share the
/// call counter.
#[derive(Clone)]
pub struct MockSpeechBackend {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl MockSpeechBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechBackend for MockSpeechBackend {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BackendError::Api {
                status: 503,
                message: "voice unavailable".into(),
            });
        }
        Ok(b"ID3fake-mp3-bytes".to_vec())
    }
}

/// Defaults with polling tightened so readiness loops finish immediately.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.poll.interval_secs = 0;
    config.poll.timeout_secs = 5;
    config
}

pub fn sample_video() -> Vec<u8> {
    b"ftypmp42 not a real video, but the bytes do not matter".to_vec()
}

/// Drive one turn and collect every emitted snapshot phase alongside the
/// terminal outcome.
pub async fn run_collecting<V: VideoBackend, S: SpeechBackend>(
    orch: &Orchestrator<V, S>,
    identity: &str,
    input: &str,
    video: Vec<u8>,
) -> (TurnOutcome, Vec<TurnPhase>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let emitter = TurnEmitter::new(tx);
    let req = TurnRequest {
        identity: identity.to_string(),
        input: input.to_string(),
        video,
        video_name: "clip.mp4".to_string(),
    };
    let outcome = orch.run_turn(&req, &emitter).await;
    drop(emitter);

    let mut phases = Vec::new();
    while let Some(snap) = rx.recv().await {
        phases.push(snap.phase);
    }
    (outcome, phases)
}
