//! Bounded readiness polling for freshly uploaded assets.
//!
//! The remote service processes uploads asynchronously; this module queries
//! status at a fixed interval until the asset is terminal or an overall
//! deadline passes. Waits are `tokio::time::sleep`, never a blocking sleep,
//! so a turn waiting on readiness does not starve the worker pool.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::backend::{BackendError, RemoteFileState, VideoBackend};

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Emitted to the caller on each intermediate poll.
#[derive(Debug, Clone)]
pub struct PollProgress {
    pub attempt: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum PollError {
    /// The remote service reported a terminal failure. Not retryable for the
    /// same asset; callers may retry with a fresh registration.
    #[error("remote processing failed: {0}")]
    Failed(String),

    /// The deadline elapsed with the asset still processing. Distinct from
    /// [`PollError::Failed`]; same retry guidance.
    #[error("asset not ready after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Poll `handle` until Ready or Failed, or until `opts.timeout` elapses.
/// `on_poll` fires once per intermediate poll for progress display.
pub async fn wait_until_ready<B: VideoBackend>(
    backend: &B,
    handle: &str,
    opts: &PollOptions,
    mut on_poll: impl FnMut(PollProgress),
) -> Result<(), PollError> {
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        match backend.status(handle).await? {
            RemoteFileState::Active => {
                debug!("{handle} ready after {attempt} polls");
                return Ok(());
            }
            RemoteFileState::Failed => {
                return Err(PollError::Failed(format!(
                    "remote service reported failure for {handle}"
                )));
            }
            RemoteFileState::Processing => {}
        }

        attempt += 1;
        let elapsed = started.elapsed();
        if elapsed >= opts.timeout {
            return Err(PollError::Timeout(elapsed));
        }
        on_poll(PollProgress { attempt, elapsed });
        sleep(opts.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UploadedAsset;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted status sequence; repeats the last entry once exhausted.
    struct ScriptedBackend {
        states: Mutex<VecDeque<RemoteFileState>>,
    }

    impl ScriptedBackend {
        fn new(states: Vec<RemoteFileState>) -> Self {
            Self {
                states: Mutex::new(states.into()),
            }
        }
    }

    impl VideoBackend for ScriptedBackend {
        async fn upload(&self, _: &[u8], _: &str) -> Result<UploadedAsset, BackendError> {
            unreachable!("poller never uploads")
        }

        async fn status(&self, _: &str) -> Result<RemoteFileState, BackendError> {
            let mut states = self.states.lock();
            if states.len() > 1 {
                Ok(states.pop_front().unwrap())
            } else {
                Ok(*states.front().expect("script not empty"))
            }
        }

        async fn delete(&self, _: &str) -> Result<(), BackendError> {
            unreachable!("poller never deletes")
        }

        async fn analyze(&self, _: &str, _: &str, _: u32) -> Result<Option<String>, BackendError> {
            unreachable!("poller never analyzes")
        }
    }

    fn fast_opts(timeout_ms: u64) -> PollOptions {
        PollOptions {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_ready_after_a_few_polls() {
        let backend = ScriptedBackend::new(vec![
            RemoteFileState::Processing,
            RemoteFileState::Processing,
            RemoteFileState::Active,
        ]);
        let mut progress = Vec::new();
        let result =
            wait_until_ready(&backend, "files/a", &fast_opts(5000), |p| progress.push(p)).await;
        assert!(result.is_ok());
        assert_eq!(progress.len(), 2, "one progress event per intermediate poll");
        assert_eq!(progress[0].attempt, 1);
        assert_eq!(progress[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_immediate_ready_emits_no_progress() {
        let backend = ScriptedBackend::new(vec![RemoteFileState::Active]);
        let mut polls = 0;
        let result = wait_until_ready(&backend, "files/b", &fast_opts(5000), |_| polls += 1).await;
        assert!(result.is_ok());
        assert_eq!(polls, 0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_terminal() {
        let backend = ScriptedBackend::new(vec![
            RemoteFileState::Processing,
            RemoteFileState::Failed,
        ]);
        let result = wait_until_ready(&backend, "files/c", &fast_opts(5000), |_| {}).await;
        assert!(matches!(result, Err(PollError::Failed(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_failure() {
        let backend = ScriptedBackend::new(vec![RemoteFileState::Processing]);
        let result = wait_until_ready(&backend, "files/d", &fast_opts(10), |_| {}).await;
        assert!(matches!(result, Err(PollError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        struct Failing;
        impl VideoBackend for Failing {
            async fn upload(&self, _: &[u8], _: &str) -> Result<UploadedAsset, BackendError> {
                unreachable!()
            }
            async fn status(&self, _: &str) -> Result<RemoteFileState, BackendError> {
                Err(BackendError::Unreachable("connection refused".into()))
            }
            async fn delete(&self, _: &str) -> Result<(), BackendError> {
                unreachable!()
            }
            async fn analyze(
                &self,
                _: &str,
                _: &str,
                _: u32,
            ) -> Result<Option<String>, BackendError> {
                unreachable!()
            }
        }
        let result = wait_until_ready(&Failing, "files/e", &fast_opts(5000), |_| {}).await;
        assert!(matches!(result, Err(PollError::Backend(_))));
    }
}
