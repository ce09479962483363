//! Boundary to the external hosted services.
//!
//! Everything heavy happens on the other side of these traits: video
//! understanding behind [`VideoBackend`], speech synthesis behind
//! [`SpeechBackend`]. The rest of the crate sequences calls and never sees a
//! raw HTTP response. Tests drive the orchestrator with mock implementations.

pub mod elevenlabs;
pub mod gemini;

use thiserror::Error;

/// Transport- and service-level failures from either backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Could not reach the service at all (DNS, connect, timeout).
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The service answered but the body was not what we expected.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl BackendError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            BackendError::Unreachable(err.to_string())
        } else {
            BackendError::Malformed(err.to_string())
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_))
    }
}

/// Remote processing state of an uploaded file, mapped from the external
/// vocabulary (PROCESSING / ACTIVE / FAILED).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFileState {
    Processing,
    Active,
    Failed,
}

/// Result of registering video bytes with the analysis service.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    /// Opaque identifier for later status/delete/analyze calls.
    pub handle: String,
    /// Human-readable locator.
    pub uri: String,
    pub state: RemoteFileState,
}

/// Video understanding service: upload, poll, delete, ask.
#[allow(async_fn_in_trait)]
pub trait VideoBackend {
    async fn upload(&self, bytes: &[u8], display_name: &str) -> Result<UploadedAsset, BackendError>;

    async fn status(&self, handle: &str) -> Result<RemoteFileState, BackendError>;

    async fn delete(&self, handle: &str) -> Result<(), BackendError>;

    /// Ask a question about an uploaded video. `Ok(None)` means the service
    /// declined to answer (content-safety refusal or empty response), which
    /// is not an error.
    async fn analyze(
        &self,
        file_uri: &str,
        question: &str,
        word_target: u32,
    ) -> Result<Option<String>, BackendError>;
}

/// Text-to-speech service. Input is already truncated to the service ceiling.
#[allow(async_fn_in_trait)]
pub trait SpeechBackend {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, BackendError>;
}

/// Shared helper: turn a non-success response into a [`BackendError::Api`]
/// with a bounded slice of the body for context.
pub(crate) async fn api_error(resp: reqwest::Response) -> BackendError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message: String = body.chars().take(300).collect();
    BackendError::Api { status, message }
}
