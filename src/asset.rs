//! Remote asset records: one video's registration with the analysis service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::VideoFingerprint;

/// Maximum URI length surfaced to users before redaction.
const URI_DISPLAY_CHARS: usize = 48;

/// Lifecycle of a remote registration.
///
/// Created as `Registering` on first upload of a novel fingerprint, then
/// `Processing` once the remote service has the bytes, then `Ready` or
/// `Failed` as driven by the readiness poller. `Ready` records may later be
/// found `Expired` when the remote service stops resolving the handle; that
/// is detected lazily on next use. Failed and Expired records are replaced by
/// a fresh registration, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetStatus {
    Registering,
    Processing,
    Ready,
    Failed,
    Expired,
}

impl AssetStatus {
    /// Only Ready records may be handed to the analysis call.
    pub fn is_usable(self) -> bool {
        matches!(self, AssetStatus::Ready)
    }

    /// Records in these states must be replaced on next use.
    pub fn is_defunct(self) -> bool {
        matches!(self, AssetStatus::Failed | AssetStatus::Expired)
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetStatus::Registering => "registering",
            AssetStatus::Processing => "processing",
            AssetStatus::Ready => "ready",
            AssetStatus::Failed => "failed",
            AssetStatus::Expired => "expired",
        }
    }
}

/// One video's registration with the external analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAssetRecord {
    pub fingerprint: VideoFingerprint,
    /// Opaque identifier assigned by the remote service (e.g. "files/abc123").
    pub remote_handle: String,
    /// Human-readable locator; redact before showing to users.
    pub remote_uri: String,
    pub status: AssetStatus,
    pub registered_at: DateTime<Utc>,
    /// Downstream model this registration targets. Registrations are not
    /// cross-compatible between models.
    pub model_hint: String,
}

impl RemoteAssetRecord {
    pub fn new(fingerprint: VideoFingerprint, model_hint: impl Into<String>) -> Self {
        Self {
            fingerprint,
            remote_handle: String::new(),
            remote_uri: String::new(),
            status: AssetStatus::Registering,
            registered_at: Utc::now(),
            model_hint: model_hint.into(),
        }
    }

    /// URI safe to surface in a transcript: long locators are truncated.
    pub fn redacted_uri(&self) -> String {
        let uri = self.remote_uri.as_str();
        if uri.chars().count() <= URI_DISPLAY_CHARS {
            uri.to_string()
        } else {
            let head: String = uri.chars().take(URI_DISPLAY_CHARS).collect();
            format!("{head}…")
        }
    }
}
