//! Google Generative Language ("Gemini") API client.
//!
//! Covers the four calls this system needs: resumable file upload (start +
//! finalize), file status lookup, file deletion, and question answering via
//! `generateContent` with a `file_data` part referencing the uploaded video.
//! The response-length guidance is a word-count hint embedded in the prompt,
//! not enforced structurally.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{BackendError, RemoteFileState, UploadedAsset, VideoBackend, api_error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Generous ceiling: uploads of ~100 MB over slow links take a while.
const HTTP_TIMEOUT_SECS: u64 = 300;

const VIDEO_MIME: &str = "video/mp4";

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("vqa/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn prompt(question: &str, word_target: u32) -> String {
        format!("{question}\n\nAnswer in about {word_target} words.")
    }
}

// Minimal fields only; the API returns much more.
#[derive(Debug, Deserialize)]
struct FileEnvelope {
    file: FileInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    name: String,
    uri: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn map_state(state: Option<&str>) -> RemoteFileState {
    match state {
        Some("ACTIVE") => RemoteFileState::Active,
        Some("FAILED") => RemoteFileState::Failed,
        // PROCESSING, STATE_UNSPECIFIED, or absent: keep polling.
        _ => RemoteFileState::Processing,
    }
}

impl VideoBackend for GeminiClient {
    async fn upload(&self, bytes: &[u8], display_name: &str) -> Result<UploadedAsset, BackendError> {
        // Resumable upload, step 1: announce size/type, get the session URL.
        let start_url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let start = self
            .client
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", VIDEO_MIME)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !start.status().is_success() {
            return Err(api_error(start).await);
        }

        let session_url = start
            .headers()
            .get("X-Goog-Upload-URL")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                BackendError::Malformed("upload start response missing X-Goog-Upload-URL".into())
            })?;

        // Step 2: send the bytes and finalize in one shot.
        let finish = self
            .client
            .post(&session_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !finish.status().is_success() {
            return Err(api_error(finish).await);
        }

        let envelope: FileEnvelope = finish.json().await.map_err(BackendError::from_reqwest)?;
        let file = envelope.file;
        debug!("uploaded {} bytes as {}", bytes.len(), file.name);
        Ok(UploadedAsset {
            state: map_state(file.state.as_deref()),
            uri: file.uri.unwrap_or_default(),
            handle: file.name,
        })
    }

    async fn status(&self, handle: &str) -> Result<RemoteFileState, BackendError> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, handle, self.api_key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let file: FileInfo = resp.json().await.map_err(BackendError::from_reqwest)?;
        Ok(map_state(file.state.as_deref()))
    }

    async fn delete(&self, handle: &str) -> Result<(), BackendError> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, handle, self.api_key);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        Ok(())
    }

    async fn analyze(
        &self,
        file_uri: &str,
        question: &str,
        word_target: u32,
    ) -> Result<Option<String>, BackendError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "file_data": { "file_uri": file_uri, "mime_type": VIDEO_MIME } },
                    { "text": Self::prompt(question, word_target) },
                ],
            }],
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let parsed: GenerateResponse = resp.json().await.map_err(BackendError::from_reqwest)?;

        if let Some(feedback) = &parsed.prompt_feedback
            && let Some(reason) = &feedback.block_reason
        {
            debug!("analysis blocked: {reason}");
            return Ok(None);
        }

        let Some(candidate) = parsed.candidates.and_then(|mut c| {
            if c.is_empty() { None } else { Some(c.remove(0)) }
        }) else {
            return Ok(None);
        };

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            debug!("analysis candidate suppressed for safety");
            return Ok(None);
        }

        let text = candidate
            .content
            .and_then(|c| c.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim().to_string();
        if text.is_empty() { Ok(None) } else { Ok(Some(text)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_word_target() {
        let p = GeminiClient::prompt("What happens?", 120);
        assert!(p.starts_with("What happens?"));
        assert!(p.contains("about 120 words"));
    }

    #[test]
    fn test_map_state_vocabulary() {
        assert_eq!(map_state(Some("ACTIVE")), RemoteFileState::Active);
        assert_eq!(map_state(Some("FAILED")), RemoteFileState::Failed);
        assert_eq!(map_state(Some("PROCESSING")), RemoteFileState::Processing);
        assert_eq!(map_state(None), RemoteFileState::Processing);
    }

    #[test]
    fn test_generate_response_parses_minimal_shape() {
        let raw = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "A dog " }, { "text": "runs." }] },
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let candidate = parsed.candidates.unwrap().remove(0);
        assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
        let parts = candidate.content.unwrap().parts.unwrap();
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_blocked_response_parses() {
        let raw = r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.prompt_feedback.unwrap().block_reason.as_deref(),
            Some("SAFETY")
        );
        assert!(parsed.candidates.is_none());
    }

    #[test]
    fn test_file_envelope_parses() {
        let raw = r#"{ "file": { "name": "files/abc", "uri": "https://x/files/abc", "state": "PROCESSING" } }"#;
        let parsed: FileEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.file.name, "files/abc");
        assert_eq!(map_state(parsed.file.state.as_deref()), RemoteFileState::Processing);
    }
}
