//! ElevenLabs text-to-speech client.
//!
//! One call: POST the (already truncated) answer text to a fixed voice and
//! model, get MP3 bytes back.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::{BackendError, SpeechBackend, api_error};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

const HTTP_TIMEOUT_SECS: u64 = 60;

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsClient {
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("vqa/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model_id: model_id.into(),
        })
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SpeechBackend for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, BackendError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&json!({ "text": text, "model_id": self.model_id }))
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let audio = resp
            .bytes()
            .await
            .map_err(BackendError::from_reqwest)?
            .to_vec();
        if audio.is_empty() {
            return Err(BackendError::Malformed("empty audio stream".into()));
        }
        debug!("synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }
}
