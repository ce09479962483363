//! Configuration with sensible defaults for every knob.
//!
//! All numeric limits here are defaults, not hard requirements: an optional
//! TOML file (platform config dir) may override any of them, and a handful of
//! environment variables override the file for deployment-time tuning. API
//! keys come only from the environment, never from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::poller::PollOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub limits: LimitsConfig,
    pub poll: PollConfig,
    pub analysis: AnalysisConfig,
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Uploads larger than this are rejected before any network call.
    pub max_video_bytes: u64,
    /// Analysis requests admitted per identity per window.
    pub max_per_window: u32,
    pub window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_video_bytes: 100 * 1024 * 1024,
            max_per_window: 10,
            window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub model: String,
    /// Word-count hint embedded in the prompt, not enforced structurally.
    pub word_target: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            word_target: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub voice_id: String,
    pub model_id: String,
    /// Speech input longer than this many characters is truncated with a
    /// trailing ellipsis before synthesis.
    pub char_ceiling: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            char_ceiling: 2500,
        }
    }
}

impl AppConfig {
    /// Defaults, then the config file if present, then env overrides.
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let path = path_override
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        let mut config = if path.is_file() {
            Self::load_from(&path)?
        } else {
            debug!("no config file at {}; using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = dotenvy::var("VQA_MAX_REQUESTS_PER_HOUR")
            && let Ok(n) = v.parse::<u32>()
        {
            self.limits.max_per_window = n;
        }
        if let Ok(v) = dotenvy::var("VQA_MAX_VIDEO_MB")
            && let Ok(n) = v.parse::<u64>()
        {
            self.limits.max_video_bytes = n * 1024 * 1024;
        }
        if let Ok(v) = dotenvy::var("VQA_ANALYSIS_MODEL") {
            self.analysis.model = v;
        }
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(self.poll.interval_secs),
            timeout: Duration::from_secs(self.poll.timeout_secs),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.limits.window_secs)
    }
}

pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "video-qa-agent", "video-qa-agent").map_or_else(
        || PathBuf::from("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.limits.max_video_bytes, 100 * 1024 * 1024);
        assert_eq!(config.limits.max_per_window, 10);
        assert_eq!(config.limits.window_secs, 3600);
        assert_eq!(config.poll.interval_secs, 2);
        assert_eq!(config.poll.timeout_secs, 600);
        assert_eq!(config.speech.char_ceiling, 2500);
        assert_eq!(config.analysis.word_target, 120);
    }

    #[test]
    fn test_partial_toml_keeps_defaults_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[limits]\nmax_per_window = 3\n\n[speech]\nchar_ceiling = 100\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.limits.max_per_window, 3);
        assert_eq!(config.speech.char_ceiling, 100);
        // Untouched sections keep their defaults.
        assert_eq!(config.poll.interval_secs, 2);
        assert_eq!(config.limits.max_video_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "limits = \"nope\"").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides_apply() {
        // SAFETY: process-global env mutation, serialized by #[serial].
        unsafe {
            std::env::set_var("VQA_MAX_REQUESTS_PER_HOUR", "5");
            std::env::set_var("VQA_MAX_VIDEO_MB", "50");
        }
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("VQA_MAX_REQUESTS_PER_HOUR");
            std::env::remove_var("VQA_MAX_VIDEO_MB");
        }
        assert_eq!(config.limits.max_per_window, 5);
        assert_eq!(config.limits.max_video_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_poll_options_conversion() {
        let config = AppConfig::default();
        let opts = config.poll_options();
        assert_eq!(opts.interval, Duration::from_secs(2));
        assert_eq!(opts.timeout, Duration::from_secs(600));
    }
}
