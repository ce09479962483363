//! Final payload rendering: pure string assembly, no network or filesystem.
//!
//! Audio is embedded inline as a base64 data URI rather than referenced by a
//! temporary path, so the payload survives independently of any local file
//! lifetime.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::turn::TurnError;

pub struct RenderInput<'a> {
    pub text: &'a str,
    pub audio: Option<&'a [u8]>,
    pub speech_failed: bool,
    /// Quota still available for this identity, for user-facing display.
    pub remaining: Option<u32>,
}

/// Render a completed turn: text always, audio inline when present, a
/// degradation note when speech was attempted and failed.
pub fn render(input: &RenderInput<'_>) -> String {
    let mut out = String::new();

    if let Some(audio) = input.audio {
        let encoded = BASE64.encode(audio);
        out.push_str("**Audio response**\n\n");
        out.push_str(&format!(
            "<audio controls src=\"data:audio/mpeg;base64,{encoded}\"></audio>\n\n"
        ));
        out.push_str("**Transcript**\n\n");
    } else if input.speech_failed {
        out.push_str("_Audio generation failed; text answer below._\n\n");
    }

    out.push_str(input.text);

    if let Some(remaining) = input.remaining {
        out.push_str(&format!(
            "\n\n_{remaining} request(s) remaining in this window._"
        ));
    }
    out
}

/// Render a failed turn as a single clearly marked transcript message.
pub fn render_error(err: &TurnError) -> String {
    format!("**Error:** {err}")
}
