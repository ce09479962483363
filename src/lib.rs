pub mod assemble;
pub mod asset;
pub mod backend;
pub mod config;
pub mod fingerprint;
pub mod limiter;
pub mod orchestrator;
pub mod poller;
pub mod store;
pub mod turn;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use console::style;
use indicatif::ProgressBar;
use tokio::io::AsyncBufReadExt;
use tracing::debug;

use backend::elevenlabs::ElevenLabsClient;
use backend::gemini::GeminiClient;
use backend::{SpeechBackend, VideoBackend};
use config::AppConfig;
use orchestrator::{Orchestrator, TurnRequest};
use turn::{TurnEmitter, TurnOutcome};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "video-qa-agent",
    version,
    about = "Conversational video Q&A with cached uploads and spoken answers"
)]
pub struct Cli {
    /// Path to a config file (defaults to the platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question about a video
    Ask {
        /// Video file to analyze
        #[arg(long)]
        video: PathBuf,

        /// The question to ask
        #[arg(long)]
        question: String,

        /// Identity token for rate limiting
        #[arg(long, default_value = "local")]
        identity: String,

        /// Skip speech synthesis even when a TTS key is configured
        #[arg(long, default_value_t = false)]
        no_speech: bool,

        /// Also write synthesized audio to this file
        #[arg(long)]
        audio_out: Option<PathBuf>,
    },
    /// Interactive chat session over one video (/upload, /status, /clear)
    Chat {
        /// Video file to analyze
        #[arg(long)]
        video: PathBuf,

        /// Identity token for rate limiting
        #[arg(long, default_value = "local")]
        identity: String,

        /// Skip speech synthesis even when a TTS key is configured
        #[arg(long, default_value_t = false)]
        no_speech: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ask {
            video,
            question,
            identity,
            no_speech,
            audio_out,
        } => run_ask(cli.config, video, question, identity, no_speech, audio_out).await,
        Commands::Chat {
            video,
            identity,
            no_speech,
        } => run_chat(cli.config, video, identity, no_speech).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "vqa", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

async fn run_ask(
    config_path: Option<PathBuf>,
    video: PathBuf,
    question: String,
    identity: String,
    no_speech: bool,
    audio_out: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let orch = build_orchestrator(config, no_speech)?;
    let bytes =
        std::fs::read(&video).with_context(|| format!("reading video {}", video.display()))?;

    let req = TurnRequest {
        identity,
        input: question,
        video: bytes,
        video_name: file_name(&video),
    };
    let outcome = run_turn_with_spinner(&orch, &req).await;

    if let (Some(path), Some(audio)) = (&audio_out, &outcome.audio) {
        std::fs::write(path, audio).with_context(|| format!("writing audio {}", path.display()))?;
        eprintln!("{}", style(format!("audio saved to {}", path.display())).dim());
    }
    println!("{}", outcome.payload);

    if let Some(err) = outcome.error {
        anyhow::bail!("turn failed: {err}");
    }
    Ok(())
}

async fn run_chat(
    config_path: Option<PathBuf>,
    video: PathBuf,
    identity: String,
    no_speech: bool,
) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let orch = build_orchestrator(config, no_speech)?;
    let bytes =
        std::fs::read(&video).with_context(|| format!("reading video {}", video.display()))?;
    let video_name = file_name(&video);

    println!(
        "{}",
        style("Ask about the video. Commands: /upload /status /clear. Ctrl-D or 'exit' to quit.")
            .dim()
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        use std::io::Write as _;
        eprint!("> ");
        std::io::stderr().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let req = TurnRequest {
            identity: identity.clone(),
            input: line,
            video: bytes.clone(),
            video_name: video_name.clone(),
        };
        let outcome = run_turn_with_spinner(&orch, &req).await;
        print_chat_outcome(&outcome);
    }
    Ok(())
}

/// Run one turn, mirroring intermediate snapshots onto a spinner so the user
/// sees upload/poll/analyze progress before the terminal payload arrives.
async fn run_turn_with_spinner<V: VideoBackend, S: SpeechBackend>(
    orch: &Orchestrator<V, S>,
    req: &TurnRequest,
) -> TurnOutcome {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let emitter = TurnEmitter::new(tx);

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    let pb_updates = pb.clone();
    let printer = tokio::spawn(async move {
        while let Some(snap) = rx.recv().await {
            pb_updates.set_message(format!("{}: {}", snap.phase, snap.message));
        }
    });

    let outcome = orch.run_turn(req, &emitter).await;
    drop(emitter);
    let _ = printer.await;
    pb.finish_and_clear();
    outcome
}

fn print_chat_outcome(outcome: &TurnOutcome) {
    if let Some(err) = &outcome.error {
        println!("{}", style(format!("error: {err}")).red());
        return;
    }
    if outcome.speech_failed {
        println!("{}", style("[speech synthesis failed; text only]").yellow());
    }
    println!("{}", outcome.text);
    if let Some(audio) = &outcome.audio {
        println!(
            "{}",
            style(format!(
                "[{:.1} KB of audio synthesized; use `vqa ask --audio-out` to save it]",
                audio.len() as f64 / 1024.0
            ))
            .dim()
        );
    }
}

fn build_orchestrator(
    config: AppConfig,
    no_speech: bool,
) -> Result<Orchestrator<GeminiClient, ElevenLabsClient>> {
    let gemini_key = dotenvy::var("GEMINI_API_KEY")
        .context("GEMINI_API_KEY not set (required for video analysis)")?;
    let video = GeminiClient::new(gemini_key, config.analysis.model.clone())?;

    let speech = if no_speech {
        None
    } else {
        match dotenvy::var("ELEVENLABS_API_KEY") {
            Ok(key) => Some(ElevenLabsClient::new(
                key,
                config.speech.voice_id.clone(),
                config.speech.model_id.clone(),
            )?),
            Err(_) => {
                debug!("ELEVENLABS_API_KEY not set; answers will be text-only");
                None
            }
        }
    };

    Ok(Orchestrator::new(config, video, speech))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string())
}
