use anyhow::Result;
use tracing_subscriber::EnvFilter;

const BUILD_TIMESTAMP: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "vqa {} (built {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_TIMESTAMP
    );

    video_qa_agent::run().await
}
