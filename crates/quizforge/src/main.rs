use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use quizforge::prelude::*;
use tracing_subscriber::EnvFilter;

/// Real-time multiplayer trivia room server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(long, default_value = "0.0.0.0:3001")]
    bind: String,
    /// Directory for persisted rooms; in-memory only when omitted
    #[clap(long)]
    data_dir: Option<PathBuf>,
    /// JSON question bank served to `loadQuestions`
    #[clap(long)]
    questions: Option<PathBuf>,
    /// Seconds a disconnected player keeps their seat
    #[clap(long, default_value = "10")]
    grace_secs: u64,
    /// Seconds between liveness pings
    #[clap(long, default_value = "30")]
    ping_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), QuizError> {
    // RUST_LOG=quizforge=debug,quizforge_room=debug for verbose output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut builder = QuizServer::builder()
        .bind(&args.bind)
        .registry_config(RegistryConfig {
            reconnect_grace: Duration::from_secs(args.grace_secs),
            ping_interval: Duration::from_secs(args.ping_secs),
            ..RegistryConfig::default()
        });
    if let Some(dir) = args.data_dir {
        tracing::info!(dir = %dir.display(), "persisting rooms");
        builder = builder.store(Arc::new(JsonFileStore::open(dir)?));
    }
    if let Some(path) = args.questions {
        builder = builder.questions(JsonFileQuestions::new(path));
    }

    let server = builder.build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
}
