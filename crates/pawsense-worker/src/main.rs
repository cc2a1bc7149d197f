//! PawSense analysis CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pawsense_media::{check_ffmpeg, check_ffprobe, ModelRegistry};
use pawsense_models::SessionId;
use pawsense_storage::LocalSessionStore;
use tokio::sync::watch;
use tracing::{info, warn};

use pawsense_worker::{init_tracing, AnalysisProcessor, PipelineConfig};

#[derive(Parser, Debug)]
#[clap(name = "pawsense-worker", about = "Multi-modal animal emotion analysis")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a video and store the result as a new session
    Analyze {
        video: PathBuf,

        /// Keyframe threshold on a 0-255 scale
        #[clap(long)]
        threshold: Option<f64>,

        /// Per-job timeout in seconds; 0 disables it
        #[clap(long)]
        timeout_secs: Option<u64>,
    },
    /// List stored sessions, newest first
    List,
    /// Print a stored analysis
    Show { session_id: String },
    /// Delete a stored session
    Delete { session_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Command::Analyze {
            video,
            threshold,
            timeout_secs,
        } => {
            if let Some(secs) = timeout_secs {
                config.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
            info!("Worker config: {:?}", config);

            check_ffmpeg().context("ffmpeg is required")?;
            check_ffprobe().context("ffprobe is required")?;
            let processor = AnalysisProcessor::from_config(&config).context("Failed to load models")?;

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Received interrupt, cancelling job");
                    let _ = cancel_tx.send(true);
                }
            });

            let (job, result) = processor.analyze_file(&video, threshold, cancel_rx).await;
            match result {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(_) => {
                    println!("{}", serde_json::to_string_pretty(&job)?);
                    std::process::exit(1);
                }
            }
        }
        Command::List => {
            let sessions = store_only(&config).list().await?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        Command::Show { session_id } => {
            let report = store_only(&config).load(&SessionId::from_string(session_id)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Delete { session_id } => {
            let id = SessionId::from_string(session_id);
            store_only(&config).delete(&id).await?;
            println!("{}", serde_json::json!({ "deleted": id }));
        }
    }

    Ok(())
}

/// Processor for session management commands; loads no models.
fn store_only(config: &PipelineConfig) -> AnalysisProcessor {
    let store = Arc::new(LocalSessionStore::new(&config.sessions_dir));
    AnalysisProcessor::new(ModelRegistry::default(), config, store)
}
