use clap::{Parser, Subcommand};
use highlight_reel::watch::{process_manifest_file, watch_manifests};
use highlight_reel::{HighlightPipeline, PipelineSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Builds highlight videos from finished esports matches")]
struct Cli {
    /// JSON settings file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the finished, unhighlighted games of one match manifest.
    Run {
        manifest: PathBuf,
        #[arg(long)]
        game: Option<u32>,
    },
    /// Watch a directory for `*.match.json` manifests.
    Watch { directory: PathBuf },
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let settings = match PipelineSettings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!("Failed to load settings: {error}");
            return ExitCode::FAILURE;
        }
    };
    let pipeline = Arc::new(HighlightPipeline::new(settings));

    match cli.command {
        Commands::Run { manifest, game } => {
            let task = tokio::task::spawn_blocking(move || {
                process_manifest_file(&manifest, &pipeline, game)
            });
            match task.await {
                Ok(Ok(report)) if report.failed.is_empty() && report.publish_error.is_none() => {
                    if let Some(published) = report.published {
                        tracing::info!(output = %published.display(), "Match highlights published");
                    }
                    ExitCode::SUCCESS
                }
                Ok(Ok(report)) => {
                    for (game_number, error) in &report.failed {
                        tracing::error!(game = game_number, severity = ?error.severity(), "{error}");
                    }
                    if let Some(error) = &report.publish_error {
                        tracing::error!(severity = ?error.severity(), "Match video not published: {error}");
                    }
                    ExitCode::FAILURE
                }
                Ok(Err(error)) => {
                    tracing::error!("Failed to process match manifest: {error}");
                    ExitCode::FAILURE
                }
                Err(error) => {
                    tracing::error!("Highlight task panicked: {error}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Watch { directory } => match watch_manifests(directory, pipeline).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                tracing::error!("Manifest watcher stopped: {error}");
                ExitCode::FAILURE
            }
        },
    }
}
