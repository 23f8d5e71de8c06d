//! Batch CLI for the statute normalization pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use statute_pipeline::oracle::{DecisionOracle, FallbackOracle, RemoteOracle};
use statute_pipeline::pipeline::Stage;
use statute_pipeline::{Config, Pipeline, RawStatute};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "statute-pipeline",
    about = "Deduplicate, group, version, and timeline a statute corpus",
    version
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pipeline stages over an input batch or existing checkpoints
    Run {
        /// JSON file with an array of raw statute records; omit to reuse the
        /// stored input checkpoint
        #[arg(long)]
        input: Option<PathBuf>,

        /// First stage to run: dedup, grouping, versioning, or timelines
        #[arg(long, default_value = "dedup", value_parser = parse_stage)]
        from: Stage,

        /// Last stage to run
        #[arg(long, default_value = "timelines", value_parser = parse_stage)]
        to: Stage,

        /// Write the timeline export JSON here after the run
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Print the summary of the last completed run
    Summary,

    /// Write the timeline export JSON from existing checkpoints
    Export {
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse().map_err(|e: statute_pipeline::PipelineError| e.to_string())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("statute_pipeline={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_batch(path: &Path) -> anyhow::Result<Vec<RawStatute>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse input file {:?}", path))
}

fn write_export(
    export: &[statute_pipeline::timeline::ExportedGroup],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write export to {:?}", path))?;
            tracing::info!(path = ?path, groups = export.len(), "export written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
    init_tracing(&config.logging.level);

    let primary: Arc<dyn DecisionOracle> = match &config.oracle.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "using remote decision oracle");
            Arc::new(RemoteOracle::new(endpoint.clone(), config.oracle.api_key.clone()))
        }
        None => {
            tracing::info!("no oracle endpoint configured, using rule fallback as primary");
            Arc::new(FallbackOracle::new())
        }
    };
    let pipeline = Pipeline::new(config, primary)?;

    // Ctrl-C aborts cooperatively between documents.
    let abort = pipeline.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, aborting after the current document");
            abort.store(true, Ordering::SeqCst);
        }
    });

    match cli.command {
        Command::Run {
            input,
            from,
            to,
            export,
        } => {
            if let Some(path) = &input {
                let batch = load_batch(path)?;
                tracing::info!(documents = batch.len(), "input batch loaded");
                pipeline.intake(batch)?;
            }
            let summary = pipeline.run(from, to).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if let Some(path) = export {
                write_export(&pipeline.export()?, Some(&path))?;
            }
        }
        Command::Summary => match pipeline.store().load_run_summary()? {
            Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
            None => println!("no completed run recorded"),
        },
        Command::Export { output } => {
            write_export(&pipeline.export()?, output.as_deref())?;
        }
    }

    Ok(())
}
