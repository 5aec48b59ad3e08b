//! CLI entry point for the wastecast forecasting pipeline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use wastecast_learning::{ModelRegistry, evaluation, training};
use wastecast_processing::{
    ArtifactStore, Config, PipelineError, StageContext, TracingReporter, features, ingestion,
    preprocessing,
};

#[derive(Parser, Debug)]
#[command(
    name = "wastecast",
    version,
    about = "Food waste forecasting pipeline",
    long_about = "Runs the forecasting pipeline one stage at a time or end to end.\n\n\
                  Every stage reads its inputs from and writes its outputs to the\n\
                  working directory, as named in the configuration document.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RUST_LOG    Overrides --log-level (also read from .env)\n\n\
                  EXAMPLES:\n  \
                  # Full pipeline with params.yaml in the current directory\n  \
                  wastecast run\n\n  \
                  # Retrain only, against another workspace\n  \
                  wastecast --workdir /data/run-7 train\n\n  \
                  # Machine-readable metrics\n  \
                  wastecast --json evaluate | jq .report"
)]
struct Cli {
    /// Path to the configuration document
    #[arg(short, long, default_value = "params.yaml")]
    config: PathBuf,

    /// Root directory that artifact paths are resolved against
    #[arg(short, long, default_value = ".")]
    workdir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print the stage summary as JSON on stdout instead of logging
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Split the raw dataset into training and evaluation tables
    Ingest,
    /// Forward fill, deduplicate and encode categorical columns
    Preprocess,
    /// Derive rolling means, weekend flags and interaction terms
    Features,
    /// Fit and persist every configured model family
    Train,
    /// Score persisted models on the evaluation table
    Evaluate,
    /// Run every stage in order
    Run,
}

/// One pipeline stage, as dispatched by [`run_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Ingest,
    Preprocess,
    Features,
    Train,
    Evaluate,
}

impl Command {
    /// Stages this command runs, in order.
    fn stages(self) -> &'static [Stage] {
        match self {
            Command::Ingest => &[Stage::Ingest],
            Command::Preprocess => &[Stage::Preprocess],
            Command::Features => &[Stage::Features],
            Command::Train => &[Stage::Train],
            Command::Evaluate => &[Stage::Evaluate],
            Command::Run => &[
                Stage::Ingest,
                Stage::Preprocess,
                Stage::Features,
                Stage::Train,
                Stage::Evaluate,
            ],
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// With `json_output` nothing is logged, so stdout carries only the summary.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env may carry RUST_LOG, so load it before building the filter
    dotenv().ok();
    init_logging(&cli.log_level, cli.quiet, cli.json);

    match execute(&cli) {
        Ok(summary) => {
            if cli.json {
                match serde_json::to_string_pretty(&summary) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("error: cannot render summary: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = err
                .downcast_ref::<PipelineError>()
                .map_or(1, PipelineError::exit_code);
            if cli.json {
                let payload = match err.downcast_ref::<PipelineError>() {
                    Some(pipeline_err) => json!({ "error": pipeline_err }),
                    None => json!({ "error": { "code": "ERROR", "message": format!("{:#}", err) } }),
                };
                println!("{}", payload);
            } else {
                eprintln!("error: {:#}", err);
            }
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

/// Load the configuration and run the selected stage(s).
fn execute(cli: &Cli) -> Result<Value> {
    let config = Config::from_path(&cli.config)?;
    debug!(path = %cli.config.display(), "configuration loaded");

    let store = ArtifactStore::new(&cli.workdir);
    let reporter = TracingReporter;
    let ctx = StageContext::new(&config, &store, &reporter);
    let registry = ModelRegistry::with_defaults();

    let mut summaries = Map::new();
    for &stage in cli.command.stages() {
        let (name, summary) = run_stage(stage, &ctx, &registry)?;
        summaries.insert(name.to_string(), summary);
    }
    info!(
        "Finished {} stage(s) in {}",
        summaries.len(),
        store.root().display()
    );

    if summaries.len() == 1 {
        Ok(summaries.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null))
    } else {
        Ok(Value::Object(summaries))
    }
}

fn run_stage(
    stage: Stage,
    ctx: &StageContext<'_>,
    registry: &ModelRegistry,
) -> Result<(&'static str, Value)> {
    let pair = match stage {
        Stage::Ingest => ("ingest", serde_json::to_value(ingestion::run(ctx)?)?),
        Stage::Preprocess => ("preprocess", serde_json::to_value(preprocessing::run(ctx)?)?),
        Stage::Features => ("features", serde_json::to_value(features::run(ctx)?)?),
        Stage::Train => ("train", serde_json::to_value(training::run(ctx, registry)?)?),
        Stage::Evaluate => {
            let summary = evaluation::run(ctx, registry)?;
            if !summary.report.is_empty() {
                debug!("\n{}", summary.report.render_text());
            }
            ("evaluate", serde_json::to_value(summary)?)
        }
    };
    Ok(pair)
}
