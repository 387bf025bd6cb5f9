//! # prasc-cli
//!
//! Binary entry point for prasc.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Stage flag reconciliation into a run plan
//! - The incremental pipeline run via `prasc run` (the default)
//! - Configuration checks via `prasc check`
//! - Shell completions via `prasc completions`

mod check;
mod completions;
mod display;
mod plan;

use anyhow::{Context, Result};
use check::CheckArgs;
use clap::{Args, Parser, Subcommand};
use completions::CompletionsArgs;
use display::{ColorMode, Painter, summary_lines};
use plan::{Reconciled, StageFlags};
use prasc_adapters::{RscriptCorrector, SideEyeExtractor, is_program_available};
use prasc_core::{DEFAULT_PARAMETERS_FILE, Pipeline, PipelineError, PrascConfig, RunPlan};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// prasc - incremental processing of eye-tracking recordings
#[derive(Parser, Debug)]
#[command(
    name = "prasc",
    version,
    about,
    args_conflicts_with_subcommands = true,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Verbose output, including per-recording question counts
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline (default if no subcommand given)
    Run(RunArgs),

    /// Validate the parameter file and report resolved inputs
    Check(CheckArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Parameter file
    #[arg(default_value = DEFAULT_PARAMETERS_FILE)]
    params: PathBuf,

    #[command(flatten)]
    flags: StageFlags,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(cli.color.should_use_colors())
        .with_target(false)
        .init();

    let painter = Painter::new(cli.color);
    match cli.command {
        Some(Commands::Run(args)) => run_command(args, painter).await,
        Some(Commands::Check(args)) => check_command(&args, painter),
        Some(Commands::Completions(args)) => {
            completions::generate_completions(&args);
            Ok(())
        }
        None => run_command(cli.run, painter).await,
    }
}

/// Loads, normalizes and validates a parameter file.
fn load_config(path: &Path) -> Result<PrascConfig> {
    let mut config = PrascConfig::from_file(path)
        .with_context(|| format!("Failed to load parameters from {}", path.display()))?;
    config.normalize();
    config
        .validate()
        .with_context(|| format!("Invalid parameters in {}", path.display()))?;
    debug!(base_dir = %config.base_dir.display(), "Loaded parameters");
    Ok(config)
}

async fn run_command(args: RunArgs, painter: Painter) -> Result<()> {
    let plan = match args.flags.reconcile() {
        Reconciled::Run { plan, warnings } => {
            for warning in &warnings {
                warn!("{warning}");
            }
            plan
        }
        Reconciled::NothingToDo => {
            println!(
                "{}",
                painter.warn(
                    "Nothing to do with all of --nofix, --nosentences, --noquestions and --nocombine set"
                )
            );
            return Ok(());
        }
    };

    let config = load_config(&args.params)?;
    warn_missing_programs(&config, &plan);

    let corrector = RscriptCorrector::new(
        config.engines.rscript.clone(),
        config.fix_align_path(),
        config.base_dir.clone(),
    );
    let extractor = SideEyeExtractor::from_config(config.engines.sideeye.as_ref());
    let pipeline = Pipeline::new(config, plan, Box::new(corrector), Box::new(extractor));

    info!(output_dir = %pipeline.files().dir().display(), "Starting run");
    match pipeline.run().await {
        Ok(summary) => {
            for line in summary_lines(&summary, painter) {
                println!("{line}");
            }
            Ok(())
        }
        Err(err) => exit_with(&err, painter),
    }
}

fn exit_with(err: &PipelineError, painter: Painter) -> ! {
    eprintln!("{}", painter.fail(&err.to_string()));
    std::process::exit(err.exit_code());
}

/// Reports engines missing from `PATH`. The run still proceeds.
fn warn_missing_programs(config: &PrascConfig, plan: &RunPlan) {
    if plan.fix.is_active() && !is_program_available(&config.engines.rscript) {
        warn!(program = %config.engines.rscript, "R interpreter not found; alignment correction will fail if any recording needs it");
    }
    let extractor = SideEyeExtractor::from_config(config.engines.sideeye.as_ref());
    if plan.measures.is_active() && !is_program_available(extractor.program()) {
        warn!(program = %extractor.program(), "Measure extractor not found; measure extraction will fail if any recording needs it");
    }
}

fn check_command(args: &CheckArgs, painter: Painter) -> Result<()> {
    let config = load_config(&args.params)?;
    println!(
        "{}",
        painter.bold(&format!("Parameters: {}", args.params.display()))
    );
    println!(
        "{}",
        painter.dim(&format!("Output directory: {}", config.output_dir().display()))
    );

    let report = check::run_checks(&config);
    for line in report.lines(painter) {
        println!("{line}");
    }
    if report.failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
