//! FlowReplay CLI - Main Entry Point
//!
//! Record a browser workflow once, turn it into an editable scenario,
//! replay it deterministically with diagnostic artifacts on every run.

use clap::{Parser, Subcommand};

mod commands;

use commands::{import, init, lint, list_steps, record, report, run, validate};

/// FlowReplay - record/replay test authoring for web UIs
#[derive(Parser)]
#[command(name = "flowreplay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize the project folder layout
    Init(init::InitArgs),

    /// Record a workflow with the external recorder
    Record(record::RecordArgs),

    /// Convert a recorded script into a scenario
    Import(import::ImportArgs),

    /// Replay one or more scenarios
    Run(run::RunArgs),

    /// Check a scenario against the schema
    Validate(validate::ValidateArgs),

    /// Static analysis over a scenario
    Lint(lint::LintArgs),

    /// Re-render reports for an existing run directory
    Report(report::ReportArgs),

    /// Enumerate the step registry
    ListSteps,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init(args) => init::execute(args)?,
        Commands::Record(args) => record::execute(args)?,
        Commands::Import(args) => import::execute(args)?,
        Commands::Run(args) => run::execute(args).await?,
        Commands::Validate(args) => validate::execute(args)?,
        Commands::Lint(args) => lint::execute(args)?,
        Commands::Report(args) => report::execute(args)?,
        Commands::ListSteps => list_steps::execute()?,
    }

    Ok(())
}
