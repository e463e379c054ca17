//! Scenario replay

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use colored::Colorize;

use flowreplay_common::Scenario;
use flowreplay_engine::driver::playwright::PlaywrightLauncher;
use flowreplay_engine::{default_registry, Runner, RunnerConfig, ScenarioResult};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario files to replay
    #[arg(required = true)]
    pub scenarios: Vec<PathBuf>,

    /// Show the browser window
    #[arg(long, conflicts_with = "headless")]
    pub headed: bool,

    /// Run without a browser window (the default)
    #[arg(long)]
    pub headless: bool,

    /// Concurrent scenarios
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Delay between driver operations in milliseconds
    #[arg(long, default_value_t = 0)]
    pub slow_mo: u64,

    /// Per-step timeout in milliseconds (0 = unlimited)
    #[arg(long, default_value_t = 30_000)]
    pub step_timeout: u64,

    /// Whole-scenario timeout in milliseconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub scenario_timeout: u64,

    /// Artifact root directory
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Browser channel (chrome / msedge); bundled Chromium when omitted
    #[arg(long)]
    pub channel: Option<String>,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut scenarios = Vec::with_capacity(args.scenarios.len());
    for path in &args.scenarios {
        match Scenario::load(path) {
            Ok(scenario) => scenarios.push(scenario),
            Err(e) => {
                eprintln!("{} {}: {}", "❌".red(), path.display(), e);
                std::process::exit(1);
            }
        }
    }

    let config = RunnerConfig {
        headed: args.headed,
        workers: args.workers,
        base_artifacts_dir: args.artifacts_dir,
        slow_mo_ms: args.slow_mo,
        step_timeout_ms: args.step_timeout,
        scenario_timeout_ms: args.scenario_timeout,
    };

    let runner = Arc::new(Runner::new(
        Arc::new(default_registry()),
        Arc::new(PlaywrightLauncher {
            channel: args.channel,
        }),
    ));

    let results = match runner.run_many(scenarios, &config).await {
        Ok(results) => results,
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            std::process::exit(1);
        }
    };

    let mut any_failed = false;
    for result in &results {
        print_result(result);
        any_failed |= !result.passed();
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(result: &ScenarioResult) {
    let passed = result
        .steps
        .iter()
        .filter(|s| s.status == flowreplay_engine::StepStatus::Passed)
        .count();
    let failed = result.steps.len() - passed;
    let badge = if result.passed() {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{} {} — {} steps (passed={}, failed={}) in {}ms",
        badge,
        result.title,
        result.steps.len(),
        passed,
        failed,
        result.duration_ms
    );
    if let Some(run_dir) = &result.run_dir {
        println!("  artifacts: {}", run_dir.display());
        println!("  report:    {}", run_dir.join("report.html").display());
    }
    for step in result.steps.iter().filter(|s| s.error.is_some()) {
        println!(
            "  {} step {} '{}': {}",
            "✗".red(),
            step.index,
            step.name,
            step.error.as_deref().unwrap_or_default()
        );
    }
}
