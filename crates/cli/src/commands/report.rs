//! Report regeneration over an existing run directory

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use flowreplay_engine::{Reporter, ScenarioResult};

#[derive(Args)]
pub struct ReportArgs {
    /// Run directory containing report.json
    pub run_dir: PathBuf,
}

pub fn execute(args: ReportArgs) -> anyhow::Result<()> {
    let json_path = args.run_dir.join("report.json");
    if !json_path.exists() {
        eprintln!("{} {} not found", "❌".red(), json_path.display());
        std::process::exit(1);
    }

    let text = std::fs::read_to_string(&json_path)?;
    let result: ScenarioResult = serde_json::from_str(&text)?;

    let reporter = Reporter::new();
    let html = reporter.write_html(&result, &args.run_dir)?;
    reporter.write_junit(&result, &args.run_dir)?;
    println!("{} reports regenerated: {}", "✅".green(), html.display());
    Ok(())
}
