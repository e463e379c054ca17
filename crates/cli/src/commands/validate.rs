//! Schema validation

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use flowreplay_common::Scenario;

#[derive(Args)]
pub struct ValidateArgs {
    /// Scenario file to check
    pub scenario: PathBuf,
}

pub fn execute(args: ValidateArgs) -> anyhow::Result<()> {
    let scenario = match Scenario::from_file(&args.scenario) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("{} {}: {}", "❌".red(), args.scenario.display(), e);
            std::process::exit(1);
        }
    };

    let issues = scenario.validate();
    if issues.is_empty() {
        println!("{} {}: schema OK", "✅".green(), args.scenario.display());
        return Ok(());
    }
    for issue in &issues {
        eprintln!("{} {}", "❌".red(), issue);
    }
    std::process::exit(1);
}
