//! Static analysis

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use flowreplay_common::{LintSeverity, Linter, Scenario};

#[derive(Args)]
pub struct LintArgs {
    /// Scenario file to analyze
    pub scenario: PathBuf,
}

pub fn execute(args: LintArgs) -> anyhow::Result<()> {
    // lint is static analysis over anything that parses; schema
    // validation is `validate`'s job, not a gate in front of the linter
    let scenario = match Scenario::from_file(&args.scenario) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("{} {}: {}", "❌".red(), args.scenario.display(), e);
            std::process::exit(1);
        }
    };

    let issues = Linter::lint(&scenario);
    if issues.is_empty() {
        println!("{} {}: no findings", "✅".green(), args.scenario.display());
        return Ok(());
    }

    for issue in &issues {
        let severity = match issue.severity {
            LintSeverity::Error => "error".red(),
            LintSeverity::Warning => "warning".yellow(),
            LintSeverity::Info => "info".cyan(),
        };
        println!(
            "[{}] line {} ({}): {} [{}]",
            severity, issue.line, issue.step_name, issue.message, issue.rule
        );
    }

    let blocking = issues
        .iter()
        .any(|i| matches!(i.severity, LintSeverity::Error | LintSeverity::Warning));
    if blocking {
        std::process::exit(1);
    }
    Ok(())
}
