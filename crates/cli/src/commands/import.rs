//! Script-to-scenario conversion

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use flowreplay_importer::{passthrough_comments, Importer};

#[derive(Args)]
pub struct ImportArgs {
    /// Recorded script to convert
    pub source: PathBuf,

    /// Output scenario file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Insert expectVisible after deterministic interactions
    #[arg(long)]
    pub with_expects: bool,

    /// Scenario title (defaults to the source file name)
    #[arg(long)]
    pub title: Option<String>,
}

pub fn execute(args: ImportArgs) -> anyhow::Result<()> {
    match write_outcome(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{} {}", "❌".red(), e);
            std::process::exit(1);
        }
    }
}

/// Run the importer and write the scenario, appending unconverted
/// statements as trailing comments. Shared with `record`.
pub fn write_outcome(args: &ImportArgs) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(&args.source)?;
    let title = args.title.clone().unwrap_or_else(|| {
        args.source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "imported".to_string())
    });

    let importer = Importer::new().with_expects(args.with_expects);
    let outcome = importer.import(&source, &title)?;

    for diagnostic in &outcome.diagnostics {
        if diagnostic.line > 0 {
            println!(
                "{} line {}: {}",
                "⚠️".yellow(),
                diagnostic.line,
                diagnostic.message
            );
        } else {
            println!("{} {}", "⚠️".yellow(), diagnostic.message);
        }
    }

    let mut yaml = outcome.scenario.to_yaml()?;
    yaml.push_str(&passthrough_comments(&outcome.passthrough));
    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.output, yaml)?;

    println!(
        "{} scenario written: {} ({} steps)",
        "✅".green(),
        args.output.display(),
        outcome.scenario.flat_steps().len()
    );
    Ok(())
}
