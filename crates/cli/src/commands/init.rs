//! Project scaffolding

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct InitArgs {
    /// Project directory
    #[arg(default_value = ".")]
    pub dir: PathBuf,
}

const STARTER_CONFIG: &str = "\
# FlowReplay project settings
default_base_url: http://localhost:3000
artifacts_dir: artifacts
";

const STARTER_FLOW: &str = r#"# A minimal scenario to start from.
title: smoke
baseUrl: http://localhost:3000
steps:
  - goto: /
  - expectVisible:
      by: {role: heading}
      name: expect-visible-heading
"#;

pub fn execute(args: InitArgs) -> anyhow::Result<()> {
    for sub in ["flows", "recordings", "artifacts"] {
        std::fs::create_dir_all(args.dir.join(sub))?;
    }

    let config = args.dir.join("flowreplay.yaml");
    if !config.exists() {
        std::fs::write(&config, STARTER_CONFIG)?;
    }
    let sample = args.dir.join("flows").join("smoke.yaml");
    if !sample.exists() {
        std::fs::write(&sample, STARTER_FLOW)?;
    }

    println!(
        "{} project initialized at {}",
        "✅".green(),
        args.dir.canonicalize().unwrap_or(args.dir).display()
    );
    Ok(())
}
