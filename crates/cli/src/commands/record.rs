//! Recording via the external recorder
//!
//! Spawns `npx playwright codegen` and places the raw script under
//! `recordings/`. Afterwards the recording is auto-imported into a
//! scenario; an import failure never discards the recording - the raw
//! script is kept and the manual command is printed.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use clap::Args;
use colored::Colorize;

use super::import::{write_outcome, ImportArgs};

#[derive(Args)]
pub struct RecordArgs {
    /// URL to record against (prompted for when omitted)
    pub url: Option<String>,

    /// Output scenario path (defaults to flows/<slug>.yaml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Browser channel (chrome / chromium / msedge)
    #[arg(short, long, default_value = "chrome")]
    pub channel: String,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, default_value = "1280x720")]
    pub viewport: String,

    /// Keep only the raw script; skip the scenario conversion
    #[arg(long)]
    pub no_import: bool,

    /// Insert expectVisible after deterministic interactions
    #[arg(long)]
    pub with_expects: bool,
}

pub fn execute(args: RecordArgs) -> anyhow::Result<()> {
    let url = match args.url {
        Some(url) => url,
        None => prompt("URL to record: ")?,
    };

    let slug = slugify(&url);
    let raw_path = PathBuf::from("recordings").join(format!("raw_{}.py", slug));
    std::fs::create_dir_all("recordings")?;

    println!("recording {} (close the browser window to finish)", url);
    let mut cmd = Command::new("npx");
    cmd.args(["playwright", "codegen", "--target", "python"])
        .arg(format!("--viewport-size={}", args.viewport.replace('x', ",")))
        .arg("--output")
        .arg(&raw_path);
    if args.channel != "chromium" {
        cmd.args(["--channel", &args.channel]);
    }
    cmd.arg(&url);

    let status = cmd.status().map_err(|e| {
        anyhow::anyhow!("could not launch the recorder (is Playwright installed?): {}", e)
    })?;
    if !status.success() {
        eprintln!("{} recorder exited with {}", "❌".red(), status);
        std::process::exit(1);
    }
    if !raw_path.exists() {
        println!("recording cancelled, nothing written");
        return Ok(());
    }
    println!("{} recording saved: {}", "✅".green(), raw_path.display());

    if args.no_import {
        return Ok(());
    }

    let scenario_path = args
        .output
        .unwrap_or_else(|| PathBuf::from("flows").join(format!("{}.yaml", slug)));
    let import_args = ImportArgs {
        source: raw_path.clone(),
        output: scenario_path.clone(),
        with_expects: args.with_expects,
        title: None,
    };
    // the recording survives an import failure; conversion can be rerun
    if let Err(e) = write_outcome(&import_args) {
        eprintln!("{} conversion failed: {}", "⚠️".yellow(), e);
        eprintln!(
            "the raw script is kept at {}; convert it manually with:\n  flowreplay import {} -o {}",
            raw_path.display(),
            raw_path.display(),
            scenario_path.display()
        );
    }
    Ok(())
}

fn prompt(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn slugify(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let mut slug = String::new();
    for c in without_scheme.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        "recording".to_string()
    } else {
        trimmed.chars().take(48).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(slugify("https://example.com/login"), "example_com_login");
        assert_eq!(slugify("http://127.0.0.1:3000/"), "127_0_0_1_3000");
        assert_eq!(slugify("!!!"), "recording");
    }
}
