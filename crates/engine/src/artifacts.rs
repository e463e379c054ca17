//! Run artifact management
//!
//! Owns the per-run directory layout: `run-YYYYMMDD-HHMMSS/` with
//! `screenshots/`, `trace/`, `video/` and `logs/` beneath it. Persists
//! screenshots, traces, logs, the scenario copy and the environment
//! snapshot. Every value originating from a `secret: true` step or
//! variable is replaced by a fixed mask before anything touches disk.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use flowreplay_common::{
    secrets::{mask_values, MASK},
    vars::referenced_vars,
    RetainMode, Result, Scenario, ScreenshotMode, VarScope,
};

use crate::driver::Driver;

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]+").unwrap());

/// Plaintext values and variable names collected from `secret: true`
/// steps; everything the artifact layer writes is filtered through this.
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    pub values: Vec<String>,
    pub var_names: BTreeSet<String>,
    pub env_names: BTreeSet<String>,
}

impl SecretSet {
    /// Walk the scenario for secret fill steps, resolving their value
    /// templates so the plaintext can be recognized in any output.
    pub fn collect(scenario: &Scenario, scope: &VarScope) -> Self {
        let mut out = SecretSet::default();
        let hook_steps = scenario
            .hooks
            .before_each_step
            .iter()
            .chain(scenario.hooks.after_each_step.iter());
        for step in scenario
            .flat_steps()
            .into_iter()
            .map(|(_, s)| s)
            .chain(hook_steps)
        {
            if !step.secret() {
                continue;
            }
            if let Some(template) = step.get_str("value") {
                if let Ok(resolved) = scope.expand(template) {
                    if !resolved.is_empty() {
                        out.values.push(resolved);
                    }
                }
                for (namespace, name) in referenced_vars(template) {
                    match namespace.as_str() {
                        "env" => {
                            out.env_names.insert(name);
                        }
                        _ => {
                            out.var_names.insert(name);
                        }
                    }
                }
            }
        }
        out
    }

    pub fn mask(&self, text: &str) -> String {
        mask_values(text, &self.values)
    }
}

/// Owns one run directory and the files inside it.
pub struct ArtifactManager {
    scenario: Scenario,
    run_dir: PathBuf,
    secrets: SecretSet,
}

impl ArtifactManager {
    /// Create `base_dir/run-YYYYMMDD-HHMMSS` and its subdirectories.
    /// Parallel scenarios starting in the same second get a numeric
    /// suffix so every run owns a disjoint directory.
    pub fn create(base_dir: &Path, scenario: &Scenario, now: DateTime<Local>) -> Result<Self> {
        let stamp = now.format("%Y%m%d-%H%M%S");
        let mut run_dir = base_dir.join(format!("run-{}", stamp));
        let mut attempt = 1;
        while run_dir.exists() {
            attempt += 1;
            run_dir = base_dir.join(format!("run-{}-{}", stamp, attempt));
        }
        for sub in ["screenshots", "trace", "video", "logs"] {
            std::fs::create_dir_all(run_dir.join(sub))?;
        }
        info!("run directory: {}", run_dir.display());
        Ok(Self {
            scenario: scenario.clone(),
            run_dir,
            secrets: SecretSet::default(),
        })
    }

    pub fn set_secrets(&mut self, secrets: SecretSet) {
        self.secrets = secrets;
    }

    pub fn secrets(&self) -> &SecretSet {
        &self.secrets
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn video_dir(&self) -> PathBuf {
        self.run_dir.join("video")
    }

    /// Capture a step screenshot named `NNNN_<phase>-<step-name>.<ext>`,
    /// where NNNN is the 1-based step ordinal, zero-padded to 4 digits.
    pub async fn save_step_screenshot(
        &self,
        driver: &dyn Driver,
        ordinal: usize,
        step_name: &str,
        phase: &str,
    ) -> Result<PathBuf> {
        let shots = &self.scenario.artifacts.screenshots;
        let filename = format!(
            "{:04}_{}-{}.{}",
            ordinal,
            phase,
            sanitize_step_name(step_name),
            shots.format.extension()
        );
        let path = self.run_dir.join("screenshots").join(filename);
        driver
            .screenshot(&path, shots.format, shots.quality)
            .await?;
        debug!("screenshot saved: {}", path.display());
        Ok(path)
    }

    /// Stop tracing into `trace/trace.zip` when the policy records one.
    pub async fn save_trace(&self, driver: &dyn Driver) -> Result<Option<PathBuf>> {
        if self.scenario.artifacts.trace.mode == RetainMode::None {
            return Ok(None);
        }
        let path = self.run_dir.join("trace").join("trace.zip");
        driver.stop_tracing(&path).await?;
        Ok(Some(path))
    }

    /// Persist the scenario as executed to `flow.yaml`. The copy keeps
    /// variable templates, never resolved secret values.
    pub fn save_flow_copy(&self) -> Result<PathBuf> {
        let path = self.run_dir.join("flow.yaml");
        self.scenario.write_file(&path)?;
        Ok(path)
    }

    /// Write `env.json`: recorded context environment plus resolved
    /// variables, with secret-originated values replaced by the mask.
    pub fn save_env_snapshot(&self, scope: &VarScope) -> Result<PathBuf> {
        let mut vars = serde_json::Map::new();
        for (name, value) in scope.vars() {
            let masked = self.secrets.var_names.contains(name)
                || self.secrets.values.iter().any(|s| s == value);
            vars.insert(
                name.clone(),
                json!(if masked { MASK } else { value.as_str() }),
            );
        }

        // Environment variables the scenario references, masked when a
        // secret step consumed them.
        let mut env = serde_json::Map::new();
        for name in &self.secrets.env_names {
            env.insert(name.clone(), json!(MASK));
        }

        let snapshot = json!({
            "title": self.scenario.title,
            "baseUrl": self.scenario.base_url,
            "healing": self.scenario.healing,
            "viewport": self.scenario.vars.get("viewportWidth").and_then(|w| {
                self.scenario.vars.get("viewportHeight").map(|h| format!("{}x{}", w, h))
            }),
            "timezone": self.scenario.vars.get("timezone"),
            "locale": self.scenario.vars.get("locale"),
            "extraHeaders": self.scenario.vars.get("extraHeaders").map(|h| self.secrets.mask(h)),
            "vars": vars,
            "env": env,
            "os": std::env::consts::OS,
            "timestamp": Local::now().to_rfc3339(),
            "version": flowreplay_common::VERSION,
        });

        let path = self.run_dir.join("env.json");
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(path)
    }

    /// On success, drop artifacts recorded under an `on_failure` policy.
    pub fn cleanup_on_success(&self) -> Result<()> {
        if self.scenario.artifacts.trace.mode == RetainMode::OnFailure {
            let trace_dir = self.run_dir.join("trace");
            clear_dir(&trace_dir)?;
            info!("success cleanup: trace/ emptied");
        }
        if self.scenario.artifacts.video.mode == RetainMode::OnFailure {
            let video_dir = self.run_dir.join("video");
            clear_dir(&video_dir)?;
            info!("success cleanup: video/ emptied");
        }
        Ok(())
    }

    /// Append a masked line to `logs/runner.log`.
    pub fn log_line(&self, line: &str) {
        let masked = self.secrets.mask(line);
        if let Err(e) = append_line(&self.run_dir.join("logs").join("runner.log"), &masked) {
            warn!("runner.log write failed: {}", e);
        }
    }

    /// Append masked console messages to `logs/console.log`.
    pub fn console_lines(&self, lines: &[String]) {
        let path = self.run_dir.join("logs").join("console.log");
        for line in lines {
            if let Err(e) = append_line(&path, &self.secrets.mask(line)) {
                warn!("console.log write failed: {}", e);
                break;
            }
        }
    }

    /// The screenshot capture mode in force.
    pub fn screenshot_mode(&self) -> ScreenshotMode {
        self.scenario.artifacts.screenshots.mode
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)
}

fn clear_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(entry.path())?;
            } else {
                std::fs::remove_file(entry.path())?;
            }
        }
    }
    Ok(())
}

/// File-name-safe step name: lowercase, `[a-z0-9-]`, letter-first.
fn sanitize_step_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let replaced = UNSAFE_NAME_CHARS.replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches('-');
    let cleaned = trimmed
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if cleaned.chars().next().map_or(true, |c| !c.is_ascii_lowercase()) {
        format!("step-{}", if cleaned.is_empty() { "unnamed".into() } else { cleaned })
    } else {
        cleaned
    }
}
