//! Scenario runner
//!
//! The lifecycle driver: validate, create the run directory, launch a
//! browser context honoring the scenario environment, start tracing,
//! iterate steps with hooks and screenshots, contain errors, finalize
//! artifacts per policy and render reports.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{error, info, warn};

use flowreplay_common::{Error, Result, RetainMode, Scenario, ScreenshotMode, Step, VarScope};

use crate::artifacts::{ArtifactManager, SecretSet};
use crate::driver::{ContextEnv, Driver, DriverFactory, LoadState};
use crate::registry::{StepContext, StepRegistry};
use crate::report::Reporter;
use crate::resolver::SelectorResolver;

/// Runner execution settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub headed: bool,
    pub workers: usize,
    pub base_artifacts_dir: PathBuf,
    /// Delay inserted between driver operations, in milliseconds
    pub slow_mo_ms: u64,
    /// Per-step timeout in milliseconds; 0 disables the bound
    pub step_timeout_ms: u64,
    /// Whole-scenario timeout in milliseconds; 0 disables the bound
    pub scenario_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            headed: false,
            workers: 1,
            base_artifacts_dir: PathBuf::from("artifacts"),
            slow_mo_ms: 0,
            step_timeout_ms: 30_000,
            scenario_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub step_type: String,
    /// Zero-based position in the flattened step list
    pub index: usize,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pretty-printed selector of a failing step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Screenshot paths relative to the run directory
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Resolver and handler diagnostics (fallbacks, healing, scrolls)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
}

/// Aggregate outcome of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub title: String,
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    pub duration_ms: u64,
    pub started_at: String,
    pub finished_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// Drives scenarios through the step registry against launched drivers.
pub struct Runner {
    registry: Arc<StepRegistry>,
    factory: Arc<dyn DriverFactory>,
}

impl Runner {
    pub fn new(registry: Arc<StepRegistry>, factory: Arc<dyn DriverFactory>) -> Self {
        Self { registry, factory }
    }

    /// Run one scenario to completion. Setup failures (validation,
    /// filesystem, driver launch) are errors; step failures yield a
    /// failed result.
    pub async fn run(&self, scenario: &Scenario, config: &RunnerConfig) -> Result<ScenarioResult> {
        let (_tx, rx) = watch::channel(false);
        self.run_with_cancel(scenario, config, rx).await
    }

    /// Run scenarios with at most `config.workers` in flight. Result
    /// order follows input order; each scenario owns its own context and
    /// run directory.
    pub async fn run_many(
        self: Arc<Self>,
        scenarios: Vec<Scenario>,
        config: &RunnerConfig,
    ) -> Result<Vec<ScenarioResult>> {
        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
        let mut handles = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let runner = Arc::clone(&self);
            let config = config.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                runner.run(&scenario, &config).await
            }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.map_err(|e| Error::Driver(e.to_string()))??);
        }
        Ok(results)
    }

    pub async fn run_with_cancel(
        &self,
        scenario: &Scenario,
        config: &RunnerConfig,
        cancel: watch::Receiver<bool>,
    ) -> Result<ScenarioResult> {
        if let Some(issue) = scenario.validate().into_iter().next() {
            return Err(Error::Schema {
                message: issue.message,
                location: issue.location,
                line: issue.line,
            });
        }

        let started = Local::now();
        let start = Instant::now();

        let mut scope = VarScope::from_process_env(scenario.vars.clone());
        let mut artifacts =
            ArtifactManager::create(&config.base_artifacts_dir, scenario, started)?;
        artifacts.set_secrets(SecretSet::collect(scenario, &scope));

        let env = self.context_env(scenario, config, &scope, &artifacts)?;
        let driver = self.factory.launch(&env).await?;

        if scenario.artifacts.trace.mode != RetainMode::None {
            driver.start_tracing().await?;
        }

        let mut result = ScenarioResult {
            title: scenario.title.clone(),
            status: RunStatus::Passed,
            steps: Vec::new(),
            duration_ms: 0,
            started_at: started.to_rfc3339(),
            finished_at: started.to_rfc3339(),
            run_dir: Some(artifacts.run_dir().to_path_buf()),
        };

        artifacts.log_line(&format!("scenario start: {}", scenario.title));

        let outcome = self
            .run_steps(
                scenario,
                config,
                driver.as_ref(),
                &artifacts,
                &mut scope,
                cancel,
                &mut result,
            )
            .await;

        if let Err(e) = &outcome {
            // setup-level failure inside the loop (not a step failure)
            error!("scenario aborted: {}", e);
            result.status = RunStatus::Failed;
        }

        // console output drains into logs/ regardless of outcome
        if let Ok(messages) = driver.drain_console().await {
            let lines: Vec<String> = messages
                .iter()
                .map(|m| format!("[{}] {}", m.level, m.text))
                .collect();
            artifacts.console_lines(&lines);
        }

        if let Err(e) = artifacts.save_trace(driver.as_ref()).await {
            warn!("trace save failed: {}", e);
        }
        if let Err(e) = driver.close().await {
            warn!("driver close failed: {}", e);
        }

        if result.status == RunStatus::Passed {
            artifacts.cleanup_on_success()?;
        }
        artifacts.save_flow_copy()?;
        artifacts.save_env_snapshot(&scope)?;

        result.duration_ms = start.elapsed().as_millis() as u64;
        result.finished_at = Local::now().to_rfc3339();
        artifacts.log_line(&format!(
            "scenario finished: {} ({} steps, {:?}, {}ms)",
            scenario.title,
            result.steps.len(),
            result.status,
            result.duration_ms
        ));

        let reporter = Reporter::new();
        reporter.write_all(&result, artifacts.run_dir())?;

        Ok(result)
    }

    /// Browser context environment derived from well-known scenario vars.
    fn context_env(
        &self,
        scenario: &Scenario,
        config: &RunnerConfig,
        scope: &VarScope,
        artifacts: &ArtifactManager,
    ) -> Result<ContextEnv> {
        let expanded = |key: &str| -> Result<Option<String>> {
            match scenario.vars.get(key) {
                Some(template) => Ok(Some(scope.expand(template)?)),
                None => Ok(None),
            }
        };

        let viewport = match (expanded("viewportWidth")?, expanded("viewportHeight")?) {
            (Some(w), Some(h)) => {
                let w = w.parse::<u32>().map_err(|_| {
                    Error::Var(format!("viewportWidth is not a number: {}", w))
                })?;
                let h = h.parse::<u32>().map_err(|_| {
                    Error::Var(format!("viewportHeight is not a number: {}", h))
                })?;
                Some((w, h))
            }
            _ => None,
        };

        let extra_headers = match expanded("extraHeaders")? {
            Some(raw) => raw
                .split(',')
                .filter_map(|pair| {
                    pair.split_once(':')
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(ContextEnv {
            headed: config.headed,
            slow_mo_ms: config.slow_mo_ms,
            viewport,
            timezone: expanded("timezone")?,
            locale: expanded("locale")?,
            extra_headers,
            storage_state_path: expanded("storageState")?.map(PathBuf::from),
            record_video_dir: (scenario.artifacts.video.mode != RetainMode::None)
                .then(|| artifacts.video_dir()),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_steps(
        &self,
        scenario: &Scenario,
        config: &RunnerConfig,
        driver: &dyn Driver,
        artifacts: &ArtifactManager,
        scope: &mut VarScope,
        mut cancel: watch::Receiver<bool>,
        result: &mut ScenarioResult,
    ) -> Result<()> {
        let resolver = SelectorResolver::new(scenario.healing);
        let mut console_errors: Vec<String> = Vec::new();
        let scenario_deadline = (config.scenario_timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(config.scenario_timeout_ms));

        // When the first step is not a goto, land on the base URL first.
        if !scenario.starts_with_goto() {
            driver.goto(&scenario.base_url).await?;
            driver
                .wait_for_load_state(LoadState::DomContentLoaded, Some(config.step_timeout_ms))
                .await?;
        }

        let flat: Vec<(Option<String>, Step)> = scenario
            .flat_steps()
            .into_iter()
            .map(|(section, step)| (section.map(str::to_string), step.clone()))
            .collect();

        for (index, (section, step)) in flat.iter().enumerate() {
            if *cancel.borrow() {
                let mut cancelled = self.blank_result(step, index, section.clone());
                cancelled.status = StepStatus::Failed;
                cancelled.error = Some(Error::Cancelled.to_string());
                artifacts.log_line(&format!("[{:04}] cancelled before {}", index + 1, cancelled.name));
                result.steps.push(cancelled);
                result.status = RunStatus::Failed;
                return Ok(());
            }

            if let Some(deadline) = scenario_deadline {
                if Instant::now() >= deadline {
                    let mut timed_out = self.blank_result(step, index, section.clone());
                    timed_out.status = StepStatus::Failed;
                    timed_out.error = Some(
                        Error::Timeout {
                            what: "scenario".to_string(),
                            ms: config.scenario_timeout_ms,
                        }
                        .to_string(),
                    );
                    result.steps.push(timed_out);
                    result.status = RunStatus::Failed;
                    return Ok(());
                }
            }

            let step_result = self
                .execute_step(
                    scenario,
                    config,
                    driver,
                    artifacts,
                    &resolver,
                    scope,
                    &mut console_errors,
                    &mut cancel,
                    step,
                    index,
                    section.clone(),
                )
                .await;

            let failed = step_result.status == StepStatus::Failed;
            self.log_step(artifacts, &step_result);
            result.steps.push(step_result);
            if failed {
                result.status = RunStatus::Failed;
                return Ok(());
            }
        }
        Ok(())
    }

    fn blank_result(&self, step: &Step, index: usize, section: Option<String>) -> StepResult {
        StepResult {
            name: step.display_name().to_string(),
            step_type: step.kind.clone(),
            index,
            status: StepStatus::Passed,
            duration_ms: 0,
            error: None,
            selector: None,
            screenshots: Vec::new(),
            section,
            notes: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        scenario: &Scenario,
        config: &RunnerConfig,
        driver: &dyn Driver,
        artifacts: &ArtifactManager,
        resolver: &SelectorResolver,
        scope: &mut VarScope,
        console_errors: &mut Vec<String>,
        cancel: &mut watch::Receiver<bool>,
        step: &Step,
        index: usize,
        section: Option<String>,
    ) -> StepResult {
        let mut step_result = self.blank_result(step, index, section);
        let ordinal = index + 1;
        let start = Instant::now();
        let mut notes: Vec<String> = Vec::new();
        let mut hook_failure = false;

        let body = async {
            let mode = artifacts.screenshot_mode();
            if matches!(
                mode,
                ScreenshotMode::BeforeEachStep | ScreenshotMode::BeforeAndAfter
            ) {
                let path = artifacts
                    .save_step_screenshot(driver, ordinal, step.display_name(), "before")
                    .await?;
                step_result
                    .screenshots
                    .push(relative_to(artifacts.run_dir(), &path));
            }

            // hooks run outside the retry/containment of the step body;
            // a hook failure aborts the scenario
            for hook in &scenario.hooks.before_each_step {
                if let Err(e) = self
                    .dispatch(
                        driver, resolver, scope, artifacts, console_errors, &mut notes, config,
                        ordinal, hook,
                    )
                    .await
                {
                    hook_failure = true;
                    return Err(Error::Assertion(format!(
                        "beforeEachStep hook '{}' failed: {}",
                        hook.display_name(),
                        e
                    )));
                }
            }

            let dispatched = self
                .dispatch_with_timeout(
                    driver, resolver, scope, artifacts, console_errors, &mut notes, config,
                    ordinal, step,
                )
                .await;
            dispatched?;

            for hook in &scenario.hooks.after_each_step {
                if let Err(e) = self
                    .dispatch(
                        driver, resolver, scope, artifacts, console_errors, &mut notes, config,
                        ordinal, hook,
                    )
                    .await
                {
                    hook_failure = true;
                    return Err(Error::Assertion(format!(
                        "afterEachStep hook '{}' failed: {}",
                        hook.display_name(),
                        e
                    )));
                }
            }

            if artifacts.screenshot_mode() == ScreenshotMode::BeforeAndAfter {
                let path = artifacts
                    .save_step_screenshot(driver, ordinal, step.display_name(), "after")
                    .await?;
                step_result
                    .screenshots
                    .push(relative_to(artifacts.run_dir(), &path));
            }
            Ok(())
        };

        let outcome = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(Error::Cancelled),
            r = body => r,
        };

        if let Err(e) = outcome {
            step_result.status = StepStatus::Failed;
            step_result.error = Some(e.to_string());
            step_result.selector = step.by().ok().flatten().map(|by| by.describe());
            if hook_failure {
                error!("hook failure at step '{}': {}", step_result.name, e);
            } else {
                error!("step '{}' (index {}) failed: {}", step_result.name, index, e);
            }

            match artifacts
                .save_step_screenshot(driver, ordinal, step.display_name(), "failed")
                .await
            {
                Ok(path) => step_result
                    .screenshots
                    .push(relative_to(artifacts.run_dir(), &path)),
                Err(shot_err) => warn!("failure screenshot not saved: {}", shot_err),
            }
        }

        // console output observed during the step feeds the log and the
        // assertNoConsoleError bookkeeping
        if let Ok(messages) = driver.drain_console().await {
            let mut lines = Vec::new();
            for message in messages {
                lines.push(format!("[{}] {}", message.level, message.text));
                if message.level == "error" {
                    console_errors.push(message.text);
                }
            }
            artifacts.console_lines(&lines);
        }

        step_result.notes = notes;
        step_result.duration_ms = start.elapsed().as_millis() as u64;
        step_result
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_with_timeout(
        &self,
        driver: &dyn Driver,
        resolver: &SelectorResolver,
        scope: &mut VarScope,
        artifacts: &ArtifactManager,
        console_errors: &mut Vec<String>,
        notes: &mut Vec<String>,
        config: &RunnerConfig,
        ordinal: usize,
        step: &Step,
    ) -> Result<()> {
        if config.step_timeout_ms == 0 {
            return self
                .dispatch(
                    driver, resolver, scope, artifacts, console_errors, notes, config, ordinal,
                    step,
                )
                .await;
        }
        let budget = Duration::from_millis(config.step_timeout_ms);
        match tokio::time::timeout(
            budget,
            self.dispatch(
                driver, resolver, scope, artifacts, console_errors, notes, config, ordinal, step,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                what: format!("step '{}'", step.display_name()),
                ms: config.step_timeout_ms,
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        driver: &dyn Driver,
        resolver: &SelectorResolver,
        scope: &mut VarScope,
        artifacts: &ArtifactManager,
        console_errors: &mut Vec<String>,
        notes: &mut Vec<String>,
        config: &RunnerConfig,
        ordinal: usize,
        step: &Step,
    ) -> Result<()> {
        let handler = self.registry.get(&step.kind)?;
        // substitution happens lazily, right before execution
        let params = expand_params(scope, &step.params)?;
        let mut ctx = StepContext {
            resolver,
            vars: scope,
            artifacts: Some(artifacts),
            console_errors,
            notes,
            timeout_ms: if config.step_timeout_ms == 0 {
                30_000
            } else {
                config.step_timeout_ms
            },
            ordinal,
        };
        handler.execute(driver, &params, &mut ctx).await?;
        if config.slow_mo_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.slow_mo_ms)).await;
        }
        Ok(())
    }

    fn log_step(&self, artifacts: &ArtifactManager, step_result: &StepResult) {
        let status = match step_result.status {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        artifacts.log_line(&format!(
            "[{:04}] {} {} ({}) {}ms",
            step_result.index + 1,
            status,
            step_result.name,
            step_result.step_type,
            step_result.duration_ms
        ));
        for note in &step_result.notes {
            artifacts.log_line(&format!("[{:04}]   note: {}", step_result.index + 1, note));
        }
        if let Some(error) = &step_result.error {
            artifacts.log_line(&format!("[{:04}]   error: {}", step_result.index + 1, error));
        }
        if step_result.status == StepStatus::Passed {
            info!(
                "step {} '{}' passed ({}ms)",
                step_result.index, step_result.name, step_result.duration_ms
            );
        }
    }
}

/// Resolves once the cancellation signal fires. A closed channel means
/// no cancellation can ever arrive, so the future stays pending.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn expand_params(scope: &VarScope, params: &Mapping) -> Result<Mapping> {
    match scope.expand_value(&Value::Mapping(params.clone()))? {
        Value::Mapping(m) => Ok(m),
        _ => unreachable!("expansion preserves the value shape"),
    }
}

fn relative_to(base: &std::path::Path, path: &std::path::Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
