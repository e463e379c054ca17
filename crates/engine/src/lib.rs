//! FlowReplay Engine
//!
//! The replay side of the tool: a driver abstraction over the browser, a
//! selector resolver enforcing the strictness discipline, the step
//! registry with built-in and high-level handlers, the scenario runner,
//! the artifact manager and the report renderers.
//!
//! ```text
//! Scenario ──▶ Runner ──▶ StepRegistry ──▶ StepHandler ──▶ Driver
//!                 │              │                │
//!                 │              └── SelectorResolver (strict / any / healing)
//!                 ├── ArtifactManager (run-YYYYMMDD-HHMMSS/…)
//!                 └── Reporter (report.json / report.html / junit.xml)
//! ```

pub mod artifacts;
pub mod driver;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod steps;

pub use artifacts::{ArtifactManager, SecretSet};
pub use driver::{ContextEnv, Driver, DriverFactory, Locator, Query};
pub use registry::{StepContext, StepHandler, StepInfo, StepRegistry};
pub use report::Reporter;
pub use resolver::{Resolution, SelectorResolver};
pub use runner::{Runner, RunnerConfig, RunStatus, ScenarioResult, StepResult, StepStatus};
pub use steps::default_registry;
