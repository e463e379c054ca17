//! FlowReplay Common Library
//!
//! Shared scenario model, selector algebra, parser, linter and variable
//! substitution used by the engine, the importer and the CLI.

pub mod error;
pub mod linter;
pub mod parser;
pub mod scenario;
pub mod secrets;
pub mod selector;
pub mod vars;

pub use error::{CandidateFailure, Error, Result};
pub use linter::{LintIssue, LintSeverity, Linter};
pub use parser::SchemaIssue;
pub use scenario::{
    ArtifactsConfig, HealingMode, HooksConfig, RetainMode, Scenario, ScreenshotConfig,
    ScreenshotFormat, ScreenshotMode, Section, Step, StepNode,
};
pub use selector::{By, SingleBy};
pub use vars::VarScope;

/// FlowReplay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
