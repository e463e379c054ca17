//! Static analysis over a parsed scenario
//!
//! Pure function from scenario to diagnostics; the linter never fails.

use serde::Serialize;

use crate::scenario::{Scenario, Step};
use crate::secrets::is_secret_hint;
use crate::selector::By;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LintSeverity::Error => write!(f, "error"),
            LintSeverity::Warning => write!(f, "warning"),
            LintSeverity::Info => write!(f, "info"),
        }
    }
}

/// One linter finding, carrying step identity and source position.
#[derive(Debug, Clone, Serialize)]
pub struct LintIssue {
    pub step_name: String,
    pub step_index: usize,
    pub line: usize,
    pub severity: LintSeverity,
    pub rule: &'static str,
    pub message: String,
}

/// Steps that interact with an element; these benefit from `any`
/// fallbacks the most.
const INTERACTION_KINDS: &[&str] = &[
    "click",
    "dblclick",
    "fill",
    "press",
    "check",
    "uncheck",
    "selectOption",
];

pub struct Linter;

impl Linter {
    pub fn lint(scenario: &Scenario) -> Vec<LintIssue> {
        let mut issues = Vec::new();
        for (index, (_, step)) in scenario.flat_steps().into_iter().enumerate() {
            let by = match step.by() {
                Ok(by) => by,
                // malformed selectors belong to validation, not lint
                Err(_) => continue,
            };
            check_text_only(step, index, by.as_ref(), &mut issues);
            check_missing_any(step, index, by.as_ref(), &mut issues);
            check_missing_secret(step, index, by.as_ref(), &mut issues);
        }
        issues
    }
}

fn check_text_only(step: &Step, index: usize, by: Option<&By>, issues: &mut Vec<LintIssue>) {
    if let Some(by) = by {
        if by.is_text_only() {
            issues.push(make_issue(
                step,
                index,
                LintSeverity::Warning,
                "text-only-selector",
                "bare text selector is unstable; prefer testId, role+name or css+text",
            ));
        }
    }
}

fn check_missing_any(step: &Step, index: usize, by: Option<&By>, issues: &mut Vec<LintIssue>) {
    if !INTERACTION_KINDS.contains(&step.kind.as_str()) {
        return;
    }
    if let Some(by) = by {
        if by.is_single() && !by.is_test_id() {
            issues.push(make_issue(
                step,
                index,
                LintSeverity::Info,
                "missing-any-fallback",
                "single non-testId selector; an any fallback list would make this step sturdier",
            ));
        }
    }
}

fn check_missing_secret(step: &Step, index: usize, by: Option<&By>, issues: &mut Vec<LintIssue>) {
    if step.kind != "fill" || step.secret() {
        return;
    }
    let mut hints: Vec<&str> = by.map(|b| b.human_texts()).unwrap_or_default();
    if let Some(name) = step.name() {
        hints.push(name);
    }
    if hints.iter().any(|t| is_secret_hint(t)) {
        issues.push(make_issue(
            step,
            index,
            LintSeverity::Warning,
            "missing-secret",
            "field looks credential-bearing but lacks secret: true; its value will not be masked",
        ));
    }
}

fn make_issue(
    step: &Step,
    index: usize,
    severity: LintSeverity,
    rule: &'static str,
    message: &str,
) -> LintIssue {
    LintIssue {
        step_name: step.display_name().to_string(),
        step_index: index,
        line: index + 1,
        severity,
        rule,
        message: message.to_string(),
    }
}
