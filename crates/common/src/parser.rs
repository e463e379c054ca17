//! Scenario document load, dump and validation
//!
//! Reading materializes the YAML into the typed model and rejects
//! malformed input with the failing field path and source line where the
//! parser exposes one. Dumping is value-preserving: for every valid
//! scenario S, `parse(dump(S))` equals S. Comments are not retained by
//! the underlying representation; field order is.

use std::path::Path;

use crate::error::{Error, Result};
use crate::scenario::{Scenario, Step, StepNode};
use crate::selector::By;
use crate::vars::has_invalid_reference;

/// One finding from semantic validation.
#[derive(Debug, Clone)]
pub struct SchemaIssue {
    pub message: String,
    pub location: String,
    pub line: Option<usize>,
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", self.location, line, self.message),
            None => write!(f, "{}: {}", self.location, self.message),
        }
    }
}

fn yaml_error_to_schema(err: serde_yaml::Error) -> Error {
    let line = err.location().map(|loc| loc.line());
    Error::Schema {
        message: err.to_string(),
        location: "document".to_string(),
        line,
    }
}

impl Scenario {
    /// Parse a scenario from YAML text. Structural typing only; call
    /// [`Scenario::validate`] for the semantic rules.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(yaml_error_to_schema)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Schema {
            message: format!("cannot read {}: {}", path.display(), e),
            location: "file".to_string(),
            line: None,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and fully validate; the first semantic issue is an error.
    /// This is the entry point execution uses.
    pub fn load(path: &Path) -> Result<Self> {
        let scenario = Self::from_file(path)?;
        if let Some(issue) = scenario.validate().into_iter().next() {
            return Err(Error::Schema {
                message: issue.message,
                location: issue.location,
                line: issue.line,
            });
        }
        Ok(scenario)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Semantic validation beyond structural typing.
    pub fn validate(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();

        if self.title.trim().is_empty() {
            issues.push(issue("title", "title must be non-empty"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            issues.push(issue("baseUrl", "baseUrl must be an absolute http(s) URL"));
        }
        if self.steps.is_empty() {
            issues.push(issue("steps", "steps must be non-empty"));
        }

        let quality = self.artifacts.screenshots.quality;
        if !(1..=100).contains(&quality) {
            issues.push(issue(
                "artifacts.screenshots.quality",
                format!("quality must be within 1..=100, got {}", quality),
            ));
        }

        for (name, value) in &self.vars {
            if has_invalid_reference(value) {
                issues.push(issue(
                    format!("vars.{}", name),
                    "only ${env.X} and ${vars.X} references are allowed",
                ));
            }
        }

        for node in &self.steps {
            if let StepNode::Section(section) = node {
                if section.title.trim().is_empty() {
                    issues.push(issue("section.title", "section title must be non-empty"));
                }
            }
        }

        for (ordinal, (_, step)) in self.flat_steps().into_iter().enumerate() {
            validate_step(step, ordinal + 1, &mut issues);
        }
        for step in &self.hooks.before_each_step {
            validate_step(step, 0, &mut issues);
        }
        for step in &self.hooks.after_each_step {
            validate_step(step, 0, &mut issues);
        }

        issues
    }
}

fn validate_step(step: &Step, line: usize, issues: &mut Vec<SchemaIssue>) {
    let location = format!("steps.{} ({})", step.display_name(), step.kind);
    match step.by() {
        Err(e) => issues.push(SchemaIssue {
            message: e.to_string(),
            location,
            line: Some(line),
        }),
        Ok(Some(By::Any(any))) => {
            if any.any.len() < 2 {
                issues.push(SchemaIssue {
                    message: format!(
                        "any fallback needs at least 2 candidates, got {}",
                        any.any.len()
                    ),
                    location,
                    line: Some(line),
                });
            }
        }
        Ok(_) => {}
    }
}

fn issue(location: impl Into<String>, message: impl Into<String>) -> SchemaIssue {
    SchemaIssue {
        message: message.into(),
        location: location.into(),
        line: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
title: login flow
baseUrl: https://app.example.com
vars:
  user: "${env.LOGIN_USER}"
artifacts:
  screenshots:
    mode: before_and_after
    format: png
    quality: 90
  trace:
    mode: always
hooks:
  beforeEachStep:
    - log: step starting
steps:
  - goto: /login
  - fill:
      by: {label: Email}
      value: "${vars.user}"
      name: fill-email
  - fill:
      by: {label: Password}
      value: "${env.LOGIN_PASSWORD}"
      secret: true
      name: fill-password
  - click:
      by:
        any:
          - {testId: sign-in}
          - {role: button, name: Sign in}
      name: click-sign-in
  - expectUrl: /dashboard
healing: safe
"#;

    #[test]
    fn parses_a_complete_document() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        assert_eq!(scenario.title, "login flow");
        assert_eq!(scenario.flat_steps().len(), 5);
        assert_eq!(scenario.hooks.before_each_step.len(), 1);
        assert!(scenario.validate().is_empty());
    }

    #[test]
    fn roundtrip_preserves_value() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        let dumped = scenario.to_yaml().unwrap();
        let reparsed = Scenario::from_yaml(&dumped).unwrap();
        assert_eq!(scenario, reparsed);
    }

    #[test]
    fn syntax_error_reports_a_line() {
        let err = Scenario::from_yaml("title: x\nbaseUrl: [unclosed").unwrap_err();
        match err {
            Error::Schema { line, .. } => assert!(line.is_some()),
            other => panic!("expected schema error, got {}", other),
        }
    }

    #[test]
    fn empty_steps_is_a_validation_issue() {
        let scenario = Scenario::from_yaml("title: x\nbaseUrl: http://h\nsteps: []").unwrap();
        let issues = scenario.validate();
        assert!(issues.iter().any(|i| i.location == "steps"));
    }

    #[test]
    fn single_candidate_any_is_rejected() {
        let yaml = r#"
title: x
baseUrl: http://h
steps:
  - click:
      by:
        any:
          - {testId: only-one}
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        let issues = scenario.validate();
        assert!(issues.iter().any(|i| i.message.contains("at least 2")));
    }

    #[test]
    fn bad_vars_namespace_is_rejected() {
        let yaml = "title: x\nbaseUrl: http://h\nvars:\n  a: '${nope.X}'\nsteps:\n  - goto: /\n";
        let scenario = Scenario::from_yaml(yaml).unwrap();
        let issues = scenario.validate();
        assert!(issues.iter().any(|i| i.location == "vars.a"));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let scenario =
            Scenario::from_yaml("title: x\nbaseUrl: /app\nsteps:\n  - goto: /\n").unwrap();
        let issues = scenario.validate();
        assert!(issues.iter().any(|i| i.location == "baseUrl"));
    }

    #[test]
    fn write_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flows/login.yaml");
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        scenario.write_file(&path).unwrap();
        let loaded = Scenario::load(&path).unwrap();
        assert_eq!(loaded, scenario);
    }
}
