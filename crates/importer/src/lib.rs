//! FlowReplay Importer
//!
//! Transforms a recorded replay script into a readable, hand-editable
//! scenario: recognize driver calls, map them to steps, then apply
//! naming, secret-detection and sectioning heuristics. Unknown call
//! shapes never abort a conversion; they downgrade to warnings plus
//! passthrough comments.

pub mod ast;
pub mod heuristics;
pub mod mapper;

use flowreplay_common::{Error, Result, Scenario};

pub use ast::{RawAction, ScriptParser};
pub use heuristics::{Heuristics, SectionRules};
pub use mapper::{normalize_locator, Mapper};

/// A non-fatal import finding.
#[derive(Debug, Clone)]
pub struct ImportDiagnostic {
    pub line: usize,
    pub message: String,
}

/// The converted scenario plus everything the conversion could not
/// express: warnings and the unconverted source lines.
#[derive(Debug)]
pub struct ImportOutcome {
    pub scenario: Scenario,
    pub diagnostics: Vec<ImportDiagnostic>,
    /// `(line, source)` pairs preserved as comments in the output
    pub passthrough: Vec<(usize, String)>,
}

#[derive(Debug, Default)]
pub struct Importer {
    pub with_expects: bool,
    pub rules: SectionRules,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expects(mut self, on: bool) -> Self {
        self.with_expects = on;
        self
    }

    /// Convert recorded script source into a scenario titled `title`.
    pub fn import(&self, source: &str, title: &str) -> Result<ImportOutcome> {
        let parsed = ScriptParser::parse(source);
        let mut diagnostics: Vec<ImportDiagnostic> = Vec::new();
        let mut passthrough: Vec<(usize, String)> = Vec::new();
        for d in parsed.diagnostics {
            diagnostics.push(ImportDiagnostic {
                line: d.line,
                message: d.message,
            });
            passthrough.push((d.line, d.source));
        }

        let mapped = Mapper::map(&parsed.actions);
        for d in mapped.diagnostics {
            diagnostics.push(ImportDiagnostic {
                line: d.line,
                message: d.message,
            });
        }

        if mapped.steps.is_empty() {
            return Err(Error::schema("no recognizable steps in the recording"));
        }

        let base_url = infer_base_url(&mapped.steps);
        let heuristics = Heuristics::new(self.with_expects, self.rules.clone());
        let (steps, notes) = heuristics.apply(mapped.steps);
        for note in notes {
            diagnostics.push(ImportDiagnostic {
                line: 0,
                message: format!("{}: {}", note.step_name, note.message),
            });
        }

        let scenario = Scenario {
            title: title.to_string(),
            base_url,
            vars: Default::default(),
            artifacts: Default::default(),
            hooks: Default::default(),
            steps,
            healing: Default::default(),
        };

        Ok(ImportOutcome {
            scenario,
            diagnostics,
            passthrough,
        })
    }
}

/// Base URL inferred from the first navigation.
fn infer_base_url(steps: &[flowreplay_common::Step]) -> String {
    for step in steps {
        if step.kind == "goto" {
            if let Some(url) = step.get_str("url") {
                if let Some(rest) = url.split_once("://") {
                    let host = rest.1.split('/').next().unwrap_or_default();
                    if !host.is_empty() {
                        return format!("{}://{}", rest.0, host);
                    }
                }
            }
        }
    }
    "http://localhost:3000".to_string()
}

/// Render the passthrough lines as trailing YAML comments.
pub fn passthrough_comments(passthrough: &[(usize, String)]) -> String {
    if passthrough.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n# unconverted recorder statements:\n");
    for (line, source) in passthrough {
        out.push_str(&format!("# line {}: {}\n", line, source));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowreplay_common::Linter;

    /// The login recording round-trips into the expected scenario shape.
    #[test]
    fn login_recording_imports_cleanly() {
        let source = r#"
page.goto("https://example.com/login")
page.get_by_label("Email").fill("u@e.com")
page.get_by_label("Password").fill("p@ss")
page.get_by_role("button", name="Sign in").click()
"#;
        let outcome = Importer::new().import(source, "login").unwrap();
        let scenario = &outcome.scenario;
        assert_eq!(scenario.base_url, "https://example.com");

        let flat = scenario.flat_steps();
        assert_eq!(flat.len(), 4);

        let kinds: Vec<&str> = flat.iter().map(|(_, s)| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["goto", "fill", "fill", "click"]);

        let names: Vec<&str> = flat.iter().map(|(_, s)| s.name().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "navigate-to-example",
                "fill-email",
                "fill-password",
                "click-sign-in"
            ]
        );

        // the password fill was marked secret
        assert!(!flat[1].1.secret());
        assert!(flat[2].1.secret());

        // the click landed on the role selector
        let by = flat[3].1.by().unwrap().unwrap();
        assert_eq!(by.describe(), "role='button', name='Sign in'");

        // and the result lints clean (no warnings)
        let issues = Linter::lint(scenario);
        assert!(
            !issues
                .iter()
                .any(|i| i.severity == flowreplay_common::LintSeverity::Warning),
            "unexpected warnings: {:?}",
            issues
        );
    }

    #[test]
    fn imported_scenarios_validate_and_roundtrip() {
        let source = r#"
page.goto("https://example.com/login")
page.get_by_label("Email").fill("u@e.com")
"#;
        let outcome = Importer::new().import(source, "roundtrip").unwrap();
        assert!(outcome.scenario.validate().is_empty());

        let dumped = outcome.scenario.to_yaml().unwrap();
        let reparsed = Scenario::from_yaml(&dumped).unwrap();
        assert_eq!(reparsed, outcome.scenario);
    }

    #[test]
    fn unknown_statements_survive_as_comments() {
        let source = r#"
page.goto("https://example.com/")
page.get_by_role("button").hover()
"#;
        let outcome = Importer::new().import(source, "partial").unwrap();
        assert_eq!(outcome.scenario.flat_steps().len(), 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        let comments = passthrough_comments(&outcome.passthrough);
        assert!(comments.contains("hover"));
        assert!(comments.contains("line 3"));
    }

    #[test]
    fn empty_recording_is_an_error() {
        let err = Importer::new().import("import re\n", "empty").unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }

    #[test]
    fn names_are_unique_within_a_scenario() {
        let source = r#"
page.goto("https://example.com/a")
page.get_by_test_id("save").click()
page.get_by_test_id("save").click()
"#;
        let outcome = Importer::new().import(source, "unique").unwrap();
        let flat = outcome.scenario.flat_steps();
        let mut names: Vec<&str> = flat.iter().map(|(_, s)| s.name().unwrap()).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn with_expects_never_inserts_after_navigation() {
        let source = r#"
page.goto("https://example.com/")
page.get_by_test_id("open").click()
"#;
        let outcome = Importer::new()
            .with_expects(true)
            .import(source, "expects")
            .unwrap();
        let flat = outcome.scenario.flat_steps();
        let kinds: Vec<&str> = flat.iter().map(|(_, s)| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["goto", "click", "expectVisible"]);
    }
}
