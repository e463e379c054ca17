//! Run reports
//!
//! Renders a scenario result into three forms: `report.json` (faithful
//! serialization plus a summary), `report.html` (self-contained page) and
//! `junit.xml` (one testcase per step for CI ingestion).

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::info;

use flowreplay_common::Result;

use crate::runner::{ScenarioResult, StepResult, StepStatus};

#[derive(Debug, Default)]
pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    /// Write all three report forms into `dir`.
    pub fn write_all(&self, result: &ScenarioResult, dir: &Path) -> Result<()> {
        self.write_json(result, dir)?;
        self.write_html(result, dir)?;
        self.write_junit(result, dir)?;
        Ok(())
    }

    pub fn write_json(&self, result: &ScenarioResult, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let summary = summarize(&result.steps);
        let mut document = serde_json::to_value(result)?;
        document["summary"] = json!({
            "total": summary.total,
            "passed": summary.passed,
            "failed": summary.failed,
            "skipped": summary.skipped,
        });
        let path = dir.join("report.json");
        std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        info!("report written: {}", path.display());
        Ok(path)
    }

    pub fn write_html(&self, result: &ScenarioResult, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("report.html");
        std::fs::write(&path, render_html(result))?;
        info!("report written: {}", path.display());
        Ok(path)
    }

    pub fn write_junit(&self, result: &ScenarioResult, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("junit.xml");
        std::fs::write(&path, render_junit(result))?;
        info!("report written: {}", path.display());
        Ok(path)
    }
}

struct Summary {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
}

fn summarize(steps: &[StepResult]) -> Summary {
    Summary {
        total: steps.len(),
        passed: steps.iter().filter(|s| s.status == StepStatus::Passed).count(),
        failed: steps.iter().filter(|s| s.status == StepStatus::Failed).count(),
        skipped: steps.iter().filter(|s| s.status == StepStatus::Skipped).count(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn render_html(result: &ScenarioResult) -> String {
    let summary = summarize(&result.steps);
    let status_class = if result.passed() { "passed" } else { "failed" };

    let mut rows = String::new();
    let mut current_section: Option<&str> = None;
    for step in &result.steps {
        if step.section.as_deref() != current_section {
            current_section = step.section.as_deref();
            if let Some(title) = current_section {
                rows.push_str(&format!(
                    "<tr class=\"section\"><td colspan=\"5\">{}</td></tr>\n",
                    escape(title)
                ));
            }
        }

        let status = match step.status {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        let shots = step
            .screenshots
            .iter()
            .map(|s| format!("<a href=\"{}\">{}</a>", escape(s), escape(s)))
            .collect::<Vec<_>>()
            .join("<br>");
        rows.push_str(&format!(
            "<tr class=\"{status}\"><td>{index}</td><td>{name}</td><td>{kind}</td>\
             <td>{duration} ms</td><td>{shots}</td></tr>\n",
            status = status,
            index = step.index,
            name = escape(&step.name),
            kind = escape(&step.step_type),
            duration = step.duration_ms,
            shots = shots,
        ));

        // expanded failure panel with the failing selector and error
        if step.status == StepStatus::Failed {
            let selector = step
                .selector
                .as_deref()
                .map(escape)
                .unwrap_or_else(|| "-".to_string());
            let error = step.error.as_deref().map(escape).unwrap_or_default();
            let notes = step
                .notes
                .iter()
                .map(|n| escape(n))
                .collect::<Vec<_>>()
                .join("<br>");
            rows.push_str(&format!(
                "<tr class=\"failure-panel\"><td colspan=\"5\">\
                 <div><strong>selector</strong>: <code>{selector}</code></div>\
                 <div><strong>error</strong>: <pre>{error}</pre></div>\
                 <div>{notes}</div></td></tr>\n"
            ));
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: ui-sans-serif, system-ui, sans-serif; margin: 2rem; color: #1f2430; }}
h1 span.passed {{ color: #117733; }}
h1 span.failed {{ color: #b3261e; }}
table {{ border-collapse: collapse; width: 100%; }}
td, th {{ border: 1px solid #d8dbe2; padding: 0.4rem 0.6rem; text-align: left; }}
tr.section td {{ background: #eef1f6; font-weight: 600; }}
tr.failed td {{ background: #fdecea; }}
tr.failure-panel td {{ background: #fff7f6; }}
pre {{ margin: 0.2rem 0; white-space: pre-wrap; }}
.meta {{ color: #5b6472; margin-bottom: 1rem; }}
</style>
</head>
<body>
<h1>{title} <span class="{status_class}">{status_text}</span></h1>
<div class="meta">
  {total} steps, {passed} passed, {failed} failed, {skipped} skipped,
  {duration} ms, started {started}
</div>
<table>
<tr><th>#</th><th>step</th><th>type</th><th>duration</th><th>screenshots</th></tr>
{rows}
</table>
</body>
</html>
"#,
        title = escape(&result.title),
        status_class = status_class,
        status_text = status_class,
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        duration = result.duration_ms,
        started = escape(&result.started_at),
        rows = rows,
    )
}

fn render_junit(result: &ScenarioResult) -> String {
    let summary = summarize(&result.steps);
    let mut cases = String::new();
    for step in &result.steps {
        let name = escape(&step.name);
        let class = escape(&result.title);
        let time = step.duration_ms as f64 / 1000.0;
        match step.status {
            StepStatus::Failed => {
                let message = escape(step.error.as_deref().unwrap_or("step failed"));
                cases.push_str(&format!(
                    "    <testcase name=\"{name}\" classname=\"{class}\" time=\"{time:.3}\">\n\
                     \x20     <failure message=\"{message}\">{message}</failure>\n\
                     \x20   </testcase>\n"
                ));
            }
            StepStatus::Skipped => {
                cases.push_str(&format!(
                    "    <testcase name=\"{name}\" classname=\"{class}\" time=\"{time:.3}\">\n\
                     \x20     <skipped/>\n\
                     \x20   </testcase>\n"
                ));
            }
            StepStatus::Passed => {
                cases.push_str(&format!(
                    "    <testcase name=\"{name}\" classname=\"{class}\" time=\"{time:.3}\"/>\n"
                ));
            }
        }
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <testsuites>\n\
         \x20 <testsuite name=\"{title}\" tests=\"{total}\" failures=\"{failed}\" \
         skipped=\"{skipped}\" time=\"{time:.3}\">\n\
         {cases}\
         \x20 </testsuite>\n\
         </testsuites>\n",
        title = escape(&result.title),
        total = summary.total,
        failed = summary.failed,
        skipped = summary.skipped,
        time = result.duration_ms as f64 / 1000.0,
        cases = cases,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ScenarioResult {
        ScenarioResult {
            title: "login flow".to_string(),
            status: crate::runner::RunStatus::Failed,
            steps: vec![
                StepResult {
                    name: "navigate-to-login".to_string(),
                    step_type: "goto".to_string(),
                    index: 0,
                    status: StepStatus::Passed,
                    duration_ms: 120,
                    error: None,
                    selector: None,
                    screenshots: vec!["screenshots/0001_before-navigate-to-login.jpg".into()],
                    section: Some("login".to_string()),
                    notes: vec![],
                },
                StepResult {
                    name: "click-save".to_string(),
                    step_type: "click".to_string(),
                    index: 1,
                    status: StepStatus::Failed,
                    duration_ms: 2005,
                    error: Some("No element matches testId='save'".to_string()),
                    selector: Some("testId='save'".to_string()),
                    screenshots: vec![],
                    section: None,
                    notes: vec!["fell back to css='button.save'".to_string()],
                },
            ],
            duration_ms: 2125,
            started_at: "2025-06-01T10:00:00+09:00".to_string(),
            finished_at: "2025-06-01T10:00:02+09:00".to_string(),
            run_dir: None,
        }
    }

    #[test]
    fn json_report_has_summary_and_all_step_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = Reporter::new().write_json(&sample_result(), dir.path()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["summary"]["total"], 2);
        assert_eq!(doc["summary"]["failed"], 1);
        assert_eq!(doc["steps"][0]["name"], "navigate-to-login");
        assert_eq!(doc["steps"][1]["selector"], "testId='save'");
        assert_eq!(doc["steps"][0]["section"], "login");
    }

    #[test]
    fn html_report_shows_failure_panel_with_selector() {
        let html = render_html(&sample_result());
        assert!(html.contains("failure-panel"));
        assert!(html.contains("testId=&#39;save&#39;") || html.contains("testId='save'"));
        assert!(html.contains("No element matches"));
        assert!(html.contains("login flow"));
        // section heading row
        assert!(html.contains("class=\"section\""));
    }

    #[test]
    fn junit_report_marks_the_failed_testcase() {
        let xml = render_junit(&sample_result());
        assert!(xml.contains("tests=\"2\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("<failure message=\"No element matches testId=&#39;save&#39;\"")
            || xml.contains("<failure message=\"No element matches"));
        assert!(xml.contains("testcase name=\"navigate-to-login\""));
    }
}
