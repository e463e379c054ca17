//! RawAction to scenario-step mapping
//!
//! Each recognized action kind maps onto exactly one step type; locator
//! chains become `by` selector expressions. Locator strings are
//! normalized on the way through (idempotently).

use serde_yaml::{Mapping, Value};

use flowreplay_common::Step;

use crate::ast::{LocatorCall, RawAction};

/// Normalize a locator string: strip the redundant `css=` prefix and
/// trailing whitespace. `normalize(normalize(s)) == normalize(s)`.
pub fn normalize_locator(value: &str) -> String {
    let mut out = value.trim_end();
    while let Some(stripped) = out.strip_prefix("css=") {
        out = stripped;
    }
    out.to_string()
}

/// A mapping failure that downgrades to a warning.
#[derive(Debug, Clone)]
pub struct MapDiagnostic {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct MapOutcome {
    pub steps: Vec<Step>,
    pub diagnostics: Vec<MapDiagnostic>,
}

pub struct Mapper;

impl Mapper {
    pub fn map(actions: &[RawAction]) -> MapOutcome {
        let mut outcome = MapOutcome::default();
        for action in actions {
            match Self::map_single(action) {
                Ok(step) => outcome.steps.push(step),
                Err(message) => outcome.diagnostics.push(MapDiagnostic {
                    line: action.line,
                    message,
                }),
            }
        }
        outcome
    }

    fn map_single(action: &RawAction) -> Result<Step, String> {
        let step_type = match action.kind.as_str() {
            "goto" => "goto",
            "click" => "click",
            "dblclick" => "dblclick",
            "fill" => "fill",
            "press" => "press",
            "check" => "check",
            "uncheck" => "uncheck",
            "select_option" => "selectOption",
            "scroll" => "scroll",
            "scroll_into_view" => "scrollIntoView",
            "expect_visible" => "expectVisible",
            "expect_hidden" => "expectHidden",
            "expect_text" => "expectText",
            "expect_url" => "expectUrl",
            other => return Err(format!("unknown action kind '{}'", other)),
        };

        let mut params = Mapping::new();

        match step_type {
            "goto" | "expectUrl" => {
                let url = action
                    .args
                    .get("url")
                    .ok_or_else(|| format!("{} without a URL", step_type))?;
                params.insert(Value::from("url"), Value::from(url.clone()));
            }
            "scroll" => {
                for key in ["deltaX", "deltaY"] {
                    let value: i64 = action
                        .args
                        .get(key)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    params.insert(Value::from(key), Value::from(value));
                }
            }
            _ => {
                let by = build_by(&action.locator_chain)?;
                params.insert(Value::from("by"), Value::Mapping(by));
                if let Some(frame) = &action.frame {
                    params.insert(Value::from("frame"), Value::from(frame.clone()));
                }
                match step_type {
                    "fill" | "selectOption" => {
                        let value = action.args.get("value").cloned().unwrap_or_default();
                        params.insert(Value::from("value"), Value::from(value));
                    }
                    "press" => {
                        let key = action
                            .args
                            .get("key")
                            .ok_or_else(|| "press without a key".to_string())?;
                        params.insert(Value::from("key"), Value::from(key.clone()));
                    }
                    "expectText" => {
                        if let Some(text) = action.args.get("text") {
                            params.insert(Value::from("text"), Value::from(text.clone()));
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Step::new(step_type, params))
    }
}

/// Convert the head of a locator chain into a `by` mapping. Trailing
/// chain links (`nth`, `filter`, `first`) have no declarative
/// counterpart and are rejected so the caller can warn.
fn build_by(chain: &[LocatorCall]) -> Result<Mapping, String> {
    let head = chain.first().ok_or_else(|| "empty locator chain".to_string())?;
    if chain.len() > 1 {
        let tail: Vec<&str> = chain[1..].iter().map(|c| c.method.as_str()).collect();
        return Err(format!(
            "locator chain '.{}' cannot be expressed declaratively",
            tail.join(".")
        ));
    }

    let mut by = Mapping::new();
    match head.method.as_str() {
        "get_by_role" => {
            let role = head
                .args
                .first()
                .ok_or_else(|| "get_by_role without a role".to_string())?;
            by.insert(Value::from("role"), Value::from(role.clone()));
            for (key, value) in &head.kwargs {
                match key.as_str() {
                    "name" => {
                        by.insert(Value::from("name"), Value::from(value.clone()));
                    }
                    "exact" => {
                        by.insert(Value::from("exact"), Value::from(value == "True"));
                    }
                    other => return Err(format!("unsupported get_by_role option '{}'", other)),
                }
            }
        }
        "get_by_test_id" => {
            let id = head
                .args
                .first()
                .ok_or_else(|| "get_by_test_id without a value".to_string())?;
            by.insert(Value::from("testId"), Value::from(id.clone()));
        }
        "get_by_label" => {
            let label = head
                .args
                .first()
                .ok_or_else(|| "get_by_label without a value".to_string())?;
            by.insert(Value::from("label"), Value::from(label.clone()));
        }
        "get_by_placeholder" => {
            let placeholder = head
                .args
                .first()
                .ok_or_else(|| "get_by_placeholder without a value".to_string())?;
            by.insert(Value::from("placeholder"), Value::from(placeholder.clone()));
        }
        "get_by_text" => {
            let text = head
                .args
                .first()
                .ok_or_else(|| "get_by_text without a value".to_string())?;
            by.insert(Value::from("text"), Value::from(text.clone()));
        }
        "locator" => {
            let css = head
                .args
                .first()
                .ok_or_else(|| "locator without a selector".to_string())?;
            by.insert(Value::from("css"), Value::from(normalize_locator(css)));
        }
        other => return Err(format!("unsupported locator method '{}'", other)),
    }
    Ok(by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ScriptParser;

    fn map_source(source: &str) -> MapOutcome {
        let parsed = ScriptParser::parse(source);
        Mapper::map(&parsed.actions)
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["css=#email", "#email", "button.save  ", "css=css=x"] {
            let once = normalize_locator(input);
            assert_eq!(normalize_locator(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn normalization_strips_prefix_and_trailing_whitespace() {
        assert_eq!(normalize_locator("css=#email"), "#email");
        assert_eq!(normalize_locator("button.save  "), "button.save");
    }

    #[test]
    fn role_click_maps_to_click_with_role_by() {
        let outcome = map_source(r#"page.get_by_role("button", name="Sign in").click()"#);
        let step = &outcome.steps[0];
        assert_eq!(step.kind, "click");
        let by = step.by().unwrap().unwrap();
        assert_eq!(by.describe(), "role='button', name='Sign in'");
    }

    #[test]
    fn exact_kwarg_becomes_a_bool() {
        let outcome =
            map_source(r#"page.get_by_role("button", name="OK", exact=True).click()"#);
        let by_value = outcome.steps[0].params.get("by").unwrap();
        assert_eq!(
            by_value.as_mapping().unwrap().get("exact"),
            Some(&Value::from(true))
        );
    }

    #[test]
    fn locator_fill_maps_to_css_fill() {
        let outcome = map_source(r#"page.locator("css=#password").fill("s3cret")"#);
        let step = &outcome.steps[0];
        assert_eq!(step.kind, "fill");
        assert_eq!(step.get_str("value"), Some("s3cret"));
        let by = step.by().unwrap().unwrap();
        assert_eq!(by.describe(), "css='#password'");
    }

    #[test]
    fn expectations_map_to_expect_steps() {
        let outcome = map_source(
            "expect(page.get_by_test_id(\"done\")).to_be_visible()\n\
             expect(page).to_have_url(\"https://x/done\")\n\
             expect(page.get_by_role(\"heading\")).to_contain_text(\"Welcome\")\n",
        );
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.steps[0].kind, "expectVisible");
        assert_eq!(outcome.steps[1].kind, "expectUrl");
        assert_eq!(outcome.steps[1].get_str("url"), Some("https://x/done"));
        assert_eq!(outcome.steps[2].kind, "expectText");
        assert_eq!(outcome.steps[2].get_str("text"), Some("Welcome"));
    }

    #[test]
    fn iframe_scope_lands_on_the_step() {
        let outcome = map_source(
            r#"page.locator("iframe").content_frame.get_by_label("Body").fill("x")"#,
        );
        assert_eq!(outcome.steps[0].get_str("frame"), Some("iframe"));
    }

    #[test]
    fn chained_locators_downgrade_to_warnings() {
        let outcome = map_source(r#"page.get_by_role("listitem").nth(2).click()"#);
        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("nth"));
    }

    #[test]
    fn wheel_maps_to_scroll_step() {
        let outcome = map_source("page.mouse.wheel(0, 480)");
        let step = &outcome.steps[0];
        assert_eq!(step.kind, "scroll");
        assert_eq!(step.params.get("deltaY"), Some(&Value::from(480)));
    }
}
