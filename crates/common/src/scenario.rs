//! Scenario document model
//!
//! The root document of a replayable workflow: title, base URL, variables,
//! artifact policy, hooks and an ordered step sequence. Steps are kept as
//! `(kind, params)` pairs rather than a closed enum so that plugin step
//! types participate in validation, linting and execution exactly like the
//! built-ins; the owning handler supplies the typed payload check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};
use crate::selector::By;

/// Selector self-healing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealingMode {
    /// Fail immediately on selector mismatch
    #[default]
    Off,
    /// Retry `NoMatch` failures with a widened selector schedule
    Safe,
}

/// When step screenshots are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotMode {
    #[default]
    BeforeEachStep,
    BeforeAndAfter,
    None,
}

/// Screenshot image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Jpeg,
    Png,
}

impl ScreenshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ScreenshotFormat::Jpeg => "jpg",
            ScreenshotFormat::Png => "png",
        }
    }
}

/// Retention policy for traces and videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainMode {
    /// Record, but keep the artifact only when the run fails
    #[default]
    OnFailure,
    Always,
    None,
}

fn default_quality() -> u8 {
    70
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    #[serde(default)]
    pub mode: ScreenshotMode,
    #[serde(default)]
    pub format: ScreenshotFormat,
    /// JPEG quality, 1..=100
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            mode: ScreenshotMode::default(),
            format: ScreenshotFormat::default(),
            quality: default_quality(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub mode: RetainMode,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default)]
    pub mode: RetainMode,
}

/// The three independent artifact sub-policies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub screenshots: ScreenshotConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

/// Ordered step lists run around every top-level step. Hooks cannot
/// contain hooks or sections; the type admits plain steps only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(rename = "beforeEachStep", default, skip_serializing_if = "Vec::is_empty")]
    pub before_each_step: Vec<Step>,
    #[serde(rename = "afterEachStep", default, skip_serializing_if = "Vec::is_empty")]
    pub after_each_step: Vec<Step>,
}

/// One operation: a step-type name plus its raw payload mapping.
///
/// The YAML shape is a single-key mapping `{ <kind>: <payload> }`. Scalar
/// payload shorthands (`goto: /login`, `log: hello`) are folded into the
/// canonical payload key at parse time so handlers always see a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub kind: String,
    pub params: Mapping,
}

/// Canonical payload key for step kinds that accept a scalar shorthand.
fn scalar_payload_key(kind: &str) -> Option<&'static str> {
    match kind {
        "goto" | "expectUrl" => Some("url"),
        "log" => Some("message"),
        "waitForToast" => Some("text"),
        "useStorageState" | "saveStorageState" => Some("path"),
        "screenshot" => Some("name"),
        _ => None,
    }
}

impl Step {
    pub fn new(kind: impl Into<String>, params: Mapping) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    /// Build a step from one YAML list entry.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_mapping()
            .ok_or_else(|| Error::schema("step must be a single-key mapping"))?;
        if map.len() != 1 {
            return Err(Error::schema(format!(
                "step must have exactly one key, found {}",
                map.len()
            )));
        }
        let (key, payload) = map.iter().next().expect("len checked above");
        let kind = key
            .as_str()
            .ok_or_else(|| Error::schema("step key must be a string"))?
            .to_string();

        let params = match payload {
            Value::Mapping(m) => m.clone(),
            Value::String(s) => {
                let field = scalar_payload_key(&kind).ok_or_else(|| {
                    Error::schema(format!("step '{}' requires a mapping payload", kind))
                })?;
                let mut m = Mapping::new();
                m.insert(Value::from(field), Value::from(s.clone()));
                m
            }
            Value::Bool(_) | Value::Null => Mapping::new(),
            other => {
                return Err(Error::schema(format!(
                    "step '{}' has an unsupported payload: {:?}",
                    kind, other
                )))
            }
        };

        Ok(Step { kind, params })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert(
            Value::from(self.kind.clone()),
            Value::Mapping(self.params.clone()),
        );
        Value::Mapping(map)
    }

    /// The explicit step name, if any.
    pub fn name(&self) -> Option<&str> {
        self.params.get("name").and_then(Value::as_str)
    }

    /// Step name falling back to the kind when unnamed.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(&self.kind)
    }

    pub fn secret(&self) -> bool {
        self.params
            .get("secret")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `by` selector expression, when present and well-formed.
    pub fn by(&self) -> Result<Option<By>> {
        match self.params.get("by") {
            None => Ok(None),
            Some(value) => {
                let by: By = serde_yaml::from_value(value.clone()).map_err(|e| Error::Schema {
                    message: format!("invalid selector: {}", e),
                    location: format!("{}.by", self.kind),
                    line: None,
                })?;
                Ok(Some(by))
            }
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

impl Serialize for Step {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Step::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// A labeled group of consecutive steps. Grouping only; a section has no
/// runtime semantics beyond the name recorded on its steps' results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub steps: Vec<Step>,
}

/// One entry in the scenario's top-level step list.
#[derive(Debug, Clone, PartialEq)]
pub enum StepNode {
    Step(Step),
    Section(Section),
}

impl StepNode {
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(map) = value.as_mapping() {
            if map.len() == 1 {
                if let Some(payload) = map.get("section") {
                    let section: Section =
                        serde_yaml::from_value(payload.clone()).map_err(|e| Error::Schema {
                            message: format!("invalid section: {}", e),
                            location: "section".to_string(),
                            line: None,
                        })?;
                    return Ok(StepNode::Section(section));
                }
            }
        }
        Step::from_value(value).map(StepNode::Step)
    }

    pub fn to_value(&self) -> Value {
        match self {
            StepNode::Step(step) => step.to_value(),
            StepNode::Section(section) => {
                let mut map = Mapping::new();
                map.insert(
                    Value::from("section"),
                    serde_yaml::to_value(section).expect("section serializes"),
                );
                Value::Mapping(map)
            }
        }
    }
}

impl Serialize for StepNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StepNode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        StepNode::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// The root scenario document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub title: String,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_default_artifacts")]
    pub artifacts: ArtifactsConfig,
    #[serde(default, skip_serializing_if = "is_default_hooks")]
    pub hooks: HooksConfig,
    pub steps: Vec<StepNode>,
    #[serde(default, skip_serializing_if = "is_default_healing")]
    pub healing: HealingMode,
}

fn is_default_artifacts(a: &ArtifactsConfig) -> bool {
    *a == ArtifactsConfig::default()
}

fn is_default_hooks(h: &HooksConfig) -> bool {
    *h == HooksConfig::default()
}

fn is_default_healing(h: &HealingMode) -> bool {
    *h == HealingMode::default()
}

impl Scenario {
    /// Flatten sections away, pairing each step with its containing
    /// section title. Execution order is unchanged.
    pub fn flat_steps(&self) -> Vec<(Option<&str>, &Step)> {
        let mut out = Vec::new();
        for node in &self.steps {
            match node {
                StepNode::Step(step) => out.push((None, step)),
                StepNode::Section(section) => {
                    for step in &section.steps {
                        out.push((Some(section.title.as_str()), step));
                    }
                }
            }
        }
        out
    }

    /// True when the first executable step is a `goto`.
    pub fn starts_with_goto(&self) -> bool {
        self.flat_steps()
            .first()
            .map(|(_, step)| step.kind == "goto")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_goto_payload_is_folded_to_url() {
        let step = Step::from_value(&serde_yaml::from_str("goto: /login").unwrap()).unwrap();
        assert_eq!(step.kind, "goto");
        assert_eq!(step.get_str("url"), Some("/login"));
    }

    #[test]
    fn scalar_payload_on_selector_step_is_rejected() {
        let result = Step::from_value(&serde_yaml::from_str("click: submit").unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn multi_key_step_is_rejected() {
        let value = serde_yaml::from_str("click: {by: {testId: a}}\nfill: {by: {testId: b}}").unwrap();
        assert!(Step::from_value(&value).is_err());
    }

    #[test]
    fn section_node_parses_and_flattens_in_order() {
        let yaml = r#"
title: flow
baseUrl: http://localhost:3000
steps:
  - goto: /login
  - section:
      title: sign in
      steps:
        - fill: {by: {label: Email}, value: u@e.com}
        - click: {by: {role: button, name: Sign in}}
  - expectUrl: /dashboard
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        let flat = scenario.flat_steps();
        assert_eq!(flat.len(), 4);
        assert_eq!(flat[0].0, None);
        assert_eq!(flat[1].0, Some("sign in"));
        assert_eq!(flat[2].0, Some("sign in"));
        assert_eq!(flat[3].0, None);
        assert_eq!(flat[3].1.kind, "expectUrl");
        assert!(scenario.starts_with_goto());
    }

    #[test]
    fn step_selector_extraction() {
        let step =
            Step::from_value(&serde_yaml::from_str("click: {by: {testId: save}}").unwrap()).unwrap();
        let by = step.by().unwrap().unwrap();
        assert!(by.is_test_id());
    }

    #[test]
    fn secret_flag_defaults_false() {
        let step = Step::from_value(
            &serde_yaml::from_str("fill: {by: {label: Password}, value: x, secret: true}").unwrap(),
        )
        .unwrap();
        assert!(step.secret());
        let step =
            Step::from_value(&serde_yaml::from_str("fill: {by: {label: Email}, value: x}").unwrap())
                .unwrap();
        assert!(!step.secret());
    }
}
