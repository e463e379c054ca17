//! Variable environment and template substitution
//!
//! Two namespaces are recognized: `${env.X}` resolves from the process
//! environment snapshot, `${vars.X}` from the runtime variable scope.
//! Substitution runs lazily at step execution time; any other `${...}`
//! form, and any reference left unresolved after substitution, is an
//! error naming the offending reference.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::{Error, Result};

static VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(env|vars)\.([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

static UNRESOLVED_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{[^}]+\}").unwrap());

/// All `(namespace, name)` references in a template string.
pub fn referenced_vars(text: &str) -> Vec<(String, String)> {
    VAR_PATTERN
        .captures_iter(text)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

/// Returns true when `text` contains a `${...}` form outside the two
/// recognized namespaces. Used by document validation.
pub fn has_invalid_reference(text: &str) -> bool {
    UNRESOLVED_PATTERN
        .find_iter(text)
        .any(|m| !VAR_PATTERN.is_match(m.as_str()))
}

/// Mutable variable scope for one runner invocation.
#[derive(Debug, Clone, Default)]
pub struct VarScope {
    env: BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
}

impl VarScope {
    /// Build a scope from explicit maps. Tests inject `env` directly.
    pub fn new(env: BTreeMap<String, String>, vars: BTreeMap<String, String>) -> Self {
        Self { env, vars }
    }

    /// Build a scope over the real process environment.
    pub fn from_process_env(vars: BTreeMap<String, String>) -> Self {
        Self {
            env: std::env::vars().collect(),
            vars,
        }
    }

    /// Store a runtime variable (`storeText` / `storeAttr`).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Substitute all recognized references in `text`.
    ///
    /// Idempotent on success: the output contains no `${...}` form, so a
    /// second pass is the identity.
    pub fn expand(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in VAR_PATTERN.captures_iter(text) {
            let whole = caps.get(0).expect("capture 0 always present");
            out.push_str(&text[last..whole.start()]);
            let namespace = &caps[1];
            let name = &caps[2];
            let value = match namespace {
                "env" => self.env.get(name),
                "vars" => self.vars.get(name),
                _ => unreachable!("pattern limits namespaces"),
            };
            match value {
                Some(v) => out.push_str(v),
                None => {
                    return Err(Error::Var(format!(
                        "undefined reference ${{{}.{}}}",
                        namespace, name
                    )))
                }
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);

        if let Some(m) = UNRESOLVED_PATTERN.find(&out) {
            return Err(Error::Var(format!(
                "unrecognized reference {} (only ${{env.X}} and ${{vars.X}} are allowed)",
                m.as_str()
            )));
        }
        Ok(out)
    }

    /// Recursively substitute every string value inside a YAML value.
    /// Mapping keys are left untouched.
    pub fn expand_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.expand(s)?)),
            Value::Mapping(map) => {
                let mut out = serde_yaml::Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.expand_value(v)?);
                }
                Ok(Value::Mapping(out))
            }
            Value::Sequence(seq) => {
                let items: Result<Vec<Value>> = seq.iter().map(|v| self.expand_value(v)).collect();
                Ok(Value::Sequence(items?))
            }
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> VarScope {
        let env = BTreeMap::from([("HOME".to_string(), "/home/u".to_string())]);
        let vars = BTreeMap::from([("user".to_string(), "alice".to_string())]);
        VarScope::new(env, vars)
    }

    #[test]
    fn expands_both_namespaces() {
        let s = scope();
        assert_eq!(
            s.expand("hi ${vars.user}, home=${env.HOME}").unwrap(),
            "hi alice, home=/home/u"
        );
    }

    #[test]
    fn undefined_reference_names_the_variable() {
        let err = scope().expand("${env.MISSING}").unwrap_err();
        assert!(err.to_string().contains("env.MISSING"));
    }

    #[test]
    fn unknown_namespace_is_an_error() {
        let err = scope().expand("${secrets.KEY}").unwrap_err();
        assert!(matches!(err, Error::Var(_)));
    }

    #[test]
    fn substitution_is_idempotent() {
        let s = scope();
        let once = s.expand("x ${vars.user} y").unwrap();
        let twice = s.expand(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn stored_vars_are_visible_to_later_expansions() {
        let mut s = scope();
        s.set("orderId", "42");
        assert_eq!(s.expand("order ${vars.orderId}").unwrap(), "order 42");
    }

    #[test]
    fn expand_value_walks_nested_structures_but_not_keys() {
        let s = scope();
        let value: Value =
            serde_yaml::from_str("by: {label: '${vars.user}'}\nvalue: '${env.HOME}'").unwrap();
        let expanded = s.expand_value(&value).unwrap();
        let map = expanded.as_mapping().unwrap();
        assert_eq!(
            map.get("value").and_then(Value::as_str),
            Some("/home/u")
        );
        let by = map.get("by").unwrap().as_mapping().unwrap();
        assert_eq!(by.get("label").and_then(Value::as_str), Some("alice"));
    }

    #[test]
    fn invalid_reference_detection() {
        assert!(has_invalid_reference("${foo.bar}"));
        assert!(!has_invalid_reference("${env.A} and ${vars.b}"));
        assert!(!has_invalid_reference("plain text"));
    }
}
