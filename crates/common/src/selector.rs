//! Selector algebra: the `By` expression model
//!
//! A `By` value identifies exactly one DOM target. Six single-selector
//! kinds map one-to-one onto driver locator primitives; `any` is an
//! ordered fallback list of single selectors. The candidate list is typed
//! as `SingleBy`, so nested `any` is unrepresentable.

use serde::{Deserialize, Serialize};

fn default_strict() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// Match by the stable `data-testid` attribute. The most robust kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestIdSelector {
    #[serde(rename = "testId")]
    pub test_id: String,
    #[serde(default = "default_strict", skip_serializing_if = "is_true")]
    pub strict: bool,
}

/// Match by accessibility role, optionally filtered by accessible name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleSelector {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exact accessible-name match instead of substring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<bool>,
    #[serde(default = "default_strict", skip_serializing_if = "is_true")]
    pub strict: bool,
}

/// Match a form control associated with the given label text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelSelector {
    pub label: String,
    #[serde(default = "default_strict", skip_serializing_if = "is_true")]
    pub strict: bool,
}

/// Match by the `placeholder` attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceholderSelector {
    pub placeholder: String,
    #[serde(default = "default_strict", skip_serializing_if = "is_true")]
    pub strict: bool,
}

/// CSS selector, optionally filtered by visible text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CssSelector {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default = "default_strict", skip_serializing_if = "is_true")]
    pub strict: bool,
}

/// Match by visible text content alone. Discouraged; the linter warns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextSelector {
    pub text: String,
    #[serde(default = "default_strict", skip_serializing_if = "is_true")]
    pub strict: bool,
}

/// A single (non-`any`) selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SingleBy {
    TestId(TestIdSelector),
    Role(RoleSelector),
    Label(LabelSelector),
    Placeholder(PlaceholderSelector),
    Css(CssSelector),
    Text(TextSelector),
}

/// Ordered fallback list; candidates are tried in declaration order and
/// the first one that is visible and matches exactly one element wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnySelector {
    pub any: Vec<SingleBy>,
}

/// The full selector expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum By {
    Any(AnySelector),
    Single(SingleBy),
}

impl SingleBy {
    /// Whether strict (exactly-one-match) resolution applies.
    pub fn strict(&self) -> bool {
        match self {
            SingleBy::TestId(s) => s.strict,
            SingleBy::Role(s) => s.strict,
            SingleBy::Label(s) => s.strict,
            SingleBy::Placeholder(s) => s.strict,
            SingleBy::Css(s) => s.strict,
            SingleBy::Text(s) => s.strict,
        }
    }

    /// The human-identifying strings carried by this selector, used by
    /// the linter and the importer for secret detection and naming.
    pub fn human_texts(&self) -> Vec<&str> {
        match self {
            SingleBy::TestId(s) => vec![s.test_id.as_str()],
            SingleBy::Role(s) => {
                let mut out = vec![s.role.as_str()];
                if let Some(name) = &s.name {
                    out.push(name.as_str());
                }
                out
            }
            SingleBy::Label(s) => vec![s.label.as_str()],
            SingleBy::Placeholder(s) => vec![s.placeholder.as_str()],
            SingleBy::Css(s) => {
                let mut out = vec![s.css.as_str()];
                if let Some(text) = &s.text {
                    out.push(text.as_str());
                }
                out
            }
            SingleBy::Text(s) => vec![s.text.as_str()],
        }
    }

    /// Human-readable description for logs and diagnostics.
    pub fn describe(&self) -> String {
        match self {
            SingleBy::TestId(s) => format!("testId='{}'", s.test_id),
            SingleBy::Role(s) => match &s.name {
                Some(name) => format!("role='{}', name='{}'", s.role, name),
                None => format!("role='{}'", s.role),
            },
            SingleBy::Label(s) => format!("label='{}'", s.label),
            SingleBy::Placeholder(s) => format!("placeholder='{}'", s.placeholder),
            SingleBy::Css(s) => match &s.text {
                Some(text) => format!("css='{}', text='{}'", s.css, text),
                None => format!("css='{}'", s.css),
            },
            SingleBy::Text(s) => format!("text='{}'", s.text),
        }
    }
}

impl By {
    pub fn describe(&self) -> String {
        match self {
            By::Single(s) => s.describe(),
            By::Any(a) => {
                let inner: Vec<String> = a.any.iter().map(|c| c.describe()).collect();
                format!("any=[{}]", inner.join(", "))
            }
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, By::Single(_))
    }

    /// True when this is a bare `text` selector (not a `css`/`role` filter).
    pub fn is_text_only(&self) -> bool {
        matches!(self, By::Single(SingleBy::Text(_)))
    }

    pub fn is_test_id(&self) -> bool {
        matches!(self, By::Single(SingleBy::TestId(_)))
    }

    /// All human-identifying strings across this expression.
    pub fn human_texts(&self) -> Vec<&str> {
        match self {
            By::Single(s) => s.human_texts(),
            By::Any(a) => a.any.iter().flat_map(|c| c.human_texts()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> By {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_every_single_kind() {
        assert!(matches!(
            parse("testId: submit"),
            By::Single(SingleBy::TestId(_))
        ));
        assert!(matches!(
            parse("role: button\nname: Save"),
            By::Single(SingleBy::Role(_))
        ));
        assert!(matches!(
            parse("label: Email"),
            By::Single(SingleBy::Label(_))
        ));
        assert!(matches!(
            parse("placeholder: Search"),
            By::Single(SingleBy::Placeholder(_))
        ));
        assert!(matches!(parse("css: '#main'"), By::Single(SingleBy::Css(_))));
        assert!(matches!(
            parse("text: Welcome"),
            By::Single(SingleBy::Text(_))
        ));
    }

    #[test]
    fn css_with_text_filter_is_css_not_text() {
        let by = parse("css: 'button.save'\ntext: Save");
        match by {
            By::Single(SingleBy::Css(css)) => {
                assert_eq!(css.css, "button.save");
                assert_eq!(css.text.as_deref(), Some("Save"));
            }
            other => panic!("expected css selector, got {:?}", other),
        }
    }

    #[test]
    fn strict_defaults_to_true_and_can_be_disabled() {
        let by = parse("testId: submit");
        assert!(matches!(by, By::Single(ref s) if s.strict()));

        let by = parse("testId: submit\nstrict: false");
        assert!(matches!(by, By::Single(ref s) if !s.strict()));
    }

    #[test]
    fn any_candidates_are_single_selectors() {
        let by = parse(
            "any:\n  - testId: save\n  - role: button\n    name: Save\n  - css: button.save",
        );
        match by {
            By::Any(a) => assert_eq!(a.any.len(), 3),
            other => panic!("expected any selector, got {:?}", other),
        }
    }

    #[test]
    fn nested_any_is_rejected() {
        let result: std::result::Result<By, _> =
            serde_yaml::from_str("any:\n  - any:\n      - testId: a\n      - testId: b\n  - testId: c");
        assert!(result.is_err());
    }

    #[test]
    fn describe_round_trips_the_shape() {
        let by = parse("role: button\nname: Save");
        assert_eq!(by.describe(), "role='button', name='Save'");
        let by = parse("any:\n  - testId: save\n  - css: button.save");
        assert_eq!(by.describe(), "any=[testId='save', css='button.save']");
    }

    #[test]
    fn serialization_omits_default_strict() {
        let by = parse("testId: submit");
        let dumped = serde_yaml::to_string(&by).unwrap();
        assert!(!dumped.contains("strict"));
        let back: By = serde_yaml::from_str(&dumped).unwrap();
        assert_eq!(back, by);
    }
}
