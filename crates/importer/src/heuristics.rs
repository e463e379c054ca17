//! Import heuristics
//!
//! Post-processing over mapped steps: verb-object auto-naming, secret
//! detection, optional assertion insertion and advisory auto-sectioning.

use serde_yaml::Value;

use flowreplay_common::{secrets::is_secret_hint, By, Section, SingleBy, Step, StepNode};

const NAME_MAX_LEN: usize = 40;
const VISIBLE_TEXT_TRUNCATION: usize = 30;

/// Interaction kinds; these get assertion insertions and benefit from
/// fallback selectors.
const INTERACTION_KINDS: &[&str] = &[
    "click",
    "dblclick",
    "fill",
    "press",
    "check",
    "uncheck",
    "selectOption",
];

const INPUT_KINDS: &[&str] = &["fill", "check", "uncheck", "selectOption", "press"];

/// Configurable sectioning thresholds. The split triggers are heuristic,
/// so the knobs live here instead of being buried as constants.
#[derive(Debug, Clone)]
pub struct SectionRules {
    /// Scenarios at or below this length are never sectioned
    pub min_steps: usize,
    /// Click targets that read as form submission
    pub submit_words: Vec<String>,
}

impl Default for SectionRules {
    fn default() -> Self {
        Self {
            min_steps: 6,
            submit_words: ["submit", "save", "sign in", "log in", "login", "search", "ok"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A heuristic finding surfaced to the user (e.g. detected secret).
#[derive(Debug, Clone)]
pub struct HeuristicNote {
    pub step_name: String,
    pub message: String,
}

pub struct Heuristics {
    pub with_expects: bool,
    pub rules: SectionRules,
}

impl Heuristics {
    pub fn new(with_expects: bool, rules: SectionRules) -> Self {
        Self {
            with_expects,
            rules,
        }
    }

    /// Apply naming, secret detection, expect insertion and sectioning,
    /// in that order.
    pub fn apply(&self, mut steps: Vec<Step>) -> (Vec<StepNode>, Vec<HeuristicNote>) {
        let mut notes = Vec::new();

        self.auto_name(&mut steps);

        for step in &mut steps {
            if step.kind == "fill" && !step.secret() && detect_secret(step) {
                step.params
                    .insert(Value::from("secret"), Value::from(true));
                notes.push(HeuristicNote {
                    step_name: step.display_name().to_string(),
                    message: "credential-like field detected, secret: true applied".to_string(),
                });
            }
        }

        if self.with_expects {
            steps = insert_expects(steps);
            // inserted steps need names and uniqueness too
            self.auto_name(&mut steps);
        }

        let nodes = auto_section(steps, &self.rules);
        (nodes, notes)
    }

    fn auto_name(&self, steps: &mut [Step]) {
        let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for step in steps.iter_mut() {
            if step.name().is_none() {
                let name = auto_name(step);
                step.params.insert(Value::from("name"), Value::from(name));
            }
            // collision suffixes keep names unique within the scenario
            let base = step.name().expect("named above").to_string();
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                let unique = format!("{}-{}", base, count);
                step.params.insert(Value::from("name"), Value::from(unique));
            }
        }
    }
}

/// Derive a verb-object kebab-case name from the step kind and the most
/// discriminating part of its target.
pub fn auto_name(step: &Step) -> String {
    let (verb, fallback) = match step.kind.as_str() {
        "goto" => ("navigate-to", "page"),
        "click" => ("click", "element"),
        "dblclick" => ("dblclick", "element"),
        "fill" => ("fill", "input"),
        "press" => ("press", "key"),
        "check" => ("check", "box"),
        "uncheck" => ("uncheck", "box"),
        "selectOption" => ("select", "option"),
        "scroll" => ("scroll", "page"),
        "scrollIntoView" => ("scroll-to", "element"),
        "expectVisible" => ("expect-visible", "element"),
        "expectHidden" => ("expect-hidden", "element"),
        "expectText" => ("expect-text", "element"),
        "expectUrl" => ("expect-url", "page"),
        other => (other, "step"),
    };

    let target = match step.kind.as_str() {
        "goto" => step.get_str("url").map(goto_target).unwrap_or_default(),
        "expectUrl" => step.get_str("url").map(url_path_target).unwrap_or_default(),
        "press" => step.get_str("key").unwrap_or_default().to_string(),
        _ => step
            .by()
            .ok()
            .flatten()
            .map(|by| by_target(&by))
            .unwrap_or_default(),
    };

    let object = sanitize_segment(&target);
    let object = if object.is_empty() {
        fallback.to_string()
    } else {
        object
    };
    truncate_name(&format!("{}-{}", sanitize_verb(verb), object))
}

/// The most discriminating string of a selector:
/// testId > role name > label > placeholder > visible text > css.
fn by_target(by: &By) -> String {
    let single = match by {
        By::Single(s) => s,
        By::Any(any) => match any.any.first() {
            Some(s) => s,
            None => return String::new(),
        },
    };
    match single {
        SingleBy::TestId(s) => s.test_id.clone(),
        SingleBy::Role(s) => s.name.clone().unwrap_or_else(|| s.role.clone()),
        SingleBy::Label(s) => s.label.clone(),
        SingleBy::Placeholder(s) => s.placeholder.clone(),
        SingleBy::Text(s) => truncate_chars(&s.text, VISIBLE_TEXT_TRUNCATION),
        SingleBy::Css(s) => match &s.text {
            Some(text) => truncate_chars(text, VISIBLE_TEXT_TRUNCATION),
            None => s.css.clone(),
        },
    }
}

/// Naming target for a navigation: the site label, so repeated
/// navigations across one host read naturally (`navigate-to-example`).
fn goto_target(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or_default();
    let host = host.strip_prefix("www.").unwrap_or(host);
    let label = host.split('.').next().unwrap_or_default();
    if label.is_empty() {
        url_path_target(url)
    } else {
        label.to_string()
    }
}

fn url_path_target(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let path = without_scheme
        .split_once('/')
        .map(|(_, p)| p)
        .unwrap_or_default();
    let segment = path.split('/').filter(|s| !s.is_empty()).last();
    segment.unwrap_or("home").to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn sanitize_verb(verb: &str) -> String {
    verb.to_string()
}

/// ASCII alphanumerics and hyphens, lowercase, no empty runs.
fn sanitize_segment(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_hyphen = true;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    out.trim_matches('-').to_string()
}

fn truncate_name(name: &str) -> String {
    if name.len() <= NAME_MAX_LEN {
        return name.to_string();
    }
    let cut: String = name.chars().take(NAME_MAX_LEN).collect();
    cut.trim_end_matches('-').to_string()
}

/// Does the fill step's selector (or name) read as credential-bearing?
fn detect_secret(step: &Step) -> bool {
    let mut hints: Vec<String> = Vec::new();
    if let Ok(Some(by)) = step.by() {
        hints.extend(by.human_texts().into_iter().map(str::to_string));
    }
    if let Some(name) = step.name() {
        hints.push(name.to_string());
    }
    hints.iter().any(|t| is_secret_hint(t))
}

/// Whether a selector pins its target deterministically enough to pair
/// with an inserted assertion.
fn deterministic_by(by: &By) -> bool {
    match by {
        By::Single(SingleBy::TestId(_)) => true,
        By::Single(SingleBy::Role(role)) => role.name.is_some(),
        _ => false,
    }
}

/// Insert `expectVisible` after interactions with deterministic
/// locators. Never after navigation; never when an assertion already
/// follows.
fn insert_expects(steps: Vec<Step>) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        out.push(step.clone());

        if !INTERACTION_KINDS.contains(&step.kind.as_str()) {
            continue;
        }
        let next_is_assertion = steps
            .get(i + 1)
            .map(|s| s.kind.starts_with("expect"))
            .unwrap_or(false);
        if next_is_assertion {
            continue;
        }
        let by = match step.by() {
            Ok(Some(by)) if deterministic_by(&by) => by,
            _ => continue,
        };

        let mut params = serde_yaml::Mapping::new();
        params.insert(
            Value::from("by"),
            serde_yaml::to_value(&by).expect("selector serializes"),
        );
        out.push(Step::new("expectVisible", params));
    }
    out
}

/// Partition consecutive steps into advisory sections. Split points:
/// a `goto` whose URL path differs from the previous one, and the step
/// after a submit-like click that concludes a run of input steps.
/// Ordering is never changed.
fn auto_section(steps: Vec<Step>, rules: &SectionRules) -> Vec<StepNode> {
    if steps.len() <= rules.min_steps {
        return steps.into_iter().map(StepNode::Step).collect();
    }

    let mut boundaries: Vec<usize> = Vec::new();
    let mut previous_path: Option<String> = None;
    for (i, step) in steps.iter().enumerate() {
        if step.kind == "goto" {
            let path = step.get_str("url").map(url_path_key).unwrap_or_default();
            if previous_path.as_deref() != Some(path.as_str()) {
                boundaries.push(i);
            }
            previous_path = Some(path);
        } else if i > 0 && is_submit_click(step, rules) {
            let prev = &steps[i - 1];
            if INPUT_KINDS.contains(&prev.kind.as_str()) {
                // the submission concludes this section
                boundaries.push(i + 1);
            }
        }
    }
    boundaries.retain(|b| *b < steps.len());
    boundaries.sort_unstable();
    boundaries.dedup();
    if boundaries.len() < 2 {
        return steps.into_iter().map(StepNode::Step).collect();
    }

    let mut nodes: Vec<StepNode> = Vec::new();
    let mut steps_iter = steps.into_iter().enumerate().peekable();

    // leading steps before the first boundary stay ungrouped
    let first_boundary = boundaries[0];
    let mut current: Vec<Step> = Vec::new();
    let mut current_start = first_boundary;

    while let Some((i, step)) = steps_iter.next() {
        if i < first_boundary {
            nodes.push(StepNode::Step(step));
            continue;
        }
        let next_boundary = boundaries.iter().find(|b| **b > current_start).copied();
        current.push(step);
        let closes = match next_boundary {
            Some(b) => steps_iter.peek().map(|(j, _)| *j == b).unwrap_or(true),
            None => steps_iter.peek().is_none(),
        };
        if closes {
            let title = section_title(&current);
            nodes.push(StepNode::Section(Section {
                title,
                steps: std::mem::take(&mut current),
            }));
            if let Some(b) = next_boundary {
                current_start = b;
            }
        }
    }
    nodes
}

fn url_path_key(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    match without_scheme.split_once('/') {
        Some((_, path)) => {
            let trimmed = path.trim_end_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                format!("/{}", trimmed)
            }
        }
        None => "/".to_string(),
    }
}

fn is_submit_click(step: &Step, rules: &SectionRules) -> bool {
    if step.kind != "click" {
        return false;
    }
    let target = step
        .by()
        .ok()
        .flatten()
        .map(|by| by_target(&by))
        .unwrap_or_default()
        .to_lowercase();
    rules.submit_words.iter().any(|w| target.contains(w))
}

fn section_title(steps: &[Step]) -> String {
    for step in steps {
        if step.kind == "goto" {
            if let Some(url) = step.get_str("url") {
                let segment = url_path_target(url);
                let title = sanitize_segment(&segment);
                if !title.is_empty() {
                    return title;
                }
            }
        }
    }
    // no navigation inside; name the section after its first step
    steps
        .first()
        .map(|s| s.display_name().to_string())
        .unwrap_or_else(|| "steps".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(yaml: &str) -> Step {
        Step::from_value(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn goto_name_uses_the_site_label() {
        assert_eq!(
            auto_name(&step("goto: https://example.com/login")),
            "navigate-to-example"
        );
        assert_eq!(
            auto_name(&step("goto: https://www.shop-app.io/cart")),
            "navigate-to-shop-app"
        );
    }

    #[test]
    fn selector_names_follow_discriminator_priority() {
        assert_eq!(
            auto_name(&step("click: {by: {testId: submit-order}}")),
            "click-submit-order"
        );
        assert_eq!(
            auto_name(&step("click: {by: {role: button, name: Sign in}}")),
            "click-sign-in"
        );
        assert_eq!(
            auto_name(&step("fill: {by: {label: Email}, value: x}")),
            "fill-email"
        );
        assert_eq!(
            auto_name(&step("press: {by: {label: Search}, key: Enter}")),
            "press-enter"
        );
    }

    #[test]
    fn names_match_the_required_shape() {
        let pattern = regex_lite::NamePattern;
        let cases = [
            step("goto: https://example.com/"),
            step("click: {by: {text: 'Accept Cookies & Continue!!'}}"),
            step("fill: {by: {css: '#x'}, value: v}"),
            step("scroll: {deltaY: 200}"),
            step("expectUrl: /done"),
        ];
        for case in cases {
            let name = auto_name(&case);
            assert!(pattern.matches(&name), "bad name: {}", name);
            assert!(name.len() <= NAME_MAX_LEN);
        }
    }

    /// tiny stand-in for the `[a-z]+(-[a-z0-9]+)+` shape check
    mod regex_lite {
        pub struct NamePattern;
        impl NamePattern {
            pub fn matches(&self, name: &str) -> bool {
                let segments: Vec<&str> = name.split('-').collect();
                if segments.len() < 2 {
                    return false;
                }
                let first_ok = !segments[0].is_empty()
                    && segments[0].chars().all(|c| c.is_ascii_lowercase());
                let rest_ok = segments[1..].iter().all(|s| {
                    !s.is_empty()
                        && s.chars()
                            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                });
                first_ok && rest_ok
            }
        }
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let heuristics = Heuristics::new(false, SectionRules::default());
        let steps = vec![
            step("click: {by: {testId: save}}"),
            step("click: {by: {testId: save}}"),
            step("click: {by: {testId: save}}"),
        ];
        let (nodes, _) = heuristics.apply(steps);
        let names: Vec<String> = nodes
            .iter()
            .map(|n| match n {
                StepNode::Step(s) => s.name().unwrap().to_string(),
                StepNode::Section(_) => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["click-save", "click-save-2", "click-save-3"]);
    }

    #[test]
    fn password_fill_gets_secret_true_and_a_note() {
        let heuristics = Heuristics::new(false, SectionRules::default());
        let steps = vec![step("fill: {by: {label: Password}, value: p@ss}")];
        let (nodes, notes) = heuristics.apply(steps);
        match &nodes[0] {
            StepNode::Step(s) => assert!(s.secret()),
            StepNode::Section(_) => unreachable!(),
        }
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.contains("secret"));
    }

    #[test]
    fn with_expects_inserts_after_deterministic_interactions_only() {
        let heuristics = Heuristics::new(true, SectionRules::default());
        let steps = vec![
            step("goto: https://example.com/"),
            step("click: {by: {testId: open-form}}"),
            step("fill: {by: {css: '#free-text'}, value: x}"),
        ];
        let (nodes, _) = heuristics.apply(steps);
        let kinds: Vec<&str> = nodes
            .iter()
            .map(|n| match n {
                StepNode::Step(s) => s.kind.as_str(),
                StepNode::Section(_) => unreachable!(),
            })
            .collect();
        // goto gets no assertion; the css fill is not deterministic
        assert_eq!(kinds, vec!["goto", "click", "expectVisible", "fill"]);
    }

    #[test]
    fn short_scenarios_are_never_sectioned() {
        let steps = vec![
            step("goto: https://example.com/login"),
            step("fill: {by: {label: Email}, value: x}"),
            step("goto: https://example.com/dashboard"),
        ];
        let nodes = auto_section(steps, &SectionRules::default());
        assert!(nodes.iter().all(|n| matches!(n, StepNode::Step(_))));
    }

    #[test]
    fn url_changes_open_new_sections_without_reordering() {
        let steps = vec![
            step("goto: https://example.com/login"),
            step("fill: {by: {label: Email}, value: x}"),
            step("fill: {by: {label: Password}, value: y}"),
            step("click: {by: {role: button, name: Sign in}}"),
            step("goto: https://example.com/dashboard"),
            step("expectVisible: {by: {testId: widget}}"),
            step("click: {by: {testId: widget}}"),
        ];
        let kinds_before: Vec<String> = steps.iter().map(|s| s.kind.clone()).collect();
        let nodes = auto_section(steps, &SectionRules::default());

        let sections: Vec<&Section> = nodes
            .iter()
            .filter_map(|n| match n {
                StepNode::Section(s) => Some(s),
                StepNode::Step(_) => None,
            })
            .collect();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "login");
        assert_eq!(sections[1].title, "dashboard");

        // flattening restores the original order
        let mut kinds_after = Vec::new();
        for node in &nodes {
            match node {
                StepNode::Step(s) => kinds_after.push(s.kind.clone()),
                StepNode::Section(s) => {
                    kinds_after.extend(s.steps.iter().map(|x| x.kind.clone()))
                }
            }
        }
        assert_eq!(kinds_before, kinds_after);
    }
}
