//! Selector resolution behavior against the in-memory driver:
//! strictness, `any` fallback ordering, exhaustion and healing.

use flowreplay_common::{By, Error, HealingMode};
use flowreplay_engine::driver::fake::{FakeDriver, FakeElement};
use flowreplay_engine::driver::Query;
use flowreplay_engine::SelectorResolver;

fn by(yaml: &str) -> By {
    serde_yaml::from_str(yaml).unwrap()
}

fn resolver(healing: HealingMode) -> SelectorResolver {
    SelectorResolver::new(healing)
}

#[tokio::test]
async fn single_selector_resolves_to_its_primitive() {
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("save").text("Save"));
    });
    let resolution = resolver(HealingMode::Off)
        .resolve(&driver, &by("testId: save"), None, 500)
        .await
        .unwrap();
    assert_eq!(
        resolution.locator.chain[0].query,
        Query::TestId {
            value: "save".into()
        }
    );
    assert!(resolution.notes.is_empty());
}

#[tokio::test]
async fn strict_is_the_default_and_ambiguity_fails_immediately() {
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().role("button", "Save"));
        dom.push(FakeElement::new().role("button", "Save"));
    });
    let err = resolver(HealingMode::Off)
        .resolve(&driver, &by("role: button\nname: Save"), None, 500)
        .await
        .unwrap_err();
    match err {
        Error::Ambiguous { count, .. } => assert_eq!(count, 2),
        other => panic!("expected Ambiguous, got {}", other),
    }
}

#[tokio::test]
async fn ambiguity_is_never_healed() {
    // same DOM, healing on: strict violations must not be widened away
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().role("button", "Save"));
        dom.push(FakeElement::new().role("button", "Save"));
        dom.push(FakeElement::new().test_id("Save"));
    });
    let err = resolver(HealingMode::Safe)
        .resolve(&driver, &by("role: button\nname: Save"), None, 500)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Ambiguous { .. }));
}

#[tokio::test]
async fn strict_false_takes_the_first_match() {
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().css("button").text("A"));
        dom.push(FakeElement::new().css("button").text("B"));
    });
    let resolution = resolver(HealingMode::Off)
        .resolve(&driver, &by("css: button\nstrict: false"), None, 500)
        .await
        .unwrap();
    assert_eq!(resolution.locator.chain[0].nth, Some(0));
}

#[tokio::test]
async fn missing_element_is_no_match_after_the_wait() {
    let driver = FakeDriver::new();
    let err = resolver(HealingMode::Off)
        .resolve(&driver, &by("testId: ghost"), None, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoMatch(_)), "got {}", err);
}

#[tokio::test]
async fn any_returns_the_first_satisfying_candidate() {
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("save"));
        dom.push(FakeElement::new().css("button.save"));
    });
    let selector = by(
        "any:\n  - {testId: save}\n  - {role: button, name: Save}\n  - {css: button.save}",
    );
    let resolution = resolver(HealingMode::Off)
        .resolve(&driver, &selector, None, 500)
        .await
        .unwrap();
    assert_eq!(
        resolution.locator.chain[0].query,
        Query::TestId {
            value: "save".into()
        }
    );
    // later candidates are never probed once an earlier one succeeds
    let actions = driver.dom.lock().unwrap().actions.clone();
    assert!(!actions.iter().any(|a| a.contains("css=button.save")));
}

#[tokio::test]
async fn any_falls_back_in_declaration_order() {
    // only the third candidate exists (spec scenario E2)
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().css("button.save").text("Save"));
    });
    let selector = by(
        "any:\n  - {testId: save}\n  - {role: button, name: Save}\n  - {css: button.save}",
    );
    let resolution = resolver(HealingMode::Off)
        .resolve(&driver, &selector, None, 300)
        .await
        .unwrap();
    assert_eq!(
        resolution.locator.chain[0].query,
        Query::Css {
            css: "button.save".into(),
            has_text: None
        }
    );
    assert!(resolution
        .notes
        .iter()
        .any(|n| n.contains("fell back to css='button.save'")));
}

#[tokio::test]
async fn any_exhaustion_reports_every_candidate_in_order() {
    let driver = FakeDriver::new().with_dom(|dom| {
        // two elements for the role candidate: a strict violation
        dom.push(FakeElement::new().role("button", "Save"));
        dom.push(FakeElement::new().role("button", "Save"));
        // hidden element for the css candidate
        dom.push(FakeElement::new().css("button.save").hidden());
    });
    let selector = by(
        "any:\n  - {testId: save}\n  - {role: button, name: Save}\n  - {css: button.save}",
    );
    let err = resolver(HealingMode::Off)
        .resolve(&driver, &selector, None, 120)
        .await
        .unwrap_err();
    match err {
        Error::AllCandidatesFailed(failures) => {
            assert_eq!(failures.len(), 3);
            assert_eq!(failures[0].index, 0);
            assert_eq!(failures[0].reason, "no match");
            assert_eq!(failures[1].index, 1);
            assert!(failures[1].reason.contains("2 matches"));
            assert_eq!(failures[2].index, 2);
            assert_eq!(failures[2].reason, "not visible");
        }
        other => panic!("expected AllCandidatesFailed, got {}", other),
    }
}

#[tokio::test]
async fn safe_healing_widens_a_no_match_label() {
    // label selector misses, but an element carries the label text as
    // its testId; healing should find it
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("Email"));
    });
    let resolution = resolver(HealingMode::Safe)
        .resolve(&driver, &by("label: Email"), None, 50)
        .await
        .unwrap();
    assert_eq!(
        resolution.locator.chain[0].query,
        Query::TestId {
            value: "Email".into()
        }
    );
    assert!(resolution.notes.iter().any(|n| n.contains("healed")));
}

#[tokio::test]
async fn healing_off_fails_without_widening() {
    let driver = FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("Email"));
    });
    let err = resolver(HealingMode::Off)
        .resolve(&driver, &by("label: Email"), None, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoMatch(_)));
}

#[tokio::test]
async fn healing_failure_records_the_attempted_variants() {
    let driver = FakeDriver::new();
    let err = resolver(HealingMode::Safe)
        .resolve(&driver, &by("label: Email"), None, 50)
        .await
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("healing attempt"), "got: {}", text);
}
