//! Selector resolution
//!
//! Maps a declarative `By` expression onto a live locator under the
//! strictness discipline: the result matches exactly one visible element.
//! `any` expressions probe candidates in declaration order with a bounded
//! per-candidate wait; `safe` healing retries a no-match single selector
//! with a fixed widening schedule. Ambiguity is never healed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use flowreplay_common::{
    selector::{CssSelector, LabelSelector, RoleSelector, TestIdSelector, TextSelector},
    By, CandidateFailure, Error, HealingMode, Result, SingleBy,
};

use crate::driver::{Driver, ElementState, Locator, Query};

/// Map one single selector onto its driver locator primitive. Total: every
/// selector kind has exactly one image.
pub fn query_for(selector: &SingleBy) -> Query {
    match selector {
        SingleBy::TestId(s) => Query::TestId {
            value: s.test_id.clone(),
        },
        SingleBy::Role(s) => Query::Role {
            role: s.role.clone(),
            name: s.name.clone(),
            exact: s.exact.unwrap_or(false),
        },
        SingleBy::Label(s) => Query::Label {
            value: s.label.clone(),
        },
        SingleBy::Placeholder(s) => Query::Placeholder {
            value: s.placeholder.clone(),
        },
        SingleBy::Css(s) => Query::Css {
            css: s.css.clone(),
            has_text: s.text.clone(),
        },
        SingleBy::Text(s) => Query::Text {
            value: s.text.clone(),
            exact: false,
        },
    }
}

fn locator_for(selector: &SingleBy, frame: Option<&str>) -> Locator {
    Locator::new(query_for(selector)).in_frame(frame)
}

/// A resolved locator plus the diagnostics gathered on the way there
/// (fallback choice, healing attempts). The runner copies the notes onto
/// the step result.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub locator: Locator,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SelectorResolver {
    healing: HealingMode,
    /// Upper bound for each `any` candidate probe
    candidate_timeout_ms: u64,
    poll_interval_ms: u64,
}

impl SelectorResolver {
    pub fn new(healing: HealingMode) -> Self {
        Self {
            healing,
            candidate_timeout_ms: 2_000,
            poll_interval_ms: 50,
        }
    }

    /// Resolve `by` against the current page. `timeout_ms` is the per-step
    /// budget supplied by the runner; the resolver does not retry beyond
    /// the fallback and healing schedules.
    pub async fn resolve(
        &self,
        driver: &dyn Driver,
        by: &By,
        frame: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Resolution> {
        match by {
            By::Single(selector) => self.resolve_single(driver, selector, frame, timeout_ms).await,
            By::Any(any) => self.resolve_any(driver, &any.any, frame, timeout_ms).await,
        }
    }

    async fn resolve_single(
        &self,
        driver: &dyn Driver,
        selector: &SingleBy,
        frame: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Resolution> {
        let locator = locator_for(selector, frame);
        let strict = selector.strict();
        let desc = selector.describe();

        let count = driver.count(&locator).await?;
        if count > 1 {
            if strict {
                // Strictness violations fail immediately and are never healed.
                return Err(Error::Ambiguous {
                    selector: desc,
                    count,
                });
            }
            debug!("{}: {} matches, strict disabled, taking first", desc, count);
            return Ok(Resolution {
                locator: locator.nth(0),
                notes: vec![format!("{} matched {} elements, strict disabled", desc, count)],
            });
        }

        if count == 1 {
            if !driver.is_visible(&locator).await? {
                // present but not yet visible; the contract is a visible handle
                driver
                    .wait_for(&locator, ElementState::Visible, timeout_ms)
                    .await?;
            }
            return Ok(Resolution {
                locator,
                notes: Vec::new(),
            });
        }

        // Nothing matches yet; give the page the step budget to render it.
        match driver
            .wait_for(&locator, ElementState::Visible, timeout_ms)
            .await
        {
            Ok(()) => {
                let count = driver.count(&locator).await?;
                if count > 1 && strict {
                    return Err(Error::Ambiguous {
                        selector: desc,
                        count,
                    });
                }
                Ok(Resolution {
                    locator,
                    notes: Vec::new(),
                })
            }
            Err(Error::Timeout { .. }) => {
                if self.healing == HealingMode::Safe {
                    let (healed, attempts) = self.try_healing(driver, selector, frame).await?;
                    if let Some(resolution) = healed {
                        return Ok(resolution);
                    }
                    if !attempts.is_empty() {
                        return Err(Error::NoMatch(format!(
                            "{} ({})",
                            desc,
                            attempts.join("; ")
                        )));
                    }
                }
                Err(Error::NoMatch(desc))
            }
            Err(other) => Err(other),
        }
    }

    /// Probe candidates in declaration order; the first one that is
    /// visible and matches exactly one element wins. Later candidates are
    /// never probed after a success.
    async fn resolve_any(
        &self,
        driver: &dyn Driver,
        candidates: &[SingleBy],
        frame: Option<&str>,
        timeout_ms: u64,
    ) -> Result<Resolution> {
        let per_candidate = self.candidate_timeout_ms.min(timeout_ms.max(1));
        let mut failures: Vec<CandidateFailure> = Vec::new();

        for (index, candidate) in candidates.iter().enumerate() {
            let locator = locator_for(candidate, frame);
            let desc = candidate.describe();

            match self.probe(driver, &locator, per_candidate).await? {
                Ok(()) => {
                    debug!("any fallback: candidate {} ({}) satisfied", index, desc);
                    let notes = if index > 0 {
                        vec![format!("fell back to {}", desc)]
                    } else {
                        Vec::new()
                    };
                    return Ok(Resolution { locator, notes });
                }
                Err(reason) => {
                    failures.push(CandidateFailure {
                        index,
                        selector: desc,
                        reason,
                    });
                }
            }
        }

        Err(Error::AllCandidatesFailed(failures))
    }

    /// Wait up to `timeout_ms` for the locator to match exactly one
    /// visible element. `Ok(Err(reason))` is a normal rejection.
    async fn probe(
        &self,
        driver: &dyn Driver,
        locator: &Locator,
        timeout_ms: u64,
    ) -> Result<std::result::Result<(), String>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut reason = "no match".to_string();

        loop {
            let count = driver.count(locator).await?;
            if count == 0 {
                reason = "no match".to_string();
            } else if count > 1 {
                reason = format!("{} matches (strict violation)", count);
            } else if !driver.is_visible(locator).await? {
                reason = "not visible".to_string();
            } else {
                return Ok(Ok(()));
            }

            if Instant::now() >= deadline {
                return Ok(Err(reason));
            }
            tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)).await;
        }
    }

    /// The fixed widening schedule for `safe` healing: (i) drop
    /// non-identifying filters, (ii) search by the accessible name the
    /// original selector carried, (iii) search by testId/label derived
    /// from the target's inferred semantics.
    fn healing_candidates(original: &SingleBy) -> Vec<SingleBy> {
        let mut out = Vec::new();
        match original {
            SingleBy::TestId(s) => {
                out.push(SingleBy::Role(RoleSelector {
                    role: "button".into(),
                    name: Some(s.test_id.clone()),
                    exact: None,
                    strict: true,
                }));
                out.push(SingleBy::Label(LabelSelector {
                    label: s.test_id.clone(),
                    strict: true,
                }));
            }
            SingleBy::Role(s) => {
                if s.exact == Some(true) {
                    out.push(SingleBy::Role(RoleSelector {
                        exact: None,
                        ..s.clone()
                    }));
                }
                if let Some(name) = &s.name {
                    out.push(SingleBy::TestId(TestIdSelector {
                        test_id: name.clone(),
                        strict: true,
                    }));
                    out.push(SingleBy::Label(LabelSelector {
                        label: name.clone(),
                        strict: true,
                    }));
                }
            }
            SingleBy::Label(s) => {
                out.push(SingleBy::TestId(TestIdSelector {
                    test_id: s.label.clone(),
                    strict: true,
                }));
                out.push(SingleBy::Role(RoleSelector {
                    role: "textbox".into(),
                    name: Some(s.label.clone()),
                    exact: None,
                    strict: true,
                }));
            }
            SingleBy::Placeholder(s) => {
                out.push(SingleBy::Label(LabelSelector {
                    label: s.placeholder.clone(),
                    strict: true,
                }));
                out.push(SingleBy::TestId(TestIdSelector {
                    test_id: s.placeholder.clone(),
                    strict: true,
                }));
            }
            SingleBy::Css(s) => {
                if let Some(text) = &s.text {
                    out.push(SingleBy::Css(CssSelector {
                        css: s.css.clone(),
                        text: None,
                        strict: true,
                    }));
                    out.push(SingleBy::Text(TextSelector {
                        text: text.clone(),
                        strict: true,
                    }));
                    out.push(SingleBy::Label(LabelSelector {
                        label: text.clone(),
                        strict: true,
                    }));
                }
            }
            SingleBy::Text(s) => {
                out.push(SingleBy::Label(LabelSelector {
                    label: s.text.clone(),
                    strict: true,
                }));
            }
        }
        out
    }

    /// Returns the healed resolution (if any) plus one note per attempted
    /// variant so the outcome lands on the diagnostic record either way.
    async fn try_healing(
        &self,
        driver: &dyn Driver,
        original: &SingleBy,
        frame: Option<&str>,
    ) -> Result<(Option<Resolution>, Vec<String>)> {
        let candidates = Self::healing_candidates(original);
        let mut notes = Vec::new();

        for candidate in candidates {
            let locator = locator_for(&candidate, frame);
            let count = driver.count(&locator).await?;
            let hit = count == 1 && driver.is_visible(&locator).await?;
            notes.push(format!(
                "healing attempt {}: {}",
                candidate.describe(),
                if hit {
                    "matched".to_string()
                } else {
                    format!("rejected ({} matches)", count)
                }
            ));
            if hit {
                info!(
                    "healed selector {} -> {}",
                    original.describe(),
                    candidate.describe()
                );
                notes.push(format!(
                    "healed {} -> {}",
                    original.describe(),
                    candidate.describe()
                ));
                return Ok((Some(Resolution { locator, notes: notes.clone() }), notes));
            }
        }
        debug!("healing exhausted for {}: {:?}", original.describe(), notes);
        Ok((None, notes))
    }
}
