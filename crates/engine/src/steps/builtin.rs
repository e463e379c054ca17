//! Built-in step handlers
//!
//! Navigation, interaction, waits, assertions, value capture, debugging,
//! session, and the route-stubbing helpers. Each handler owns its typed
//! payload; `validate` is the schema check used before execution.

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Mapping;
use tracing::info;

use flowreplay_common::{By, Error, Result};

use crate::driver::{Driver, ElementState, LoadState, Locator, RouteResponse};
use crate::registry::{from_params, StepContext, StepHandler, StepInfo};
use crate::resolver::query_for;

/// Raw locator for a single selector, skipping resolution probes. Waits
/// target states an element may start from (absent, hidden), so probing
/// for presence first would defeat them.
fn raw_locator(by: &By, frame: Option<&str>) -> Option<Locator> {
    match by {
        By::Single(s) => Some(Locator::new(query_for(s)).in_frame(frame)),
        By::Any(_) => None,
    }
}

/// Best-effort scroll before an action; off-screen targets are often
/// still actionable, so failures here never fail the step.
async fn settle_for_action(driver: &dyn Driver, locator: &Locator) {
    let _ = driver.scroll_into_view(locator).await;
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GotoParams {
    url: String,
}

pub struct GotoHandler;

#[async_trait]
impl StepHandler for GotoHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: GotoParams = from_params(params)?;
        info!("goto: {}", p.url);
        driver.goto(&p.url).await?;
        // navigation is not complete until the DOM is ready
        driver
            .wait_for_load_state(LoadState::DomContentLoaded, Some(ctx.timeout_ms))
            .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<GotoParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "goto",
            description: "Navigate to a URL and await DOM content loaded",
            category: "navigation",
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmptyParams {}

pub struct BackHandler;

#[async_trait]
impl StepHandler for BackHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        _params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        info!("back");
        driver.go_back().await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<EmptyParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "back",
            description: "Browser history back",
            category: "navigation",
        }
    }
}

pub struct ReloadHandler;

#[async_trait]
impl StepHandler for ReloadHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        _params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        info!("reload");
        driver.reload().await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<EmptyParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "reload",
            description: "Reload the current page",
            category: "navigation",
        }
    }
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TargetParams {
    by: By,
    #[serde(default)]
    frame: Option<String>,
}

pub struct ClickHandler;

#[async_trait]
impl StepHandler for ClickHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("click: {}", p.by.describe());
        settle_for_action(driver, &locator).await;
        driver.click(&locator).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "click",
            description: "Click the matched element",
            category: "action",
        }
    }
}

pub struct DblClickHandler;

#[async_trait]
impl StepHandler for DblClickHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("dblclick: {}", p.by.describe());
        settle_for_action(driver, &locator).await;
        driver.dblclick(&locator).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "dblclick",
            description: "Double-click the matched element",
            category: "action",
        }
    }
}

#[derive(Debug, Deserialize)]
struct FillParams {
    by: By,
    value: String,
    #[serde(default)]
    secret: bool,
    #[serde(default)]
    frame: Option<String>,
}

pub struct FillHandler;

#[async_trait]
impl StepHandler for FillHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: FillParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        let shown = if p.secret { "***" } else { p.value.as_str() };
        info!("fill: {} = {}", p.by.describe(), shown);
        settle_for_action(driver, &locator).await;
        driver.fill(&locator, &p.value).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<FillParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "fill",
            description: "Fill an input with a value",
            category: "action",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PressParams {
    by: By,
    key: String,
    #[serde(default)]
    frame: Option<String>,
}

pub struct PressHandler;

#[async_trait]
impl StepHandler for PressHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: PressParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("press: {} {}", p.by.describe(), p.key);
        driver.press(&locator, &p.key).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<PressParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "press",
            description: "Press a key on the matched element",
            category: "action",
        }
    }
}

pub struct CheckHandler;

#[async_trait]
impl StepHandler for CheckHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("check: {}", p.by.describe());
        driver.set_checked(&locator, true).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "check",
            description: "Check a checkbox",
            category: "action",
        }
    }
}

pub struct UncheckHandler;

#[async_trait]
impl StepHandler for UncheckHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("uncheck: {}", p.by.describe());
        driver.set_checked(&locator, false).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "uncheck",
            description: "Uncheck a checkbox",
            category: "action",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SelectOptionParams {
    by: By,
    value: String,
    #[serde(default)]
    frame: Option<String>,
}

pub struct SelectOptionHandler;

#[async_trait]
impl StepHandler for SelectOptionHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: SelectOptionParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("selectOption: {} = {}", p.by.describe(), p.value);
        driver.select_option(&locator, &p.value).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<SelectOptionParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "selectOption",
            description: "Select an option from a native select",
            category: "action",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrollParams {
    #[serde(rename = "deltaX", default)]
    delta_x: i64,
    #[serde(rename = "deltaY", default)]
    delta_y: i64,
}

pub struct ScrollHandler;

#[async_trait]
impl StepHandler for ScrollHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: ScrollParams = from_params(params)?;
        info!("scroll: dx={} dy={}", p.delta_x, p.delta_y);
        driver.mouse_wheel(p.delta_x, p.delta_y).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<ScrollParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "scroll",
            description: "Mouse-wheel scroll by pixel deltas",
            category: "action",
        }
    }
}

pub struct ScrollIntoViewHandler;

#[async_trait]
impl StepHandler for ScrollIntoViewHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        info!("scrollIntoView: {}", p.by.describe());
        driver.scroll_into_view(&locator).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "scrollIntoView",
            description: "Scroll until the matched element is in view",
            category: "action",
        }
    }
}

// ---------------------------------------------------------------------------
// Waits
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WaitForParams {
    by: By,
    #[serde(default = "default_wait_state")]
    state: String,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    frame: Option<String>,
}

fn default_wait_state() -> String {
    "visible".to_string()
}

async fn wait_step(
    driver: &dyn Driver,
    ctx: &mut StepContext<'_>,
    by: &By,
    frame: Option<&str>,
    state: ElementState,
    timeout: Option<u64>,
) -> Result<()> {
    let timeout_ms = timeout.unwrap_or(ctx.timeout_ms);
    match raw_locator(by, frame) {
        Some(locator) => driver.wait_for(&locator, state, timeout_ms).await,
        None => {
            // `any` has no raw form; settle the fallback first, then wait.
            let locator = ctx.resolve(driver, by, frame).await?;
            driver.wait_for(&locator, state, timeout_ms).await
        }
    }
}

pub struct WaitForHandler;

#[async_trait]
impl StepHandler for WaitForHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: WaitForParams = from_params(params)?;
        let state = ElementState::parse(&p.state).ok_or_else(|| Error::Schema {
            message: format!("unknown wait state '{}'", p.state),
            location: "waitFor.state".to_string(),
            line: None,
        })?;
        info!("waitFor: {} ({})", p.by.describe(), p.state);
        wait_step(driver, ctx, &p.by, p.frame.as_deref(), state, p.timeout).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        let p: WaitForParams = from_params(params)?;
        ElementState::parse(&p.state).ok_or_else(|| Error::Schema {
            message: format!("unknown wait state '{}'", p.state),
            location: "waitFor.state".to_string(),
            line: None,
        })?;
        Ok(())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "waitFor",
            description: "Wait for an element to reach a state",
            category: "wait",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaitVisibilityParams {
    by: By,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    frame: Option<String>,
}

pub struct WaitForVisibleHandler;

#[async_trait]
impl StepHandler for WaitForVisibleHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: WaitVisibilityParams = from_params(params)?;
        info!("waitForVisible: {}", p.by.describe());
        wait_step(
            driver,
            ctx,
            &p.by,
            p.frame.as_deref(),
            ElementState::Visible,
            p.timeout,
        )
        .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<WaitVisibilityParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "waitForVisible",
            description: "Wait for an element to become visible",
            category: "wait",
        }
    }
}

pub struct WaitForHiddenHandler;

#[async_trait]
impl StepHandler for WaitForHiddenHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: WaitVisibilityParams = from_params(params)?;
        info!("waitForHidden: {}", p.by.describe());
        wait_step(
            driver,
            ctx,
            &p.by,
            p.frame.as_deref(),
            ElementState::Hidden,
            p.timeout,
        )
        .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<WaitVisibilityParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "waitForHidden",
            description: "Wait for an element to disappear",
            category: "wait",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaitForNetworkIdleParams {
    #[serde(default)]
    timeout: Option<u64>,
}

pub struct WaitForNetworkIdleHandler;

#[async_trait]
impl StepHandler for WaitForNetworkIdleHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: WaitForNetworkIdleParams = from_params(params)?;
        info!("waitForNetworkIdle");
        driver
            .wait_for_load_state(LoadState::NetworkIdle, Some(p.timeout.unwrap_or(ctx.timeout_ms)))
            .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<WaitForNetworkIdleParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "waitForNetworkIdle",
            description: "Wait until network activity settles",
            category: "wait",
        }
    }
}

// ---------------------------------------------------------------------------
// Assertions
// ---------------------------------------------------------------------------

pub struct ExpectVisibleHandler;

#[async_trait]
impl StepHandler for ExpectVisibleHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        info!("expectVisible: {}", p.by.describe());
        // resolution enforces exactly-one-visible; success is the assertion
        ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "expectVisible",
            description: "Assert the matched element is visible",
            category: "validation",
        }
    }
}

pub struct ExpectHiddenHandler;

#[async_trait]
impl StepHandler for ExpectHiddenHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        info!("expectHidden: {}", p.by.describe());
        let frame = p.frame.as_deref();
        let singles: Vec<Locator> = match &p.by {
            By::Single(s) => vec![Locator::new(query_for(s)).in_frame(frame)],
            By::Any(a) => a
                .any
                .iter()
                .map(|s| Locator::new(query_for(s)).in_frame(frame))
                .collect(),
        };
        for locator in singles {
            driver
                .wait_for(&locator, ElementState::Hidden, ctx.timeout_ms)
                .await
                .map_err(|e| match e {
                    Error::Timeout { .. } => Error::Assertion(format!(
                        "expected {} to be hidden, still visible after {}ms",
                        p.by.describe(),
                        ctx.timeout_ms
                    )),
                    other => other,
                })?;
        }
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "expectHidden",
            description: "Assert the target is absent or invisible",
            category: "validation",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpectTextParams {
    by: By,
    text: String,
    #[serde(default)]
    frame: Option<String>,
}

pub struct ExpectTextHandler;

#[async_trait]
impl StepHandler for ExpectTextHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: ExpectTextParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        let actual = driver.text_content(&locator).await?;
        info!("expectText: {} contains '{}'", p.by.describe(), p.text);
        if !actual.contains(&p.text) {
            return Err(Error::Assertion(format!(
                "expected {} to contain '{}', got '{}'",
                p.by.describe(),
                p.text,
                actual.trim()
            )));
        }
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<ExpectTextParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "expectText",
            description: "Assert the matched element contains text",
            category: "validation",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpectUrlParams {
    url: String,
}

pub struct ExpectUrlHandler;

#[async_trait]
impl StepHandler for ExpectUrlHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: ExpectUrlParams = from_params(params)?;
        let current = driver.current_url().await?;
        info!("expectUrl: {}", p.url);
        if !current.contains(&p.url) {
            return Err(Error::Assertion(format!(
                "expected URL to match '{}', got '{}'",
                p.url, current
            )));
        }
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<ExpectUrlParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "expectUrl",
            description: "Assert the page URL matches a pattern",
            category: "validation",
        }
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StoreTextParams {
    by: By,
    #[serde(rename = "varName")]
    var_name: String,
    #[serde(default)]
    frame: Option<String>,
}

pub struct StoreTextHandler;

#[async_trait]
impl StepHandler for StoreTextHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: StoreTextParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        let text = driver.text_content(&locator).await?;
        info!("storeText: {} -> vars.{}", p.by.describe(), p.var_name);
        ctx.vars.set(p.var_name, text);
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<StoreTextParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "storeText",
            description: "Store the element's text into a variable",
            category: "retrieval",
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoreAttrParams {
    by: By,
    attr: String,
    #[serde(rename = "varName")]
    var_name: String,
    #[serde(default)]
    frame: Option<String>,
}

pub struct StoreAttrHandler;

#[async_trait]
impl StepHandler for StoreAttrHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: StoreAttrParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        let value = driver.attribute(&locator, &p.attr).await?.unwrap_or_default();
        info!(
            "storeAttr: {}[{}] -> vars.{}",
            p.by.describe(),
            p.attr,
            p.var_name
        );
        ctx.vars.set(p.var_name, value);
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<StoreAttrParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "storeAttr",
            description: "Store an attribute value into a variable",
            category: "retrieval",
        }
    }
}

// ---------------------------------------------------------------------------
// Debug
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ScreenshotParams {
    #[serde(default)]
    name: Option<String>,
}

pub struct ScreenshotHandler;

#[async_trait]
impl StepHandler for ScreenshotHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: ScreenshotParams = from_params(params)?;
        let name = p.name.unwrap_or_else(|| "screenshot".to_string());
        match ctx.artifacts {
            Some(artifacts) => {
                let path = artifacts
                    .save_step_screenshot(driver, ctx.ordinal, &name, "shot")
                    .await?;
                ctx.note(format!("screenshot saved: {}", path.display()));
            }
            None => info!("screenshot requested outside a run, skipping"),
        }
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<ScreenshotParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "screenshot",
            description: "Capture a named screenshot",
            category: "debug",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogParams {
    message: String,
}

pub struct LogHandler;

#[async_trait]
impl StepHandler for LogHandler {
    async fn execute(
        &self,
        _driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: LogParams = from_params(params)?;
        info!("log: {}", p.message);
        ctx.note(p.message);
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<LogParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "log",
            description: "Emit a log message",
            category: "debug",
        }
    }
}

pub struct DumpDomHandler;

#[async_trait]
impl StepHandler for DumpDomHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: TargetParams = from_params(params)?;
        let locator = ctx.resolve(driver, &p.by, p.frame.as_deref()).await?;
        let html = driver.inner_html(&locator).await?;
        info!("dumpDom: {}\n{}", p.by.describe(), html);
        ctx.note(format!("dom dump ({}): {}", p.by.describe(), html));
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<TargetParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "dumpDom",
            description: "Dump the matched element's DOM",
            category: "debug",
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StoragePathParams {
    path: String,
}

pub struct UseStorageStateHandler;

#[async_trait]
impl StepHandler for UseStorageStateHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: StoragePathParams = from_params(params)?;
        info!("useStorageState: {}", p.path);
        let text = std::fs::read_to_string(&p.path)?;
        let state: serde_json::Value = serde_json::from_str(&text)?;
        driver.apply_storage_state(&state).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<StoragePathParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "useStorageState",
            description: "Restore cookies and storage from a file",
            category: "session",
        }
    }
}

pub struct SaveStorageStateHandler;

#[async_trait]
impl StepHandler for SaveStorageStateHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: StoragePathParams = from_params(params)?;
        info!("saveStorageState: {}", p.path);
        let state = driver.storage_state().await?;
        let path = std::path::Path::new(&p.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&state)?)?;
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<StoragePathParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "saveStorageState",
            description: "Save cookies and storage to a file",
            category: "session",
        }
    }
}

// ---------------------------------------------------------------------------
// Toast / console / network stubs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WaitForToastParams {
    text: String,
    #[serde(default)]
    timeout: Option<u64>,
}

pub struct WaitForToastHandler;

#[async_trait]
impl StepHandler for WaitForToastHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: WaitForToastParams = from_params(params)?;
        let timeout_ms = p.timeout.unwrap_or(ctx.timeout_ms);
        let locator = Locator::new(crate::driver::Query::Text {
            value: p.text.clone(),
            exact: false,
        });
        info!("waitForToast: '{}'", p.text);
        driver
            .wait_for(&locator, ElementState::Visible, timeout_ms)
            .await?;
        driver
            .wait_for(&locator, ElementState::Hidden, timeout_ms)
            .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<WaitForToastParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "waitForToast",
            description: "Wait for a toast to appear and disappear",
            category: "high-level",
        }
    }
}

pub struct AssertNoConsoleErrorHandler;

#[async_trait]
impl StepHandler for AssertNoConsoleErrorHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        _params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        for message in driver.drain_console().await? {
            if message.level == "error" {
                ctx.console_errors.push(message.text);
            }
        }
        info!("assertNoConsoleError");
        if !ctx.console_errors.is_empty() {
            return Err(Error::Assertion(format!(
                "{} console error(s) detected:\n{}",
                ctx.console_errors.len(),
                ctx.console_errors.join("\n")
            )));
        }
        Ok(())
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<EmptyParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "assertNoConsoleError",
            description: "Assert the browser console holds no errors",
            category: "high-level",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiMockResponseParams {
    #[serde(default = "default_status")]
    status: u16,
    body: serde_yaml::Value,
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Deserialize)]
struct ApiMockParams {
    url: String,
    #[serde(default)]
    method: Option<String>,
    response: ApiMockResponseParams,
}

pub struct ApiMockHandler;

#[async_trait]
impl StepHandler for ApiMockHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: ApiMockParams = from_params(params)?;
        let body = match &p.response.body {
            serde_yaml::Value::String(s) => s.clone(),
            other => {
                let as_json: serde_json::Value =
                    serde_yaml::from_value(other.clone()).map_err(flowreplay_common::Error::Yaml)?;
                serde_json::to_string(&as_json)?
            }
        };
        info!(
            "apiMock: {} {} -> {}",
            p.method.as_deref().unwrap_or("*"),
            p.url,
            p.response.status
        );
        driver
            .install_route(
                &p.url,
                &RouteResponse {
                    method: p.method,
                    status: p.response.status,
                    body,
                },
            )
            .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<ApiMockParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "apiMock",
            description: "Serve a canned response for a URL pattern",
            category: "high-level",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteStubParams {
    url: String,
    handler: String,
}

pub struct RouteStubHandler;

#[async_trait]
impl StepHandler for RouteStubHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        _ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: RouteStubParams = from_params(params)?;
        info!("routeStub: {} -> {}", p.url, p.handler);
        driver
            .install_route(
                &p.url,
                &RouteResponse {
                    method: None,
                    status: 200,
                    body: serde_json::json!({ "stub": p.handler }).to_string(),
                },
            )
            .await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<RouteStubParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "routeStub",
            description: "Install a named stub for a URL pattern",
            category: "high-level",
        }
    }
}
