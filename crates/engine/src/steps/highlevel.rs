//! High-level step handlers
//!
//! Multi-step dances over dynamically rendered widgets that would be
//! flaky if written as primitive steps: overlay dropdowns, Wijmo combos,
//! virtualized Wijmo grids, date pickers and file uploads.

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Mapping;
use tracing::{debug, info};

use flowreplay_common::{By, Error, Result};

use crate::driver::{Driver, ElementState, Locator, Query};
use crate::registry::{from_params, StepContext, StepHandler, StepInfo};

/// Upper bound on viewport scrolls while hunting a virtualized grid row.
const MAX_SCROLL_ATTEMPTS: usize = 50;

fn css(selector: &str) -> Query {
    Query::Css {
        css: selector.to_string(),
        has_text: None,
    }
}

fn exact_text(text: &str) -> Query {
    Query::Text {
        value: text.to_string(),
        exact: true,
    }
}

// ---------------------------------------------------------------------------
// selectOverlayOption
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectOverlayOptionParams {
    open: By,
    list: By,
    #[serde(rename = "optionText")]
    option_text: String,
}

/// Click the trigger, wait for the overlay list, pick the option whose
/// visible text equals `optionText`. The option match is strict.
pub struct SelectOverlayOptionHandler;

#[async_trait]
impl StepHandler for SelectOverlayOptionHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: SelectOverlayOptionParams = from_params(params)?;
        info!(
            "selectOverlayOption: open={} list={} option='{}'",
            p.open.describe(),
            p.list.describe(),
            p.option_text
        );

        let trigger = ctx.resolve(driver, &p.open, None).await?;
        driver.click(&trigger).await?;

        let list = ctx.resolve(driver, &p.list, None).await?;
        driver
            .wait_for(&list, ElementState::Visible, ctx.timeout_ms)
            .await?;

        let option = list.clone().within(exact_text(&p.option_text));
        let count = driver.count(&option).await?;
        if count == 0 {
            return Err(Error::NoMatch(format!(
                "option '{}' in {}",
                p.option_text,
                p.list.describe()
            )));
        }
        if count > 1 {
            return Err(Error::Ambiguous {
                selector: format!("option '{}' in {}", p.option_text, p.list.describe()),
                count,
            });
        }
        driver.click(&option).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<SelectOverlayOptionParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "selectOverlayOption",
            description: "Open an overlay dropdown and pick an option",
            category: "high-level",
        }
    }
}

// ---------------------------------------------------------------------------
// selectWijmoCombo
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectWijmoComboParams {
    root: By,
    #[serde(rename = "optionText")]
    option_text: String,
}

/// Overlay selection scoped to the Wijmo ComboBox DOM convention: the
/// input inside the component opens a `.wj-listbox` dropdown.
pub struct SelectWijmoComboHandler;

#[async_trait]
impl StepHandler for SelectWijmoComboHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: SelectWijmoComboParams = from_params(params)?;
        info!(
            "selectWijmoCombo: root={} option='{}'",
            p.root.describe(),
            p.option_text
        );

        let root = ctx.resolve(driver, &p.root, None).await?;
        let input = root.clone().within(css("input.wj-form-control")).nth(0);
        driver.click(&input).await?;

        let dropdown = Locator::new(css(".wj-listbox"));
        driver
            .wait_for(&dropdown, ElementState::Visible, ctx.timeout_ms)
            .await?;

        let option = dropdown.within(exact_text(&p.option_text));
        driver.click(&option).await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<SelectWijmoComboParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "selectWijmoCombo",
            description: "Pick an option from a Wijmo ComboBox",
            category: "high-level",
        }
    }
}

// ---------------------------------------------------------------------------
// clickWijmoGridCell
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WijmoRowKey {
    column: String,
    equals: String,
}

#[derive(Debug, Deserialize)]
struct ClickWijmoGridCellParams {
    grid: By,
    #[serde(rename = "rowKey")]
    row_key: WijmoRowKey,
    column: String,
}

/// Click a cell in a virtualized Wijmo FlexGrid. The target row is
/// located by matching `rowKey.column == rowKey.equals`; when it is not
/// in the rendered window, the grid is scrolled by a viewport and the
/// search repeats, up to a fixed bound.
pub struct ClickWijmoGridCellHandler;

impl ClickWijmoGridCellHandler {
    /// Index of a named column in the grid header.
    async fn column_index(driver: &dyn Driver, grid: &Locator, column: &str) -> Result<usize> {
        let headers = grid.clone().within(css(".wj-header")).within(css(".wj-cell"));
        let count = driver.count(&headers).await?;
        for i in 0..count {
            let cell = grid
                .clone()
                .within(css(".wj-header"))
                .within(css(".wj-cell"))
                .nth(i);
            let text = driver.text_content(&cell).await?;
            if text.trim() == column {
                return Ok(i);
            }
        }
        Err(Error::NoMatch(format!(
            "column '{}' in grid header ({} columns present)",
            column, count
        )))
    }
}

#[async_trait]
impl StepHandler for ClickWijmoGridCellHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: ClickWijmoGridCellParams = from_params(params)?;
        info!(
            "clickWijmoGridCell: grid={} rowKey({}={}) column={}",
            p.grid.describe(),
            p.row_key.column,
            p.row_key.equals,
            p.column
        );

        let grid = ctx.resolve(driver, &p.grid, None).await?;
        let key_idx = Self::column_index(driver, &grid, &p.row_key.column).await?;
        let target_idx = Self::column_index(driver, &grid, &p.column).await?;
        let body = grid.clone().within(css(".wj-cells"));

        for attempt in 0..MAX_SCROLL_ATTEMPTS {
            let rows = body.clone().within(css(".wj-row"));
            let row_count = driver.count(&rows).await?;

            for row in 0..row_count {
                let cells = body.clone().within(css(".wj-row")).nth(row).within(css(".wj-cell"));
                let cell_count = driver.count(&cells).await?;
                if key_idx >= cell_count || target_idx >= cell_count {
                    continue;
                }
                let key_cell = cells.clone().nth(key_idx);
                let text = driver.text_content(&key_cell).await?;
                if text.trim() == p.row_key.equals {
                    let target = cells.nth(target_idx);
                    driver.click(&target).await?;
                    ctx.note(format!(
                        "grid row {}={} found after {} scroll(s)",
                        p.row_key.column, p.row_key.equals, attempt
                    ));
                    return Ok(());
                }
            }

            debug!(
                "grid row not in window, scrolling (attempt {}/{})",
                attempt + 1,
                MAX_SCROLL_ATTEMPTS
            );
            ctx.note(format!(
                "scrolled grid by one viewport searching for {}={} (attempt {})",
                p.row_key.column,
                p.row_key.equals,
                attempt + 1
            ));
            driver
                .eval_on(&body, "el => el.scrollTop += el.clientHeight")
                .await?;
        }

        Err(Error::NoMatch(format!(
            "grid row with {}='{}' after {} scrolls",
            p.row_key.column, p.row_key.equals, MAX_SCROLL_ATTEMPTS
        )))
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<ClickWijmoGridCellParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "clickWijmoGridCell",
            description: "Click a Wijmo FlexGrid cell, scrolling virtualized rows",
            category: "high-level",
        }
    }
}

// ---------------------------------------------------------------------------
// setDatePicker
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SetDatePickerParams {
    by: By,
    date: String,
    #[serde(default)]
    #[allow(dead_code)]
    format: Option<String>,
}

/// Focus the picker input, clear it, type the date, confirm with Enter.
pub struct SetDatePickerHandler;

#[async_trait]
impl StepHandler for SetDatePickerHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: SetDatePickerParams = from_params(params)?;
        info!("setDatePicker: {} = {}", p.by.describe(), p.date);
        let locator = ctx.resolve(driver, &p.by, None).await?;
        driver.click(&locator).await?;
        driver.fill(&locator, "").await?;
        driver.fill(&locator, &p.date).await?;
        driver.press(&locator, "Enter").await
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<SetDatePickerParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "setDatePicker",
            description: "Type a date into a picker input and confirm",
            category: "high-level",
        }
    }
}

// ---------------------------------------------------------------------------
// uploadFile
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UploadFileParams {
    by: By,
    #[serde(rename = "filePath")]
    file_path: String,
}

/// Set files on an `input[type=file]`, falling back to the chooser
/// dialog for upload buttons.
pub struct UploadFileHandler;

#[async_trait]
impl StepHandler for UploadFileHandler {
    async fn execute(
        &self,
        driver: &dyn Driver,
        params: &Mapping,
        ctx: &mut StepContext<'_>,
    ) -> Result<()> {
        let p: UploadFileParams = from_params(params)?;
        let path = std::path::Path::new(&p.file_path);
        if !path.exists() {
            return Err(Error::Assertion(format!(
                "upload file not found: {}",
                p.file_path
            )));
        }
        info!("uploadFile: {} <- {}", p.by.describe(), p.file_path);
        let locator = ctx.resolve(driver, &p.by, None).await?;
        match driver.set_input_files(&locator, path).await {
            Ok(()) => Ok(()),
            Err(_) => driver.upload_via_chooser(&locator, path).await,
        }
    }

    fn validate(&self, params: &Mapping) -> Result<()> {
        from_params::<UploadFileParams>(params).map(|_| ())
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            name: "uploadFile",
            description: "Upload a file via input or chooser dialog",
            category: "high-level",
        }
    }
}
