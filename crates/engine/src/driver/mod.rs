//! Browser driver abstraction
//!
//! The engine consumes the browser as a black-box capability behind the
//! [`Driver`] trait: navigation, locator probes, element actions, tracing
//! and screenshots. The production implementation shells out to a
//! Playwright sidecar ([`playwright`]); tests drive an in-memory fake.

pub mod fake;
pub mod playwright;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use flowreplay_common::{Result, ScreenshotFormat};

/// One locator primitive. Each single `By` kind maps onto exactly one of
/// these; the mapping is total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Query {
    TestId {
        value: String,
    },
    Role {
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        exact: bool,
    },
    Label {
        value: String,
    },
    Placeholder {
        value: String,
    },
    Css {
        css: String,
        #[serde(rename = "hasText", skip_serializing_if = "Option::is_none")]
        has_text: Option<String>,
    },
    Text {
        value: String,
        #[serde(default)]
        exact: bool,
    },
}

/// One scoping link: a query, optionally narrowed to the nth match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub query: Query,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,
}

/// A fully-scoped locator: a root-to-leaf chain of links plus an optional
/// iframe scope. Each link resolves inside the previous link's target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub chain: Vec<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl Locator {
    pub fn new(query: Query) -> Self {
        Self {
            chain: vec![Link { query, nth: None }],
            frame: None,
        }
    }

    /// Scope a further query inside the current target.
    pub fn within(mut self, query: Query) -> Self {
        self.chain.push(Link { query, nth: None });
        self
    }

    /// Narrow the most recent link to its nth match.
    pub fn nth(mut self, index: usize) -> Self {
        if let Some(last) = self.chain.last_mut() {
            last.nth = Some(index);
        }
        self
    }

    pub fn in_frame(mut self, frame: Option<&str>) -> Self {
        self.frame = frame.map(str::to_string);
        self
    }

    /// Short description for timeouts and logs.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .chain
            .iter()
            .map(|link| {
                let base = match &link.query {
                    Query::TestId { value } => format!("testId={}", value),
                    Query::Role { role, name, .. } => match name {
                        Some(n) => format!("role={}[name={}]", role, n),
                        None => format!("role={}", role),
                    },
                    Query::Label { value } => format!("label={}", value),
                    Query::Placeholder { value } => format!("placeholder={}", value),
                    Query::Css { css, .. } => format!("css={}", css),
                    Query::Text { value, .. } => format!("text={}", value),
                };
                match link.nth {
                    Some(n) => format!("{}:nth({})", base, n),
                    None => base,
                }
            })
            .collect();
        parts.join(" >> ")
    }
}

/// Element lifecycle states a wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl ElementState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "visible" => Some(ElementState::Visible),
            "hidden" => Some(ElementState::Hidden),
            "attached" => Some(ElementState::Attached),
            "detached" => Some(ElementState::Detached),
            _ => None,
        }
    }
}

/// Page load states a wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

/// One browser console entry drained from the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
}

/// A canned response installed for a URL pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub status: u16,
    pub body: String,
}

/// Browser context environment honored at launch: viewport, timezone,
/// locale, extra headers and storage state.
#[derive(Debug, Clone, Default)]
pub struct ContextEnv {
    pub headed: bool,
    pub slow_mo_ms: u64,
    pub viewport: Option<(u32, u32)>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    pub storage_state_path: Option<PathBuf>,
    pub record_video_dir: Option<PathBuf>,
}

/// The black-box browser capability.
///
/// Every method is a suspension point; implementations are expected to
/// honor the driver-native actionability auto-waits for element actions.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn go_back(&self) -> Result<()>;
    async fn reload(&self) -> Result<()>;
    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: Option<u64>) -> Result<()>;
    async fn current_url(&self) -> Result<String>;

    /// Number of DOM elements matching the locator right now.
    async fn count(&self, locator: &Locator) -> Result<usize>;
    async fn is_visible(&self, locator: &Locator) -> Result<bool>;
    async fn wait_for(&self, locator: &Locator, state: ElementState, timeout_ms: u64)
        -> Result<()>;

    async fn click(&self, locator: &Locator) -> Result<()>;
    async fn dblclick(&self, locator: &Locator) -> Result<()>;
    async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;
    async fn press(&self, locator: &Locator, key: &str) -> Result<()>;
    async fn set_checked(&self, locator: &Locator, checked: bool) -> Result<()>;
    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()>;
    async fn scroll_into_view(&self, locator: &Locator) -> Result<()>;
    async fn mouse_wheel(&self, delta_x: i64, delta_y: i64) -> Result<()>;

    async fn text_content(&self, locator: &Locator) -> Result<String>;
    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;
    async fn inner_html(&self, locator: &Locator) -> Result<String>;
    /// Evaluate a JS snippet with the matched element bound to `el`.
    async fn eval_on(&self, locator: &Locator, script: &str) -> Result<serde_json::Value>;

    async fn screenshot(&self, path: &Path, format: ScreenshotFormat, quality: u8) -> Result<()>;
    async fn set_input_files(&self, locator: &Locator, file: &Path) -> Result<()>;
    /// Click the target and satisfy the resulting file chooser.
    async fn upload_via_chooser(&self, locator: &Locator, file: &Path) -> Result<()>;

    async fn apply_storage_state(&self, state: &serde_json::Value) -> Result<()>;
    async fn storage_state(&self) -> Result<serde_json::Value>;
    async fn install_route(&self, url_pattern: &str, response: &RouteResponse) -> Result<()>;

    async fn start_tracing(&self) -> Result<()>;
    async fn stop_tracing(&self, path: &Path) -> Result<()>;
    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>>;
    async fn close(&self) -> Result<()>;
}

/// Launches one driver per scenario run.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, env: &ContextEnv) -> Result<Box<dyn Driver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_chain_describes_scoping() {
        let locator = Locator::new(Query::TestId {
            value: "grid".into(),
        })
        .within(Query::Css {
            css: ".wj-row".into(),
            has_text: None,
        })
        .nth(3)
        .within(Query::Css {
            css: ".wj-cell".into(),
            has_text: None,
        });
        assert_eq!(
            locator.describe(),
            "testId=grid >> css=.wj-row:nth(3) >> css=.wj-cell"
        );
    }

    #[test]
    fn locator_serializes_for_the_wire() {
        let locator = Locator::new(Query::Role {
            role: "button".into(),
            name: Some("Save".into()),
            exact: false,
        });
        let json = serde_json::to_value(&locator).unwrap();
        assert_eq!(json["chain"][0]["query"]["kind"], "role");
        assert_eq!(json["chain"][0]["query"]["name"], "Save");
        assert!(json.get("frame").is_none());
    }
}
