//! In-memory driver for the test suites
//!
//! A deterministic stand-in for the browser: a flat element tree with
//! parent links, matched by the same locator queries the real driver
//! understands. Tests mutate the DOM through a shared handle, which is
//! how overlays appearing and virtualized grids scrolling are simulated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use flowreplay_common::{Error, Result, ScreenshotFormat};

use super::{
    ConsoleMessage, ContextEnv, Driver, DriverFactory, ElementState, LoadState, Locator, Query,
    RouteResponse,
};

/// One fake DOM node. `css` lists the selector strings the node answers
/// to, which sidesteps implementing a CSS engine.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub id: usize,
    pub parent: Option<usize>,
    pub test_id: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub css: Vec<String>,
    pub text: String,
    pub visible: bool,
    pub value: String,
    pub checked: bool,
    pub attrs: BTreeMap<String, String>,
    pub clicks: usize,
}

impl FakeElement {
    pub fn new() -> Self {
        Self {
            visible: true,
            ..Default::default()
        }
    }

    pub fn test_id(mut self, v: &str) -> Self {
        self.test_id = Some(v.to_string());
        self
    }

    pub fn role(mut self, role: &str, name: &str) -> Self {
        self.role = Some(role.to_string());
        self.name = Some(name.to_string());
        self
    }

    pub fn label(mut self, v: &str) -> Self {
        self.label = Some(v.to_string());
        self
    }

    pub fn placeholder(mut self, v: &str) -> Self {
        self.placeholder = Some(v.to_string());
        self
    }

    pub fn css(mut self, v: &str) -> Self {
        self.css.push(v.to_string());
        self
    }

    pub fn text(mut self, v: &str) -> Self {
        self.text = v.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn attr(mut self, k: &str, v: &str) -> Self {
        self.attrs.insert(k.to_string(), v.to_string());
        self
    }
}

type EvalHook = Box<dyn Fn(&mut FakeDom, &Locator, &str) -> serde_json::Value + Send + Sync>;

/// The mutable page state behind a [`FakeDriver`].
#[derive(Default)]
pub struct FakeDom {
    elements: Vec<FakeElement>,
    next_id: usize,
    pub url: String,
    pub history: Vec<String>,
    pub console: Vec<ConsoleMessage>,
    pub actions: Vec<String>,
    pub routes: Vec<(String, RouteResponse)>,
    pub storage: Option<serde_json::Value>,
    pub tracing_active: bool,
}

impl FakeDom {
    /// Insert a root element, returning its id.
    pub fn push(&mut self, mut el: FakeElement) -> usize {
        el.id = self.next_id;
        self.next_id += 1;
        let id = el.id;
        self.elements.push(el);
        id
    }

    pub fn push_child(&mut self, parent: usize, el: FakeElement) -> usize {
        let mut el = el;
        el.parent = Some(parent);
        self.push(el)
    }

    pub fn remove(&mut self, id: usize) {
        self.elements.retain(|e| e.id != id);
    }

    pub fn clear_children(&mut self, parent: usize) {
        let doomed: Vec<usize> = self
            .elements
            .iter()
            .filter(|e| e.parent == Some(parent))
            .map(|e| e.id)
            .collect();
        for id in doomed {
            self.remove(id);
        }
    }

    pub fn element_mut(&mut self, id: usize) -> Option<&mut FakeElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn find_by_test_id(&mut self, test_id: &str) -> Option<&mut FakeElement> {
        self.elements
            .iter_mut()
            .find(|e| e.test_id.as_deref() == Some(test_id))
    }

    pub fn push_console(&mut self, level: &str, text: &str) {
        self.console.push(ConsoleMessage {
            level: level.to_string(),
            text: text.to_string(),
        });
    }

    fn matches(el: &FakeElement, query: &Query) -> bool {
        match query {
            Query::TestId { value } => el.test_id.as_deref() == Some(value),
            Query::Role { role, name, exact } => {
                if el.role.as_deref() != Some(role) {
                    return false;
                }
                match name {
                    None => true,
                    Some(wanted) => match &el.name {
                        None => false,
                        Some(actual) => {
                            if *exact {
                                actual == wanted
                            } else {
                                actual.to_lowercase().contains(&wanted.to_lowercase())
                            }
                        }
                    },
                }
            }
            Query::Label { value } => el.label.as_deref() == Some(value),
            Query::Placeholder { value } => el.placeholder.as_deref() == Some(value),
            Query::Css { css, has_text } => {
                el.css.iter().any(|c| c == css)
                    && has_text.as_deref().map_or(true, |t| el.text.contains(t))
            }
            Query::Text { value, exact } => {
                if *exact {
                    el.text.trim() == value
                } else {
                    el.text.contains(value.as_str())
                }
            }
        }
    }

    fn is_descendant_of(&self, mut id: usize, ancestor: usize) -> bool {
        while let Some(el) = self.elements.iter().find(|e| e.id == id) {
            match el.parent {
                Some(p) if p == ancestor => return true,
                Some(p) => id = p,
                None => return false,
            }
        }
        false
    }

    /// Element ids matched by a locator, in document order.
    pub fn resolve(&self, locator: &Locator) -> Vec<usize> {
        let mut current: Option<Vec<usize>> = None;
        for link in &locator.chain {
            let mut matched: Vec<usize> = self
                .elements
                .iter()
                .filter(|el| Self::matches(el, &link.query))
                .filter(|el| match &current {
                    None => true,
                    Some(scope) => scope.iter().any(|a| self.is_descendant_of(el.id, *a)),
                })
                .map(|el| el.id)
                .collect();
            if let Some(n) = link.nth {
                matched = matched.get(n).copied().into_iter().collect();
            }
            current = Some(matched);
        }
        current.unwrap_or_default()
    }

    fn single(&self, locator: &Locator) -> Result<usize> {
        let ids = self.resolve(locator);
        ids.first()
            .copied()
            .ok_or_else(|| Error::Driver(format!("no element for {}", locator.describe())))
    }
}

/// Deterministic in-memory driver.
pub struct FakeDriver {
    pub dom: Mutex<FakeDom>,
    env: ContextEnv,
    eval_hook: Mutex<Option<EvalHook>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::with_env(ContextEnv::default())
    }

    pub fn with_env(env: ContextEnv) -> Self {
        Self {
            dom: Mutex::new(FakeDom::default()),
            env,
            eval_hook: Mutex::new(None),
        }
    }

    /// Install a handler for `eval_on` scripts (e.g. grid scrolling).
    pub fn on_eval(&self, hook: EvalHook) {
        *self.eval_hook.lock().unwrap() = Some(hook);
    }

    pub fn with_dom(self, build: impl FnOnce(&mut FakeDom)) -> Self {
        build(&mut self.dom.lock().unwrap());
        self
    }

    fn record(&self, action: String) {
        self.dom.lock().unwrap().actions.push(action);
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        dom.url = url.to_string();
        dom.history.push(url.to_string());
        dom.actions.push(format!("goto {}", url));
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        dom.history.pop();
        dom.url = dom.history.last().cloned().unwrap_or_default();
        dom.actions.push("back".to_string());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload".to_string());
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, _timeout_ms: Option<u64>) -> Result<()> {
        self.record(format!("waitForLoadState {:?}", state));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.dom.lock().unwrap().url.clone())
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        let mut dom = self.dom.lock().unwrap();
        dom.actions.push(format!("probe {}", locator.describe()));
        let count = dom.resolve(locator).len();
        Ok(count)
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        let dom = self.dom.lock().unwrap();
        let ids = dom.resolve(locator);
        Ok(ids
            .first()
            .and_then(|id| dom.elements.iter().find(|e| e.id == *id))
            .map(|e| e.visible)
            .unwrap_or(false))
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout_ms: u64,
    ) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let satisfied = {
                let dom = self.dom.lock().unwrap();
                let ids = dom.resolve(locator);
                let visible = ids
                    .first()
                    .and_then(|id| dom.elements.iter().find(|e| e.id == *id))
                    .map(|e| e.visible)
                    .unwrap_or(false);
                match state {
                    ElementState::Visible => !ids.is_empty() && visible,
                    ElementState::Hidden => ids.is_empty() || !visible,
                    ElementState::Attached => !ids.is_empty(),
                    ElementState::Detached => ids.is_empty(),
                }
            };
            if satisfied {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    what: locator.describe(),
                    ms: timeout_ms,
                });
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.single(locator)?;
        if let Some(el) = dom.element_mut(id) {
            el.clicks += 1;
        }
        dom.actions.push(format!("click {}", locator.describe()));
        Ok(())
    }

    async fn dblclick(&self, locator: &Locator) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.single(locator)?;
        if let Some(el) = dom.element_mut(id) {
            el.clicks += 2;
        }
        dom.actions.push(format!("dblclick {}", locator.describe()));
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.single(locator)?;
        if let Some(el) = dom.element_mut(id) {
            el.value = value.to_string();
        }
        dom.actions
            .push(format!("fill {} = {}", locator.describe(), value));
        Ok(())
    }

    async fn press(&self, locator: &Locator, key: &str) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        dom.single(locator)?;
        dom.actions
            .push(format!("press {} {}", locator.describe(), key));
        Ok(())
    }

    async fn set_checked(&self, locator: &Locator, checked: bool) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.single(locator)?;
        if let Some(el) = dom.element_mut(id) {
            el.checked = checked;
        }
        dom.actions
            .push(format!("setChecked {} {}", locator.describe(), checked));
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.single(locator)?;
        if let Some(el) = dom.element_mut(id) {
            el.value = value.to_string();
        }
        dom.actions
            .push(format!("selectOption {} {}", locator.describe(), value));
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<()> {
        self.record(format!("scrollIntoView {}", locator.describe()));
        Ok(())
    }

    async fn mouse_wheel(&self, delta_x: i64, delta_y: i64) -> Result<()> {
        self.record(format!("wheel {} {}", delta_x, delta_y));
        Ok(())
    }

    async fn text_content(&self, locator: &Locator) -> Result<String> {
        let dom = self.dom.lock().unwrap();
        let ids = dom.resolve(locator);
        let id = ids
            .first()
            .ok_or_else(|| Error::Driver(format!("no element for {}", locator.describe())))?;
        Ok(dom
            .elements
            .iter()
            .find(|e| e.id == *id)
            .map(|e| e.text.clone())
            .unwrap_or_default())
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        let dom = self.dom.lock().unwrap();
        let ids = dom.resolve(locator);
        let id = ids
            .first()
            .ok_or_else(|| Error::Driver(format!("no element for {}", locator.describe())))?;
        Ok(dom
            .elements
            .iter()
            .find(|e| e.id == *id)
            .and_then(|e| e.attrs.get(name).cloned()))
    }

    async fn inner_html(&self, locator: &Locator) -> Result<String> {
        let text = self.text_content(locator).await?;
        Ok(format!("<div>{}</div>", text))
    }

    async fn eval_on(&self, locator: &Locator, script: &str) -> Result<serde_json::Value> {
        let hook = self.eval_hook.lock().unwrap();
        let mut dom = self.dom.lock().unwrap();
        dom.actions
            .push(format!("eval {} on {}", script, locator.describe()));
        match hook.as_ref() {
            Some(f) => Ok(f(&mut dom, locator, script)),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn screenshot(&self, path: &Path, format: ScreenshotFormat, _quality: u8) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // opaque bytes; real screenshots are pixels, not page text
        std::fs::write(path, format!("FAKE-IMAGE-{:?}", format))?;
        self.record(format!("screenshot {}", path.display()));
        Ok(())
    }

    async fn set_input_files(&self, locator: &Locator, file: &Path) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.single(locator)?;
        if let Some(el) = dom.element_mut(id) {
            el.attrs
                .insert("files".to_string(), file.display().to_string());
        }
        dom.actions.push(format!("setInputFiles {}", file.display()));
        Ok(())
    }

    async fn upload_via_chooser(&self, locator: &Locator, file: &Path) -> Result<()> {
        self.click(locator).await?;
        self.set_input_files(locator, file).await
    }

    async fn apply_storage_state(&self, state: &serde_json::Value) -> Result<()> {
        self.dom.lock().unwrap().storage = Some(state.clone());
        Ok(())
    }

    async fn storage_state(&self) -> Result<serde_json::Value> {
        Ok(self
            .dom
            .lock()
            .unwrap()
            .storage
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "cookies": [] })))
    }

    async fn install_route(&self, url_pattern: &str, response: &RouteResponse) -> Result<()> {
        self.dom
            .lock()
            .unwrap()
            .routes
            .push((url_pattern.to_string(), response.clone()));
        Ok(())
    }

    async fn start_tracing(&self) -> Result<()> {
        self.dom.lock().unwrap().tracing_active = true;
        Ok(())
    }

    async fn stop_tracing(&self, path: &Path) -> Result<()> {
        let mut dom = self.dom.lock().unwrap();
        if dom.tracing_active {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, b"FAKE-TRACE")?;
            dom.tracing_active = false;
        }
        Ok(())
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>> {
        Ok(std::mem::take(&mut self.dom.lock().unwrap().console))
    }

    async fn close(&self) -> Result<()> {
        if let Some(dir) = &self.env.record_video_dir {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join("recording.webm"), b"FAKE-VIDEO")?;
        }
        self.record("close".to_string());
        Ok(())
    }
}

/// Factory handing out drivers that share one DOM, so tests keep a handle
/// to the state the runner drives.
pub struct FakeFactory {
    driver: std::sync::Arc<FakeDriver>,
}

impl FakeFactory {
    pub fn new(driver: std::sync::Arc<FakeDriver>) -> Self {
        Self { driver }
    }
}

/// A driver wrapper delegating to a shared [`FakeDriver`], applying the
/// launch env (video dir) the runner computed.
struct SharedFake {
    inner: std::sync::Arc<FakeDriver>,
    record_video_dir: Option<PathBuf>,
}

#[async_trait]
impl DriverFactory for FakeFactory {
    async fn launch(&self, env: &ContextEnv) -> Result<Box<dyn Driver>> {
        Ok(Box::new(SharedFake {
            inner: self.driver.clone(),
            record_video_dir: env.record_video_dir.clone(),
        }))
    }
}

#[async_trait]
impl Driver for SharedFake {
    async fn goto(&self, url: &str) -> Result<()> {
        self.inner.goto(url).await
    }
    async fn go_back(&self) -> Result<()> {
        self.inner.go_back().await
    }
    async fn reload(&self) -> Result<()> {
        self.inner.reload().await
    }
    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: Option<u64>) -> Result<()> {
        self.inner.wait_for_load_state(state, timeout_ms).await
    }
    async fn current_url(&self) -> Result<String> {
        self.inner.current_url().await
    }
    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.inner.count(locator).await
    }
    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.inner.is_visible(locator).await
    }
    async fn wait_for(&self, locator: &Locator, state: ElementState, timeout_ms: u64) -> Result<()> {
        self.inner.wait_for(locator, state, timeout_ms).await
    }
    async fn click(&self, locator: &Locator) -> Result<()> {
        self.inner.click(locator).await
    }
    async fn dblclick(&self, locator: &Locator) -> Result<()> {
        self.inner.dblclick(locator).await
    }
    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.inner.fill(locator, value).await
    }
    async fn press(&self, locator: &Locator, key: &str) -> Result<()> {
        self.inner.press(locator, key).await
    }
    async fn set_checked(&self, locator: &Locator, checked: bool) -> Result<()> {
        self.inner.set_checked(locator, checked).await
    }
    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()> {
        self.inner.select_option(locator, value).await
    }
    async fn scroll_into_view(&self, locator: &Locator) -> Result<()> {
        self.inner.scroll_into_view(locator).await
    }
    async fn mouse_wheel(&self, delta_x: i64, delta_y: i64) -> Result<()> {
        self.inner.mouse_wheel(delta_x, delta_y).await
    }
    async fn text_content(&self, locator: &Locator) -> Result<String> {
        self.inner.text_content(locator).await
    }
    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.inner.attribute(locator, name).await
    }
    async fn inner_html(&self, locator: &Locator) -> Result<String> {
        self.inner.inner_html(locator).await
    }
    async fn eval_on(&self, locator: &Locator, script: &str) -> Result<serde_json::Value> {
        self.inner.eval_on(locator, script).await
    }
    async fn screenshot(&self, path: &Path, format: ScreenshotFormat, quality: u8) -> Result<()> {
        self.inner.screenshot(path, format, quality).await
    }
    async fn set_input_files(&self, locator: &Locator, file: &Path) -> Result<()> {
        self.inner.set_input_files(locator, file).await
    }
    async fn upload_via_chooser(&self, locator: &Locator, file: &Path) -> Result<()> {
        self.inner.upload_via_chooser(locator, file).await
    }
    async fn apply_storage_state(&self, state: &serde_json::Value) -> Result<()> {
        self.inner.apply_storage_state(state).await
    }
    async fn storage_state(&self) -> Result<serde_json::Value> {
        self.inner.storage_state().await
    }
    async fn install_route(&self, url_pattern: &str, response: &RouteResponse) -> Result<()> {
        self.inner.install_route(url_pattern, response).await
    }
    async fn start_tracing(&self) -> Result<()> {
        self.inner.start_tracing().await
    }
    async fn stop_tracing(&self, path: &Path) -> Result<()> {
        self.inner.stop_tracing(path).await
    }
    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>> {
        self.inner.drain_console().await
    }
    async fn close(&self) -> Result<()> {
        if let Some(dir) = &self.record_video_dir {
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join("recording.webm"), b"FAKE-VIDEO")?;
        }
        self.inner.close().await
    }
}
