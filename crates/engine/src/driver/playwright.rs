//! Playwright sidecar driver
//!
//! Drives a real browser through a long-lived Node.js sidecar speaking
//! newline-delimited JSON over stdio: one request `{id, cmd, args}` per
//! line, one response `{id, ok, result|error}` per line. The sidecar
//! keeps a single browser context and page alive for the whole run.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use flowreplay_common::{Error, Result, ScreenshotFormat};

use super::{
    ConsoleMessage, ContextEnv, Driver, DriverFactory, ElementState, LoadState, Locator,
    RouteResponse,
};

/// The embedded sidecar program. Kept dependency-free on the Node side:
/// only `playwright` and the standard library.
const SIDECAR_SOURCE: &str = r#"
const readline = require('readline');
const { chromium } = require('playwright');

const config = JSON.parse(process.argv[2] || '{}');

(async () => {
  const browser = await chromium.launch({
    headless: !config.headed,
    slowMo: config.slowMoMs || 0,
    channel: config.channel || undefined,
  });
  const opts = {};
  if (config.viewport) opts.viewport = { width: config.viewport[0], height: config.viewport[1] };
  if (config.timezone) opts.timezoneId = config.timezone;
  if (config.locale) opts.locale = config.locale;
  if (config.extraHeaders && config.extraHeaders.length) {
    opts.extraHTTPHeaders = Object.fromEntries(config.extraHeaders);
  }
  if (config.storageStatePath) opts.storageState = config.storageStatePath;
  if (config.recordVideoDir) opts.recordVideo = { dir: config.recordVideoDir };
  const context = await browser.newContext(opts);
  const page = await context.newPage();
  const consoleBuffer = [];
  page.on('console', (msg) => consoleBuffer.push({ level: msg.type(), text: msg.text() }));

  function target(loc) {
    const scope = loc.frame ? page.frameLocator(loc.frame) : page;
    let cur = null;
    for (const link of loc.chain) {
      const q = link.query;
      const base = cur === null ? scope : cur;
      switch (q.kind) {
        case 'testId': cur = base.getByTestId(q.value); break;
        case 'role': cur = base.getByRole(q.role, { name: q.name ?? undefined, exact: q.exact }); break;
        case 'label': cur = base.getByLabel(q.value); break;
        case 'placeholder': cur = base.getByPlaceholder(q.value); break;
        case 'css': cur = q.hasText ? base.locator(q.css, { hasText: q.hasText }) : base.locator(q.css); break;
        case 'text': cur = base.getByText(q.value, { exact: q.exact }); break;
        default: throw new Error('unknown locator kind: ' + q.kind);
      }
      if (link.nth !== null && link.nth !== undefined) cur = cur.nth(link.nth);
    }
    return cur;
  }

  const handlers = {
    goto: (a) => page.goto(a.url).then(() => null),
    back: () => page.goBack().then(() => null),
    reload: () => page.reload().then(() => null),
    waitForLoadState: (a) => page.waitForLoadState(a.state, { timeout: a.timeoutMs ?? undefined }).then(() => null),
    url: () => page.url(),
    count: (a) => target(a.locator).count(),
    isVisible: (a) => target(a.locator).isVisible(),
    waitFor: (a) => target(a.locator).waitFor({ state: a.state, timeout: a.timeoutMs }).then(() => null),
    click: (a) => target(a.locator).click().then(() => null),
    dblclick: (a) => target(a.locator).dblclick().then(() => null),
    fill: (a) => target(a.locator).fill(a.value).then(() => null),
    press: (a) => target(a.locator).press(a.key).then(() => null),
    setChecked: (a) => target(a.locator).setChecked(a.checked).then(() => null),
    selectOption: (a) => target(a.locator).selectOption(a.value).then(() => null),
    scrollIntoView: (a) => target(a.locator).scrollIntoViewIfNeeded().then(() => null),
    wheel: (a) => page.mouse.wheel(a.deltaX, a.deltaY).then(() => null),
    textContent: (a) => target(a.locator).textContent().then((t) => t ?? ''),
    getAttribute: (a) => target(a.locator).getAttribute(a.name),
    innerHTML: (a) => target(a.locator).innerHTML(),
    evalOn: (a) => target(a.locator).evaluate(a.script),
    screenshot: (a) => page.screenshot({
      path: a.path,
      type: a.format,
      quality: a.format === 'jpeg' ? a.quality : undefined,
    }).then(() => null),
    setInputFiles: (a) => target(a.locator).setInputFiles(a.file).then(() => null),
    uploadChooser: async (a) => {
      const [chooser] = await Promise.all([
        page.waitForEvent('filechooser'),
        target(a.locator).click(),
      ]);
      await chooser.setFiles(a.file);
      return null;
    },
    applyStorageState: async (a) => {
      if (a.state && a.state.cookies) await context.addCookies(a.state.cookies);
      return null;
    },
    storageState: () => context.storageState(),
    route: (a) => page.route(a.pattern, (route) => {
      if (a.method && route.request().method().toUpperCase() !== a.method.toUpperCase()) {
        return route.fallback();
      }
      return route.fulfill({ status: a.status, contentType: 'application/json', body: a.body });
    }).then(() => null),
    tracingStart: () => context.tracing.start({ screenshots: true, snapshots: true }).then(() => null),
    tracingStop: (a) => context.tracing.stop({ path: a.path }).then(() => null),
    drainConsole: () => consoleBuffer.splice(0, consoleBuffer.length),
    close: async () => {
      await context.close();
      return null;
    },
  };

  const rl = readline.createInterface({ input: process.stdin });
  process.stdout.write(JSON.stringify({ ready: true }) + '\n');
  for await (const line of rl) {
    if (!line.trim()) continue;
    let req;
    try { req = JSON.parse(line); } catch { continue; }
    try {
      const handler = handlers[req.cmd];
      if (!handler) throw new Error('unknown command: ' + req.cmd);
      const result = await handler(req.args || {});
      process.stdout.write(JSON.stringify({ id: req.id, ok: true, result: result ?? null }) + '\n');
    } catch (err) {
      const message = err && err.message ? err.message : String(err);
      process.stdout.write(JSON.stringify({ id: req.id, ok: false, error: message }) + '\n');
    }
    if (req.cmd === 'close') break;
  }
  await browser.close().catch(() => {});
  process.exit(0);
})().catch((err) => {
  const message = err && err.message ? err.message : String(err);
  process.stdout.write(JSON.stringify({ ready: false, error: message }) + '\n');
  process.exit(1);
});
"#;

#[derive(serde::Deserialize)]
struct SidecarResponse {
    #[allow(dead_code)]
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

struct SidecarIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Launches one Playwright sidecar per scenario.
#[derive(Debug, Clone, Default)]
pub struct PlaywrightLauncher {
    /// Browser channel (`chrome`, `msedge`); bundled Chromium when unset
    pub channel: Option<String>,
}

#[async_trait]
impl DriverFactory for PlaywrightLauncher {
    async fn launch(&self, env: &ContextEnv) -> Result<Box<dyn Driver>> {
        let driver = PlaywrightDriver::launch(env, self.channel.as_deref()).await?;
        Ok(Box::new(driver))
    }
}

/// A live sidecar process plus its stdio protocol channel.
pub struct PlaywrightDriver {
    child: Mutex<Child>,
    io: Mutex<SidecarIo>,
    next_id: AtomicU64,
    // holds the sidecar script on disk for the process lifetime
    _script: tempfile::NamedTempFile,
}

impl PlaywrightDriver {
    /// Verify node is available before attempting a launch.
    pub fn check_node_installed() -> Result<()> {
        let status = std::process::Command::new("node")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => Err(Error::Driver(
                "node not found; install Node.js and `npx playwright install`".to_string(),
            )),
        }
    }

    pub async fn launch(env: &ContextEnv, channel: Option<&str>) -> Result<Self> {
        Self::check_node_installed()?;

        let script = tempfile::Builder::new()
            .prefix("flowreplay-sidecar")
            .suffix(".js")
            .tempfile()
            .map_err(|e| Error::Driver(format!("cannot write sidecar script: {}", e)))?;
        std::fs::write(script.path(), SIDECAR_SOURCE)?;

        let config = json!({
            "headed": env.headed,
            "slowMoMs": env.slow_mo_ms,
            "channel": channel,
            "viewport": env.viewport.map(|(w, h)| [w, h]),
            "timezone": env.timezone,
            "locale": env.locale,
            "extraHeaders": env.extra_headers,
            "storageStatePath": env.storage_state_path,
            "recordVideoDir": env.record_video_dir,
        });

        debug!("launching playwright sidecar: {}", script.path().display());
        let mut child = Command::new("node")
            .arg(script.path())
            .arg(config.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Driver(format!("failed to spawn sidecar: {}", e)))?;

        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = child.stdout.take().expect("stdout piped");
        let mut reader = BufReader::new(stdout);

        // The sidecar announces readiness once the browser context is up.
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let ready: Value = serde_json::from_str(&line)
            .map_err(|e| Error::Driver(format!("invalid sidecar greeting: {}", e)))?;
        if ready.get("ready").and_then(Value::as_bool) != Some(true) {
            let reason = ready
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(Error::Driver(format!("browser launch failed: {}", reason)));
        }

        Ok(Self {
            child: Mutex::new(child),
            io: Mutex::new(SidecarIo {
                stdin,
                stdout: reader,
            }),
            next_id: AtomicU64::new(1),
            _script: script,
        })
    }

    async fn execute<R: DeserializeOwned>(&self, cmd: &str, args: Value) -> Result<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({ "id": id, "cmd": cmd, "args": args });
        let mut io = self.io.lock().await;

        let line = request.to_string();
        trace!("sidecar request: {}", line);
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.write_all(b"\n").await?;
        io.stdin.flush().await?;

        let mut buf = String::new();
        let read = io.stdout.read_line(&mut buf).await?;
        if read == 0 {
            return Err(Error::Driver("sidecar exited unexpectedly".to_string()));
        }
        trace!("sidecar response: {}", buf.trim());

        let response: SidecarResponse = serde_json::from_str(&buf)
            .map_err(|e| Error::Driver(format!("invalid sidecar response: {}", e)))?;
        if !response.ok {
            let message = response.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::Driver(message));
        }
        serde_json::from_value(response.result)
            .map_err(|e| Error::Driver(format!("unexpected result shape: {}", e)))
    }

    async fn execute_void(&self, cmd: &str, args: Value) -> Result<()> {
        let _: Value = self.execute(cmd, args).await?;
        Ok(())
    }
}

fn locator_args(locator: &Locator) -> Value {
    json!({ "locator": locator })
}

/// Timeout errors from the driver keep their own shape so callers can
/// distinguish waiting-out from hard failures.
fn classify_wait_error(err: Error, what: &str, ms: u64) -> Error {
    match err {
        Error::Driver(message) if message.contains("Timeout") => Error::Timeout {
            what: what.to_string(),
            ms,
        },
        other => other,
    }
}

#[async_trait]
impl Driver for PlaywrightDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.execute_void("goto", json!({ "url": url })).await
    }

    async fn go_back(&self) -> Result<()> {
        self.execute_void("back", json!({})).await
    }

    async fn reload(&self) -> Result<()> {
        self.execute_void("reload", json!({})).await
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: Option<u64>) -> Result<()> {
        self.execute_void(
            "waitForLoadState",
            json!({ "state": state, "timeoutMs": timeout_ms }),
        )
        .await
        .map_err(|e| classify_wait_error(e, "load state", timeout_ms.unwrap_or(0)))
    }

    async fn current_url(&self) -> Result<String> {
        self.execute("url", json!({})).await
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        self.execute("count", locator_args(locator)).await
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.execute("isVisible", locator_args(locator)).await
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout_ms: u64,
    ) -> Result<()> {
        self.execute_void(
            "waitFor",
            json!({ "locator": locator, "state": state, "timeoutMs": timeout_ms }),
        )
        .await
        .map_err(|e| classify_wait_error(e, &locator.describe(), timeout_ms))
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.execute_void("click", locator_args(locator)).await
    }

    async fn dblclick(&self, locator: &Locator) -> Result<()> {
        self.execute_void("dblclick", locator_args(locator)).await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.execute_void("fill", json!({ "locator": locator, "value": value }))
            .await
    }

    async fn press(&self, locator: &Locator, key: &str) -> Result<()> {
        self.execute_void("press", json!({ "locator": locator, "key": key }))
            .await
    }

    async fn set_checked(&self, locator: &Locator, checked: bool) -> Result<()> {
        self.execute_void(
            "setChecked",
            json!({ "locator": locator, "checked": checked }),
        )
        .await
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()> {
        self.execute_void(
            "selectOption",
            json!({ "locator": locator, "value": value }),
        )
        .await
    }

    async fn scroll_into_view(&self, locator: &Locator) -> Result<()> {
        self.execute_void("scrollIntoView", locator_args(locator))
            .await
    }

    async fn mouse_wheel(&self, delta_x: i64, delta_y: i64) -> Result<()> {
        self.execute_void("wheel", json!({ "deltaX": delta_x, "deltaY": delta_y }))
            .await
    }

    async fn text_content(&self, locator: &Locator) -> Result<String> {
        self.execute("textContent", locator_args(locator)).await
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.execute("getAttribute", json!({ "locator": locator, "name": name }))
            .await
    }

    async fn inner_html(&self, locator: &Locator) -> Result<String> {
        self.execute("innerHTML", locator_args(locator)).await
    }

    async fn eval_on(&self, locator: &Locator, script: &str) -> Result<serde_json::Value> {
        self.execute("evalOn", json!({ "locator": locator, "script": script }))
            .await
    }

    async fn screenshot(&self, path: &Path, format: ScreenshotFormat, quality: u8) -> Result<()> {
        let format_name = match format {
            ScreenshotFormat::Jpeg => "jpeg",
            ScreenshotFormat::Png => "png",
        };
        self.execute_void(
            "screenshot",
            json!({ "path": path, "format": format_name, "quality": quality }),
        )
        .await
    }

    async fn set_input_files(&self, locator: &Locator, file: &Path) -> Result<()> {
        self.execute_void("setInputFiles", json!({ "locator": locator, "file": file }))
            .await
    }

    async fn upload_via_chooser(&self, locator: &Locator, file: &Path) -> Result<()> {
        self.execute_void("uploadChooser", json!({ "locator": locator, "file": file }))
            .await
    }

    async fn apply_storage_state(&self, state: &serde_json::Value) -> Result<()> {
        self.execute_void("applyStorageState", json!({ "state": state }))
            .await
    }

    async fn storage_state(&self) -> Result<serde_json::Value> {
        self.execute("storageState", json!({})).await
    }

    async fn install_route(&self, url_pattern: &str, response: &RouteResponse) -> Result<()> {
        self.execute_void(
            "route",
            json!({
                "pattern": url_pattern,
                "method": response.method,
                "status": response.status,
                "body": response.body,
            }),
        )
        .await
    }

    async fn start_tracing(&self) -> Result<()> {
        self.execute_void("tracingStart", json!({})).await
    }

    async fn stop_tracing(&self, path: &Path) -> Result<()> {
        self.execute_void("tracingStop", json!({ "path": path }))
            .await
    }

    async fn drain_console(&self) -> Result<Vec<ConsoleMessage>> {
        self.execute("drainConsole", json!({})).await
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.execute_void("close", json!({})).await {
            warn!("sidecar close failed: {}", e);
        }
        let mut child = self.child.lock().await;
        let _ = child.wait().await;
        Ok(())
    }
}
