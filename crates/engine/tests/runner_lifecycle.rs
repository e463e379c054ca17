//! Runner lifecycle tests against the in-memory driver: hook ordering,
//! screenshot naming, secret masking, artifact cleanup, variables,
//! cancellation and the virtualized grid search.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use tempfile::TempDir;
use walkdir::WalkDir;

use flowreplay_common::Scenario;
use flowreplay_engine::driver::fake::{FakeDriver, FakeElement, FakeFactory};
use flowreplay_engine::{default_registry, RunStatus, Runner, RunnerConfig, StepStatus};

fn scenario(yaml: &str) -> Scenario {
    Scenario::from_yaml(yaml).unwrap()
}

fn runner(driver: &Arc<FakeDriver>) -> Arc<Runner> {
    Arc::new(Runner::new(
        Arc::new(default_registry()),
        Arc::new(FakeFactory::new(Arc::clone(driver))),
    ))
}

fn config(dir: &TempDir) -> RunnerConfig {
    RunnerConfig {
        base_artifacts_dir: dir.path().to_path_buf(),
        step_timeout_ms: 2_000,
        ..RunnerConfig::default()
    }
}

/// All files under the run directory, as (relative path, content bytes).
fn run_dir_files(run_dir: &std::path::Path) -> Vec<(String, Vec<u8>)> {
    WalkDir::new(run_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(run_dir)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

#[tokio::test]
async fn passing_run_names_screenshots_by_step_order() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().label("Email"));
        dom.push(FakeElement::new().role("button", "Sign in"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: shots
baseUrl: http://app.local
steps:
  - goto: {url: "http://app.local/login", name: navigate-to-login}
  - fill: {by: {label: Email}, value: u@e.com, name: fill-email}
  - click: {by: {role: button, name: Sign in}, name: click-sign-in}
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.steps.len(), 3);

    let run_dir = result.run_dir.unwrap();
    let pattern = Regex::new(r"^\d{4}_before-[a-z][a-z0-9-]*\.(jpe?g|png)$").unwrap();
    let mut names: Vec<String> = std::fs::read_dir(run_dir.join("screenshots"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    for name in &names {
        assert!(pattern.is_match(name), "bad screenshot name: {}", name);
    }
    assert!(names[0].starts_with("0001_before-navigate-to-login"));
    assert!(names[1].starts_with("0002_before-fill-email"));
    assert!(names[2].starts_with("0003_before-click-sign-in"));
}

#[tokio::test]
async fn hooks_wrap_every_step_in_order() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("before-marker"));
        dom.push(FakeElement::new().test_id("after-marker"));
        dom.push(FakeElement::new().test_id("body-marker"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: hooks
baseUrl: http://app.local
hooks:
  beforeEachStep:
    - click: {by: {testId: before-marker}}
  afterEachStep:
    - click: {by: {testId: after-marker}}
steps:
  - goto: http://app.local/
  - click: {by: {testId: body-marker}}
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed);

    let actions = driver.dom.lock().unwrap().actions.clone();
    let clicks: Vec<&String> = actions.iter().filter(|a| a.starts_with("click ")).collect();
    // two steps, each wrapped before/after; the second also clicks its body
    assert_eq!(
        clicks
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>(),
        vec![
            "click testId=before-marker",
            "click testId=after-marker",
            "click testId=before-marker",
            "click testId=body-marker",
            "click testId=after-marker",
        ]
    );
}

#[tokio::test]
async fn hook_failure_aborts_the_scenario() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("body-marker"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: hook-failure
baseUrl: http://app.local
hooks:
  beforeEachStep:
    - click: {by: {testId: missing-hook-target}}
steps:
  - click: {by: {testId: body-marker}}
  - click: {by: {testId: body-marker}}
"#,
    );
    let mut cfg = config(&dir);
    cfg.step_timeout_ms = 300;

    let result = runner(&driver).run(&s, &cfg).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps.len(), 1, "no further steps after hook failure");
    let error = result.steps[0].error.as_deref().unwrap();
    assert!(error.contains("beforeEachStep hook"), "got: {}", error);
}

#[tokio::test]
async fn secrets_never_reach_the_run_directory() {
    let var = "FLOWREPLAY_TEST_PASSWORD";
    std::env::set_var(var, "hunter2");

    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().label("Password"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: masking
baseUrl: http://app.local
steps:
  - fill:
      by: {label: Password}
      value: "${env.FLOWREPLAY_TEST_PASSWORD}"
      secret: true
      name: fill-password
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed);

    // the driver saw the plaintext
    let actions = driver.dom.lock().unwrap().actions.clone();
    assert!(actions.iter().any(|a| a.contains("hunter2")));

    // no artifact did
    let run_dir = result.run_dir.unwrap();
    for (rel, bytes) in run_dir_files(&run_dir) {
        let text = String::from_utf8_lossy(&bytes);
        assert!(
            !text.contains("hunter2"),
            "plaintext secret leaked into {}",
            rel
        );
    }

    let env_json = std::fs::read_to_string(run_dir.join("env.json")).unwrap();
    assert!(env_json.contains("FLOWREPLAY_TEST_PASSWORD"));
    assert!(env_json.contains("***"));
}

#[tokio::test]
async fn on_failure_artifacts_are_dropped_after_a_passing_run() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("ok"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: cleanup
baseUrl: http://app.local
artifacts:
  trace: {mode: on_failure}
  video: {mode: on_failure}
steps:
  - click: {by: {testId: ok}}
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed);
    let run_dir = result.run_dir.unwrap();

    let files: BTreeSet<String> = run_dir_files(&run_dir).into_iter().map(|(p, _)| p).collect();
    assert!(files.contains("report.json"));
    assert!(files.contains("flow.yaml"));
    assert!(!files.iter().any(|f| f.starts_with("trace/")), "trace kept: {:?}", files);
    assert!(!files.iter().any(|f| f.starts_with("video/")), "video kept: {:?}", files);
}

#[tokio::test]
async fn failing_run_keeps_trace_and_video() {
    let driver = Arc::new(FakeDriver::new());
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: keep-on-failure
baseUrl: http://app.local
artifacts:
  trace: {mode: on_failure}
  video: {mode: on_failure}
steps:
  - click: {by: {testId: does-not-exist}}
"#,
    );
    let mut cfg = config(&dir);
    cfg.step_timeout_ms = 200;

    let result = runner(&driver).run(&s, &cfg).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let run_dir = result.run_dir.unwrap();
    assert!(run_dir.join("trace/trace.zip").exists());
    assert!(run_dir.join("video/recording.webm").exists());

    // failing step carries its selector and error
    let failed = &result.steps[0];
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.selector.as_deref(), Some("testId='does-not-exist'"));
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn stored_variables_flow_into_later_steps() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("order-id").text("A-42"));
        dom.push(FakeElement::new().label("Reference"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: variables
baseUrl: http://app.local
steps:
  - storeText: {by: {testId: order-id}, varName: orderId}
  - fill: {by: {label: Reference}, value: "ref-${vars.orderId}"}
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed);
    let dom = driver.dom.lock().unwrap();
    assert!(dom
        .actions
        .iter()
        .any(|a| a.contains("fill label=Reference = ref-A-42")));
}

#[tokio::test]
async fn undefined_variable_fails_the_step_and_names_it() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().label("Email"));
    }));
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: bad-var
baseUrl: http://app.local
steps:
  - fill: {by: {label: Email}, value: "${env.FLOWREPLAY_NO_SUCH_VAR}"}
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let error = result.steps[0].error.as_deref().unwrap();
    assert!(error.contains("FLOWREPLAY_NO_SUCH_VAR"), "got: {}", error);
}

#[tokio::test]
async fn unknown_step_type_fails_the_run() {
    let driver = Arc::new(FakeDriver::new());
    let dir = TempDir::new().unwrap();
    let s = scenario(
        "title: unknown\nbaseUrl: http://app.local\nsteps:\n  - teleport: {by: {testId: x}}\n",
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let error = result.steps[0].error.as_deref().unwrap();
    assert!(error.contains("teleport"));
}

#[tokio::test]
async fn cancellation_aborts_the_step_and_persists_failure_artifacts() {
    let driver = Arc::new(FakeDriver::new());
    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: cancel
baseUrl: http://app.local
steps:
  - waitForVisible: {by: {testId: never-appears}, timeout: 60000}
"#,
    );
    let mut cfg = config(&dir);
    cfg.step_timeout_ms = 60_000;

    let (tx, rx) = tokio::sync::watch::channel(false);
    let run = runner(&driver);
    let handle = {
        let s = s.clone();
        let run = Arc::clone(&run);
        tokio::spawn(async move { run.run_with_cancel(&s, &cfg, rx).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tx.send(true).unwrap();

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    let error = result.steps[0].error.as_deref().unwrap();
    assert!(error.contains("Cancelled"), "got: {}", error);

    let run_dir = result.run_dir.unwrap();
    let failure_shot = std::fs::read_dir(run_dir.join("screenshots"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .any(|name| name.contains("_failed-"));
    assert!(failure_shot, "cancellation should persist a failure screenshot");
}

#[tokio::test]
async fn parallel_scenarios_get_disjoint_run_directories() {
    let driver = Arc::new(FakeDriver::new().with_dom(|dom| {
        dom.push(FakeElement::new().test_id("ok"));
    }));
    let dir = TempDir::new().unwrap();
    let yaml = |title: &str| {
        scenario(&format!(
            "title: {}\nbaseUrl: http://app.local\nsteps:\n  - click: {{by: {{testId: ok}}}}\n",
            title
        ))
    };
    let mut cfg = config(&dir);
    cfg.workers = 2;

    let run = runner(&driver);
    let results = run
        .run_many(vec![yaml("first"), yaml("second")], &cfg)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    // aggregate ordering follows input order
    assert_eq!(results[0].title, "first");
    assert_eq!(results[1].title, "second");
    assert_ne!(results[0].run_dir, results[1].run_dir);
    for result in &results {
        assert_eq!(result.status, RunStatus::Passed);
    }
}

#[tokio::test]
async fn grid_cell_click_scrolls_virtualized_rows() {
    const WINDOW: usize = 20;
    const STRIDE: usize = 2500;
    const TOTAL: usize = 10_000;

    let driver = Arc::new(FakeDriver::new());
    let (grid_id, body_id) = {
        let mut dom = driver.dom.lock().unwrap();
        let grid_id = dom.push(FakeElement::new().test_id("orders-grid"));
        let header = dom.push_child(grid_id, FakeElement::new().css(".wj-header"));
        dom.push_child(header, FakeElement::new().css(".wj-cell").text("ID"));
        dom.push_child(header, FakeElement::new().css(".wj-cell").text("Name"));
        let body_id = dom.push_child(grid_id, FakeElement::new().css(".wj-cells"));
        (grid_id, body_id)
    };
    let _ = grid_id;

    // materialize a window of rows starting at `start`
    let fill_window = move |dom: &mut flowreplay_engine::driver::fake::FakeDom, start: usize| {
        dom.clear_children(body_id);
        for row in start..(start + WINDOW).min(TOTAL) {
            let row_id = dom.push_child(body_id, FakeElement::new().css(".wj-row"));
            dom.push_child(
                row_id,
                FakeElement::new().css(".wj-cell").text(&row.to_string()),
            );
            dom.push_child(
                row_id,
                FakeElement::new().css(".wj-cell").text(&format!("order {}", row)),
            );
        }
    };
    fill_window(&mut driver.dom.lock().unwrap(), 0);

    let start = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    {
        let start = Arc::clone(&start);
        driver.on_eval(Box::new(move |dom, _locator, script| {
            assert!(script.contains("scrollTop"));
            let next = start.load(std::sync::atomic::Ordering::SeqCst) + STRIDE;
            start.store(next, std::sync::atomic::Ordering::SeqCst);
            fill_window(dom, next);
            serde_json::Value::Null
        }));
    }

    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: grid
baseUrl: http://app.local
steps:
  - clickWijmoGridCell:
      grid: {testId: orders-grid}
      rowKey: {column: ID, equals: "7500"}
      column: Name
      name: click-order-7500
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.steps[0].status, StepStatus::Passed, "{:?}", result.steps[0].error);

    // the intermediate scrolls are recorded in runner.log
    let log = std::fs::read_to_string(result.run_dir.unwrap().join("logs/runner.log")).unwrap();
    assert!(log.contains("scrolled grid"), "log was: {}", log);

    // the clicked cell is the Name column of the matched row
    let dom = driver.dom.lock().unwrap();
    assert!(dom.actions.iter().any(|a| a.starts_with("click ")
        && a.contains(".wj-cell:nth(1)")));
}

#[tokio::test]
async fn overlay_option_selection_waits_for_the_list() {
    let driver = Arc::new(FakeDriver::new());
    {
        let mut dom = driver.dom.lock().unwrap();
        dom.push(FakeElement::new().test_id("country-select").role("button", "Country"));
        let list = dom.push(FakeElement::new().css(".overlay-list").hidden());
        dom.push_child(list, FakeElement::new().text("Japan"));
        dom.push_child(list, FakeElement::new().text("Japan (Okinawa)"));
    }

    // the overlay becomes visible shortly after the trigger click
    let shared = Arc::clone(&driver);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let mut dom = shared.dom.lock().unwrap();
            let clicked = dom
                .find_by_test_id("country-select")
                .map(|el| el.clicks > 0)
                .unwrap_or(false);
            if clicked {
                for id in dom.resolve(&flowreplay_engine::Locator::new(
                    flowreplay_engine::Query::Css {
                        css: ".overlay-list".into(),
                        has_text: None,
                    },
                )) {
                    if let Some(el) = dom.element_mut(id) {
                        el.visible = true;
                    }
                }
                break;
            }
        }
    });

    let dir = TempDir::new().unwrap();
    let s = scenario(
        r#"
title: overlay
baseUrl: http://app.local
steps:
  - selectOverlayOption:
      open: {testId: country-select}
      list: {css: .overlay-list}
      optionText: Japan
      name: select-country
"#,
    );

    let result = runner(&driver).run(&s, &config(&dir)).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed, "{:?}", result.steps[0].error);

    // the exact-text option was clicked, not the longer lookalike
    let dom = driver.dom.lock().unwrap();
    assert!(dom
        .actions
        .iter()
        .any(|a| a.starts_with("click ") && a.contains("text=Japan")));
}
