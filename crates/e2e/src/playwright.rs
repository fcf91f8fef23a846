//! Playwright backend: a Node bridge process per page
//!
//! The bridge script (`bridge.js`) is written to a temporary directory
//! once per factory. Each page spawns `node bridge.js`, which launches a
//! browser with one context and answers line-delimited JSON requests on
//! stdio.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::time::timeout;
use tracing::{debug, info};

use uiflow_common::{Browser, RunConfig, Viewport};

use crate::driver::{DriverFactory, ElementRef, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, OptionChoice};

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub node_binary: PathBuf,
    /// Directory containing the `playwright` package
    pub node_modules: PathBuf,
    pub browser: Browser,
    pub headless: bool,
    /// Upper bound for a single bridge call
    pub call_timeout: Duration,
    /// Upper bound for browser launch
    pub launch_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("node"),
            node_modules: PathBuf::from("node_modules"),
            browser: Browser::Chromium,
            headless: true,
            call_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(60),
        }
    }
}

impl PlaywrightConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            node_binary: config.playwright.node_binary.clone(),
            node_modules: config.playwright.node_modules.clone(),
            browser: config.browser,
            headless: config.headless,
            // Page loads count against the call, so allow well past the step timeout
            call_timeout: config.step_timeout().max(Duration::from_secs(30)),
            ..Self::default()
        }
    }
}

pub struct PlaywrightFactory {
    config: PlaywrightConfig,
    script_dir: tempfile::TempDir,
}

impl PlaywrightFactory {
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        check_playwright_installed(&config)?;

        let script_dir = tempfile::tempdir()?;
        std::fs::write(script_dir.path().join("bridge.js"), BRIDGE_SCRIPT)?;
        debug!("Playwright bridge written to {}", script_dir.path().display());

        Ok(Self { config, script_dir })
    }
}

#[async_trait]
impl DriverFactory for PlaywrightFactory {
    async fn open(&self, viewport: Viewport) -> E2eResult<Box<dyn PageDriver>> {
        let page = PlaywrightPage::spawn(&self.config, &self.script_dir.path().join("bridge.js"), viewport)
            .await?;
        Ok(Box::new(page))
    }

    fn name(&self) -> &str {
        "playwright"
    }
}

/// Check that node can resolve the `playwright` package
fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
    let status = Command::new(&config.node_binary)
        .args(["-e", "require.resolve('playwright')"])
        .env("NODE_PATH", &config.node_modules)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Response {
    fn into_result(self, op: &str, call_timeout: Duration) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.result);
        }
        let message = self.error.unwrap_or_else(|| "unknown error".to_string());
        Err(match self.kind.as_deref() {
            Some("not_found") => E2eError::ElementNotFound(message),
            Some("timeout") => E2eError::timeout(format!("{}: {}", op, message), call_timeout),
            _ => E2eError::Driver(format!("{}: {}", op, message)),
        })
    }
}

/// Encode one bridge request
fn request(id: u64, op: &str, args: Value) -> Value {
    let mut request = json!({ "id": id, "op": op });
    if let (Some(target), Value::Object(args)) = (request.as_object_mut(), args) {
        target.extend(args);
    }
    request
}

/// One browser page driven through the bridge
pub struct PlaywrightPage {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    call_timeout: Duration,
    closed: bool,
}

impl PlaywrightPage {
    async fn spawn(config: &PlaywrightConfig, script: &std::path::Path, viewport: Viewport) -> E2eResult<Self> {
        let mut child = TokioCommand::new(&config.node_binary)
            .arg(script)
            .env("NODE_PATH", &config.node_modules)
            .env("UIFLOW_BROWSER", config.browser.as_str())
            .env("UIFLOW_HEADLESS", if config.headless { "1" } else { "0" })
            .env("UIFLOW_VIEWPORT", viewport.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("bridge stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "playwright", "{}", line);
                }
            });
        }

        let mut page = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            call_timeout: config.call_timeout,
            closed: false,
        };

        // The bridge announces readiness with id 0 once the browser is up
        let ready = timeout(config.launch_timeout, page.read_response(0))
            .await
            .map_err(|_| E2eError::timeout(format!("{} launch", config.browser.as_str()), config.launch_timeout))??;
        ready.into_result("launch", config.launch_timeout)?;

        info!(
            "Launched {} ({}, {})",
            config.browser.as_str(),
            if config.headless { "headless" } else { "headed" },
            viewport
        );
        Ok(page)
    }

    async fn call(&mut self, op: &str, args: Value) -> E2eResult<Value> {
        if self.closed {
            return Err(E2eError::Driver(format!("{}: page is closed", op)));
        }
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&request(id, op, args))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let response = timeout(self.call_timeout, self.read_response(id))
            .await
            .map_err(|_| E2eError::timeout(format!("playwright {}", op), self.call_timeout))??;
        response.into_result(op, self.call_timeout)
    }

    async fn read_response(&mut self, id: u64) -> E2eResult<Response> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Driver("playwright bridge exited".to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let response: Response = serde_json::from_str(&line)?;
            if response.id == Some(id) {
                return Ok(response);
            }
            debug!("Discarding bridge response for id {:?}", response.id);
        }
    }

    async fn element_call(&mut self, op: &str, element: &ElementRef, mut args: Value) -> E2eResult<Value> {
        if let Some(map) = args.as_object_mut() {
            map.insert("el".to_string(), Value::String(element.0.clone()));
        }
        self.call(op, args).await
    }

    fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        let _ = self.child.start_kill();
    }
}

fn expect_string(op: &str, value: Value) -> E2eResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(E2eError::Driver(format!("{}: expected string, got {}", op, other))),
    }
}

#[async_trait]
impl PageDriver for PlaywrightPage {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.call("goto", json!({ "url": url })).await.map(|_| ())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        let value = self.call("url", json!({})).await?;
        expect_string("url", value)
    }

    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>> {
        let value = self.call("query", json!({ "locator": locator })).await?;
        let ids: Vec<String> = serde_json::from_value(value)?;
        Ok(ids.into_iter().map(ElementRef).collect())
    }

    async fn is_visible(&mut self, element: &ElementRef) -> E2eResult<bool> {
        let value = self.element_call("visible", element, json!({})).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&mut self, element: &ElementRef) -> E2eResult<String> {
        let value = self.element_call("text", element, json!({})).await?;
        expect_string("text", value)
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        let value = self
            .element_call("attribute", element, json!({ "name": name }))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()> {
        self.element_call("click", element, json!({})).await.map(|_| ())
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> E2eResult<()> {
        self.element_call("fill", element, json!({ "value": value }))
            .await
            .map(|_| ())
    }

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()> {
        self.element_call("clear", element, json!({})).await.map(|_| ())
    }

    async fn select_option(&mut self, element: &ElementRef, option: &OptionChoice) -> E2eResult<()> {
        self.element_call("select", element, json!({ "option": option }))
            .await
            .map(|_| ())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        self.call(
            "viewport",
            json!({ "width": viewport.width, "height": viewport.height }),
        )
        .await
        .map(|_| ())
    }

    async fn evaluate(&mut self, script: &str) -> E2eResult<Value> {
        self.call("evaluate", json!({ "script": script })).await
    }

    async fn export_state(&mut self) -> E2eResult<Value> {
        self.call("export_state", json!({})).await
    }

    async fn import_state(&mut self, state: &Value) -> E2eResult<()> {
        self.call("import_state", json!({ "state": state }))
            .await
            .map(|_| ())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        let outcome = self.call("close", json!({})).await;
        self.closed = true;
        match timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright bridge exited with {}", status),
            _ => self.terminate(),
        }
        outcome.map(|_| ())
    }
}

impl Drop for PlaywrightPage {
    fn drop(&mut self) {
        if !self.closed {
            self.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_merges_args() {
        let locator = Locator::role("button", "Open New Account");
        let value = request(7, "query", json!({ "locator": locator }));
        assert_eq!(
            value,
            json!({
                "id": 7,
                "op": "query",
                "locator": { "role": "button", "name": "Open New Account" }
            })
        );
    }

    #[test]
    fn test_select_option_shape() {
        let value = request(3, "select", json!({ "el": "e4", "option": OptionChoice::Index(0) }));
        assert_eq!(value["option"], json!({ "index": 0 }));
    }

    #[test]
    fn test_error_kinds() {
        let response: Response =
            serde_json::from_str(r#"{"id":2,"ok":false,"kind":"not_found","error":"stale element e1"}"#)
                .unwrap();
        assert!(matches!(
            response.into_result("text", Duration::from_secs(1)),
            Err(E2eError::ElementNotFound(_))
        ));

        let response: Response =
            serde_json::from_str(r#"{"id":3,"ok":false,"kind":"timeout","error":"30000ms exceeded"}"#)
                .unwrap();
        assert!(matches!(
            response.into_result("goto", Duration::from_secs(30)),
            Err(E2eError::Timeout { timeout_ms: 30000, .. })
        ));

        let response: Response = serde_json::from_str(r#"{"id":4,"ok":true,"result":"x"}"#).unwrap();
        assert_eq!(response.into_result("url", Duration::from_secs(1)).unwrap(), json!("x"));
    }

    /// Body of one `ops` entry in the bridge script
    fn bridge_op(name: &str) -> &'static str {
        let start = BRIDGE_SCRIPT.find(&format!("  async {}(", name)).unwrap();
        let body = &BRIDGE_SCRIPT[start..];
        &body[..body.find("\n  },").unwrap()]
    }

    #[test]
    fn test_bridge_releases_element_handles() {
        assert!(bridge_op("click").contains("await forgetAll();"));
        assert!(bridge_op("goto").contains("await forgetAll();"));
        let query = bridge_op("query");
        assert!(query.contains("await forget(lastQuery.get(key)"));
        assert!(query.contains("lastQuery.set(key, ids)"));
    }

    #[test]
    fn test_config_from_run_config() {
        let mut run = RunConfig::default();
        run.browser = Browser::Firefox;
        run.headless = false;
        let config = PlaywrightConfig::from_run_config(&run);
        assert_eq!(config.browser, Browser::Firefox);
        assert!(!config.headless);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
    }
}
