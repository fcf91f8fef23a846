//! W3C WebDriver backend over HTTP
//!
//! Works with any WebDriver server (chromedriver, geckodriver,
//! safaridriver). Text and role locators are compiled to XPath; session
//! state is the cookie jar.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use uiflow_common::{Browser, RunConfig, Viewport};

use crate::driver::{DriverFactory, ElementRef, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, OptionChoice};

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// WebDriver server URL
    pub url: String,
    /// Application base URL; cookies are restored on this origin
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,
    pub request_timeout: Duration,
    pub script_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9515".to_string(),
            base_url: "https://parabank.parasoft.com/parabank/".to_string(),
            browser: Browser::Chromium,
            headless: true,
            request_timeout: Duration::from_secs(60),
            script_timeout: Duration::from_secs(30),
        }
    }
}

impl WebDriverConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            url: config.webdriver.url.trim_end_matches('/').to_string(),
            base_url: config.base_url.clone(),
            browser: config.browser,
            headless: config.headless,
            ..Self::default()
        }
    }

    /// New-session payload
    fn capabilities(&self, viewport: Viewport) -> Value {
        let window = format!("--window-size={},{}", viewport.width, viewport.height);
        let timeouts = json!({
            "script": self.script_timeout.as_millis() as u64,
            "pageLoad": self.request_timeout.as_millis() as u64,
            "implicit": 0
        });

        let always_match = match self.browser {
            Browser::Chromium => {
                let mut args = vec![window];
                if self.headless {
                    args.push("--headless=new".to_string());
                }
                json!({
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                    "timeouts": timeouts
                })
            }
            Browser::Firefox => {
                let args: Vec<&str> = if self.headless { vec!["-headless"] } else { Vec::new() };
                json!({
                    "browserName": "firefox",
                    "moz:firefoxOptions": { "args": args },
                    "timeouts": timeouts
                })
            }
            Browser::Webkit => json!({ "browserName": "safari", "timeouts": timeouts }),
        };

        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

pub struct WebDriverFactory {
    config: WebDriverConfig,
    client: reqwest::Client,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> E2eResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn open(&self, viewport: Viewport) -> E2eResult<Box<dyn PageDriver>> {
        let url = format!("{}/session", self.config.url);
        let response = self
            .client
            .post(&url)
            .json(&self.config.capabilities(viewport))
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        let value = unwrap_value(status, body)?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| E2eError::Driver("new session response has no sessionId".to_string()))?;
        info!("WebDriver session {} ({})", session_id, self.config.browser.as_str());

        let mut page = WebDriverPage {
            client: self.client.clone(),
            endpoint: format!("{}/session/{}", self.config.url, session_id),
            base_url: self.config.base_url.clone(),
            script_timeout: self.config.script_timeout,
            closed: false,
        };
        page.set_viewport(viewport).await?;
        Ok(Box::new(page))
    }

    fn name(&self) -> &str {
        "webdriver"
    }
}

/// Extract `value` from a WebDriver response, mapping protocol errors
fn unwrap_value(status: reqwest::StatusCode, mut body: Value) -> E2eResult<Value> {
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }

    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Err(match error {
        "no such element" | "stale element reference" | "no such window" => {
            E2eError::ElementNotFound(message.to_string())
        }
        "timeout" | "script timeout" => E2eError::Timeout {
            what: message.to_string(),
            timeout_ms: 0,
        },
        other => E2eError::Driver(format!("{} ({}): {}", other, status, message)),
    })
}

/// Quote a string as an XPath literal
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|part| format!("'{}'", part)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Innermost elements whose text contains `text`
fn text_xpath(text: &str) -> String {
    let lit = xpath_literal(text);
    format!(
        "//body//*[contains(normalize-space(.), {lit})][not(*[contains(normalize-space(.), {lit})])]",
        lit = lit
    )
}

/// Elements with an implicit or explicit ARIA role and optional name.
///
/// Covers the roles the suite uses; other roles match `@role` only.
fn role_xpath(role: &str, name: Option<&str>, exact: bool) -> String {
    const TEXT: &str = "normalize-space(.)";
    let explicit = format!("//*[@role={}]", xpath_literal(role));
    let candidates: Vec<(String, &str)> = match role {
        "button" => vec![
            ("//button".to_string(), TEXT),
            (
                "//input[@type='submit' or @type='button' or @type='reset']".to_string(),
                "@value",
            ),
            (explicit, TEXT),
        ],
        "link" => vec![("//a[@href]".to_string(), TEXT), (explicit, TEXT)],
        "heading" => vec![
            (
                "//*[self::h1 or self::h2 or self::h3 or self::h4 or self::h5 or self::h6]".to_string(),
                TEXT,
            ),
            (explicit, TEXT),
        ],
        "textbox" => vec![
            (
                "//input[not(@type) or @type='text' or @type='email' or @type='tel' or @type='password']"
                    .to_string(),
                "@placeholder",
            ),
            ("//textarea".to_string(), "@placeholder"),
            (explicit, TEXT),
        ],
        "combobox" => vec![("//select".to_string(), "@name"), (explicit, TEXT)],
        "cell" => vec![("//td".to_string(), TEXT), (explicit, TEXT)],
        "columnheader" => vec![("//th".to_string(), TEXT), (explicit, TEXT)],
        "row" => vec![("//tr".to_string(), TEXT), (explicit, TEXT)],
        _ => vec![(explicit, TEXT)],
    };

    candidates
        .into_iter()
        .map(|(path, name_expr)| match name {
            None => path,
            Some(name) => {
                let lit = xpath_literal(name);
                if exact {
                    format!("{}[{e}={lit} or @aria-label={lit}]", path, e = name_expr, lit = lit)
                } else {
                    format!(
                        "{}[contains({e}, {lit}) or contains(@aria-label, {lit})]",
                        path,
                        e = name_expr,
                        lit = lit
                    )
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Locator strategy and value for a find-elements request
fn strategy(locator: &Locator) -> (&'static str, String) {
    match locator {
        Locator::Css(css) => ("css selector", css.clone()),
        Locator::Text(text) => ("xpath", text_xpath(text)),
        Locator::Role { role, name, exact } => ("xpath", role_xpath(role, name.as_deref(), *exact)),
    }
}

fn element_ids(value: Value) -> Vec<ElementRef> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(|id| ElementRef(id.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// One browsing session on a WebDriver server
pub struct WebDriverPage {
    client: reqwest::Client,
    /// `<server>/session/<id>`
    endpoint: String,
    base_url: String,
    script_timeout: Duration,
    closed: bool,
}

impl WebDriverPage {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> E2eResult<Value> {
        let url = format!("{}{}", self.endpoint, path);
        debug!("WebDriver {} {}", method, path);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        unwrap_value(status, body)
    }

    async fn find_within(&self, element: &ElementRef, xpath: String) -> E2eResult<Vec<ElementRef>> {
        let value = self
            .command(
                Method::POST,
                &format!("/element/{}/elements", element),
                Some(json!({ "using": "xpath", "value": xpath })),
            )
            .await?;
        Ok(element_ids(value))
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| E2eError::Driver(format!("unexpected url value: {}", value)))
    }

    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>> {
        let (using, value) = strategy(locator);
        let found = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        Ok(element_ids(found))
    }

    async fn is_visible(&mut self, element: &ElementRef) -> E2eResult<bool> {
        let value = self
            .command(Method::GET, &format!("/element/{}/displayed", element), None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&mut self, element: &ElementRef) -> E2eResult<String> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", element, name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> E2eResult<()> {
        self.clear(element).await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": value })),
        )
        .await
        .map(|_| ())
    }

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/clear", element),
            Some(json!({})),
        )
        .await
        .map(|_| ())
    }

    async fn select_option(&mut self, element: &ElementRef, option: &OptionChoice) -> E2eResult<()> {
        let (options, wanted) = match option {
            OptionChoice::Value(v) => (
                self.find_within(element, format!(".//option[@value={}]", xpath_literal(v)))
                    .await?,
                0,
            ),
            OptionChoice::Label(l) => (
                self.find_within(
                    element,
                    format!(".//option[normalize-space(.)={}]", xpath_literal(l)),
                )
                .await?,
                0,
            ),
            OptionChoice::Index(i) => (self.find_within(element, ".//option".to_string()).await?, *i),
        };

        let target = options
            .get(wanted)
            .ok_or_else(|| E2eError::ElementNotFound(format!("option {:?} in {}", option, element)))?
            .clone();
        self.click(&target).await
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        self.command(
            Method::POST,
            "/window/rect",
            Some(json!({ "width": viewport.width, "height": viewport.height })),
        )
        .await
        .map(|_| ())
    }

    async fn evaluate(&mut self, script: &str) -> E2eResult<Value> {
        let wrapped = format!(
            "const done = arguments[arguments.length - 1];\n\
             (async () => {{ {} }})().then(done, (e) => done({{ __uiflow_error: String(e) }}));",
            script
        );
        let value = self
            .command(
                Method::POST,
                "/execute/async",
                Some(json!({ "script": wrapped, "args": [] })),
            )
            .await
            .map_err(|e| match e {
                E2eError::Timeout { what, .. } => E2eError::timeout(what, self.script_timeout),
                other => other,
            })?;

        if let Some(error) = value.get("__uiflow_error").and_then(Value::as_str) {
            return Err(E2eError::Driver(format!("script failed: {}", error)));
        }
        Ok(value)
    }

    async fn export_state(&mut self) -> E2eResult<Value> {
        let cookies = self.command(Method::GET, "/cookie", None).await?;
        Ok(json!({ "cookies": cookies }))
    }

    async fn import_state(&mut self, state: &Value) -> E2eResult<()> {
        // Cookies can only be set for the current document's origin
        let base_url = self.base_url.clone();
        self.navigate(&base_url).await?;

        let cookies = state
            .get("cookies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for cookie in cookies {
            self.command(Method::POST, "/cookie", Some(json!({ "cookie": cookie })))
                .await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Sessions outlive the client unless deleted
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let endpoint = self.endpoint.clone();
                handle.spawn(async move {
                    let _ = client.delete(&endpoint).send().await;
                });
            }
            Err(_) => warn!("WebDriver session {} left open", self.endpoint),
        }
    }
}
