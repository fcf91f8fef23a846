//! In-memory page double for runner, session and suite tests
//!
//! A `FakeState` is a scripted page: a URL, a flat list of elements, and
//! handlers that mutate the page when an element is clicked or a URL is
//! loaded. Every driver call is appended to `calls` so tests can check
//! ordering and short-circuiting.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use uiflow_common::Viewport;
use uiflow_e2e::spec::{Locator, OptionChoice};
use uiflow_e2e::{DriverFactory, E2eError, E2eResult, ElementRef, PageDriver};

pub const BASE_URL: &str = "https://bank.test/parabank/";

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub id: String,
    /// CSS selectors this element answers to
    pub selectors: Vec<String>,
    pub text: String,
    pub role: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub value: String,
    pub visible: bool,
    /// `(value, label)` pairs of a select element
    pub options: Vec<(String, String)>,
}

impl FakeElement {
    pub fn new(id: &str, selector: &str) -> Self {
        Self {
            id: id.to_string(),
            selectors: vec![selector.to_string()],
            visible: true,
            ..Self::default()
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(v, l)| (v.to_string(), l.to_string()))
            .collect();
        self
    }

    fn matches(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Css(css) => self.selectors.iter().any(|s| s == css),
            Locator::Text(text) => self.text.contains(text.as_str()),
            Locator::Role { role, name, exact } => {
                self.role.as_deref() == Some(role.as_str())
                    && match name {
                        None => true,
                        Some(name) if *exact => self.text == *name,
                        Some(name) => self.text.contains(name.as_str()),
                    }
            }
        }
    }
}

pub type Handler = Arc<dyn Fn(&mut FakeState) + Send + Sync>;

#[derive(Default)]
pub struct FakeState {
    pub url: String,
    pub elements: Vec<FakeElement>,
    pub click_handlers: HashMap<String, Handler>,
    /// Keyed by URL suffix
    pub navigate_handlers: Vec<(String, Handler)>,
    pub calls: Vec<String>,
    pub imported: Option<Value>,
    pub exported: Value,
    /// Result of `evaluate` (accessibility scans)
    pub evaluate_result: Value,
    pub viewport: Option<Viewport>,
    pub navigate_delay: Duration,
    /// Number of visibility polls that report false before an element shows
    pub reveal_after: HashMap<String, usize>,
    /// Elements whose next handle use fails as stale, once
    pub stale_once: HashSet<String>,
    pub closed: bool,
}

impl FakeState {
    pub fn new() -> Self {
        Self {
            url: "about:blank".to_string(),
            exported: json!({ "cookies": [{ "name": "JSESSIONID", "value": "fake" }] }),
            ..Self::default()
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn on_click<F>(mut self, id: &str, handler: F) -> Self
    where
        F: Fn(&mut FakeState) + Send + Sync + 'static,
    {
        self.click_handlers.insert(id.to_string(), Arc::new(handler));
        self
    }

    pub fn on_navigate<F>(mut self, suffix: &str, handler: F) -> Self
    where
        F: Fn(&mut FakeState) + Send + Sync + 'static,
    {
        self.navigate_handlers.push((suffix.to_string(), Arc::new(handler)));
        self
    }

    pub fn at(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn find(&self, id: &str) -> Option<&FakeElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut FakeElement> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub fn value_of(&self, id: &str) -> String {
        self.find(id).map(|e| e.value.clone()).unwrap_or_default()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn element(&mut self, element: &ElementRef) -> E2eResult<&mut FakeElement> {
        if self.stale_once.remove(&element.0) {
            return Err(E2eError::ElementNotFound(format!("stale element reference {}", element)));
        }
        self.find_mut(&element.0)
            .ok_or_else(|| E2eError::ElementNotFound(format!("stale element {}", element)))
    }
}

/// A page backed by shared `FakeState`
#[derive(Clone)]
pub struct FakePage {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        let delay = self.state.lock().navigate_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.calls.push(format!("navigate {}", url));
        state.url = url.to_string();
        let handlers: Vec<Handler> = state
            .navigate_handlers
            .iter()
            .filter(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&mut *state);
        }
        Ok(())
    }

    async fn current_url(&mut self) -> E2eResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>> {
        let state = self.state.lock();
        Ok(state
            .elements
            .iter()
            .filter(|e| e.matches(locator))
            .map(|e| ElementRef(e.id.clone()))
            .collect())
    }

    async fn is_visible(&mut self, element: &ElementRef) -> E2eResult<bool> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.reveal_after.get_mut(&element.0) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(false);
            }
        }
        Ok(state.element(element)?.visible)
    }

    async fn text(&mut self, element: &ElementRef) -> E2eResult<String> {
        Ok(self.state.lock().element(element)?.text.clone())
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        Ok(self.state.lock().element(element)?.attributes.get(name).cloned())
    }

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.element(element)?;
        state.calls.push(format!("click {}", element));
        if let Some(handler) = state.click_handlers.get(&element.0).cloned() {
            handler(&mut *state);
        }
        Ok(())
    }

    async fn fill(&mut self, element: &ElementRef, value: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.element(element)?.value = value.to_string();
        state.calls.push(format!("fill {} {}", element, value));
        Ok(())
    }

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.element(element)?.value.clear();
        state.calls.push(format!("clear {}", element));
        Ok(())
    }

    async fn select_option(&mut self, element: &ElementRef, option: &OptionChoice) -> E2eResult<()> {
        let mut state = self.state.lock();
        let target = state.element(element)?;
        let chosen = match option {
            OptionChoice::Index(i) => target.options.get(*i),
            OptionChoice::Value(v) => target.options.iter().find(|(value, _)| value == v),
            OptionChoice::Label(l) => target.options.iter().find(|(_, label)| label == l),
        }
        .map(|(value, _)| value.clone())
        .ok_or_else(|| E2eError::ElementNotFound(format!("option {:?}", option)))?;
        target.value = chosen.clone();
        state.calls.push(format!("select {} {}", element, chosen));
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.viewport = Some(viewport);
        state.calls.push(format!("viewport {}", viewport));
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> E2eResult<Value> {
        let mut state = self.state.lock();
        state.calls.push("evaluate".to_string());
        Ok(state.evaluate_result.clone())
    }

    async fn export_state(&mut self) -> E2eResult<Value> {
        let mut state = self.state.lock();
        state.calls.push("export".to_string());
        Ok(state.exported.clone())
    }

    async fn import_state(&mut self, imported: &Value) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.imported = Some(imported.clone());
        state.calls.push("import".to_string());
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.calls.push("close".to_string());
        Ok(())
    }
}

/// Opens a fresh `FakeState` per page and tracks concurrency
pub struct FakeFactory {
    build: Box<dyn Fn() -> FakeState + Send + Sync>,
    pub opened: AtomicUsize,
    active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub pages: Mutex<Vec<FakePage>>,
}

impl FakeFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn() -> FakeState + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
            opened: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            pages: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Page wrapper that maintains the factory's active count
struct TrackedPage {
    page: FakePage,
    active: Arc<AtomicUsize>,
    released: bool,
}

impl TrackedPage {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for TrackedPage {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl DriverFactory for FakeFactory {
    async fn open(&self, viewport: Viewport) -> E2eResult<Box<dyn PageDriver>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let mut state = (self.build)();
        state.viewport = Some(viewport);
        let page = FakePage::new(state);
        self.pages.lock().push(page.clone());

        Ok(Box::new(TrackedPage {
            page,
            active: Arc::clone(&self.active),
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[async_trait]
impl PageDriver for TrackedPage {
    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.page.navigate(url).await
    }
    async fn current_url(&mut self) -> E2eResult<String> {
        self.page.current_url().await
    }
    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>> {
        self.page.query(locator).await
    }
    async fn is_visible(&mut self, element: &ElementRef) -> E2eResult<bool> {
        self.page.is_visible(element).await
    }
    async fn text(&mut self, element: &ElementRef) -> E2eResult<String> {
        self.page.text(element).await
    }
    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>> {
        self.page.attribute(element, name).await
    }
    async fn click(&mut self, element: &ElementRef) -> E2eResult<()> {
        self.page.click(element).await
    }
    async fn fill(&mut self, element: &ElementRef, value: &str) -> E2eResult<()> {
        self.page.fill(element, value).await
    }
    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()> {
        self.page.clear(element).await
    }
    async fn select_option(&mut self, element: &ElementRef, option: &OptionChoice) -> E2eResult<()> {
        self.page.select_option(element, option).await
    }
    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()> {
        self.page.set_viewport(viewport).await
    }
    async fn evaluate(&mut self, script: &str) -> E2eResult<Value> {
        self.page.evaluate(script).await
    }
    async fn export_state(&mut self) -> E2eResult<Value> {
        self.page.export_state().await
    }
    async fn import_state(&mut self, state: &Value) -> E2eResult<()> {
        self.page.import_state(state).await
    }
    async fn close(&mut self) -> E2eResult<()> {
        let result = self.page.close().await;
        self.release();
        result
    }
}

/// Login page that accepts one username/password pair
pub fn login_page(username: &'static str, password: &'static str) -> FakeState {
    FakeState::new()
        .with(FakeElement::new("user", "input[name='username']"))
        .with(FakeElement::new("pass", "input[name='password']"))
        .with(FakeElement::new("submit", "input[value='Log In']"))
        .on_click("submit", move |state| {
            if state.value_of("user") == username && state.value_of("pass") == password {
                state.elements.push(FakeElement::new("welcome", "p.smallText").text("Welcome Alice Right"));
            } else {
                state.elements.push(FakeElement::new("error", "p.error").text(
                    "The username and password could not be verified.",
                ));
            }
        })
}
