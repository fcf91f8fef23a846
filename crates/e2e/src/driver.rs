//! Browser backend abstraction
//!
//! Adapters expose raw page operations only. Waiting, selection policy,
//! templating, and assertions belong to the scenario runner, so every
//! backend observes the same semantics.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use uiflow_common::{Backend, RunConfig, Viewport};

use crate::error::E2eResult;
use crate::playwright::{PlaywrightConfig, PlaywrightFactory};
use crate::spec::{Locator, OptionChoice};
use crate::webdriver::{WebDriverConfig, WebDriverFactory};

/// Opaque handle to an element, valid until the page navigates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live page in an isolated browser context
#[async_trait]
pub trait PageDriver: Send {
    /// Load a URL and wait for the page to finish loading
    async fn navigate(&mut self, url: &str) -> E2eResult<()>;

    async fn current_url(&mut self) -> E2eResult<String>;

    /// All elements matching the locator, in document order
    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementRef>>;

    async fn is_visible(&mut self, element: &ElementRef) -> E2eResult<bool>;

    /// Rendered text of the element
    async fn text(&mut self, element: &ElementRef) -> E2eResult<String>;

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> E2eResult<Option<String>>;

    async fn click(&mut self, element: &ElementRef) -> E2eResult<()>;

    /// Replace the element's value
    async fn fill(&mut self, element: &ElementRef, value: &str) -> E2eResult<()>;

    async fn clear(&mut self, element: &ElementRef) -> E2eResult<()>;

    async fn select_option(&mut self, element: &ElementRef, option: &OptionChoice) -> E2eResult<()>;

    async fn set_viewport(&mut self, viewport: Viewport) -> E2eResult<()>;

    /// Evaluate the body of an async JavaScript function in the page
    async fn evaluate(&mut self, script: &str) -> E2eResult<Value>;

    /// Snapshot authenticated browser state (cookies, storage)
    async fn export_state(&mut self) -> E2eResult<Value>;

    /// Restore state captured by [`PageDriver::export_state`]
    async fn import_state(&mut self, state: &Value) -> E2eResult<()>;

    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens pages for one backend
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self, viewport: Viewport) -> E2eResult<Box<dyn PageDriver>>;

    fn name(&self) -> &str;
}

/// Build the factory selected by the run configuration
pub fn factory_for(config: &RunConfig) -> E2eResult<Arc<dyn DriverFactory>> {
    Ok(match config.backend {
        Backend::Playwright => {
            Arc::new(PlaywrightFactory::new(PlaywrightConfig::from_run_config(config))?)
        }
        Backend::Webdriver => Arc::new(WebDriverFactory::new(WebDriverConfig::from_run_config(config))?),
    })
}
