//! Run configuration
//!
//! Layering is defaults, then an optional TOML file, then `UIFLOW_*`
//! environment variables. The CLI applies its flags last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Backend, Browser, Viewport};

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Browser automation backend
    pub backend: Backend,

    /// Browser engine
    pub browser: Browser,

    /// Run the browser without a window
    pub headless: bool,

    /// Default bound for every suspending step
    pub step_timeout_ms: u64,

    /// Wall-clock bound for the whole run
    pub run_timeout_secs: u64,

    /// Scenarios executed concurrently, each on its own page
    pub workers: usize,

    /// Default viewport for new pages
    pub viewport: Viewport,

    /// Directory of scenario group files
    pub scenarios_dir: PathBuf,

    /// Fixture JSON file
    pub fixture_path: PathBuf,

    /// Directory for run reports
    pub output_dir: PathBuf,

    pub login: LoginConfig,

    pub a11y: A11yConfig,

    pub playwright: PlaywrightSettings,

    pub webdriver: WebDriverSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "https://parabank.parasoft.com/parabank/".to_string(),
            backend: Backend::Playwright,
            browser: Browser::Chromium,
            headless: true,
            step_timeout_ms: 5000,
            run_timeout_secs: 600,
            workers: 1,
            viewport: Viewport::default(),
            scenarios_dir: PathBuf::from("scenarios"),
            fixture_path: PathBuf::from("fixtures/user.json"),
            output_dir: PathBuf::from("test-results"),
            login: LoginConfig::default(),
            a11y: A11yConfig::default(),
            playwright: PlaywrightSettings::default(),
            webdriver: WebDriverSettings::default(),
        }
    }
}

/// Form login flow used to establish sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Entry page, relative to the base URL
    pub entry_path: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// Text that proves the login succeeded; `${login.fullName}` is the
    /// credential's display name
    pub success_text: String,
    pub timeout_ms: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            entry_path: "index.htm".to_string(),
            username_selector: "input[name='username']".to_string(),
            password_selector: "input[name='password']".to_string(),
            submit_selector: "input[value='Log In']".to_string(),
            success_text: "Welcome ${login.fullName}".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Accessibility probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct A11yConfig {
    /// Fail scenarios on any violation instead of only logging them
    pub strict: bool,
    /// Where to load axe-core from when the page does not already have it
    pub axe_script_url: String,
}

impl Default for A11yConfig {
    fn default() -> Self {
        Self {
            strict: false,
            axe_script_url: "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.10.2/axe.min.js"
                .to_string(),
        }
    }
}

/// Node bridge settings for the Playwright backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightSettings {
    pub node_binary: PathBuf,
    /// `node_modules` directory that contains `playwright`
    pub node_modules: PathBuf,
}

impl Default for PlaywrightSettings {
    fn default() -> Self {
        Self {
            node_binary: PathBuf::from("node"),
            node_modules: PathBuf::from("node_modules"),
        }
    }
}

/// W3C WebDriver endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverSettings {
    pub url: String,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9515".to_string(),
        }
    }
}

impl RunConfig {
    /// Parse a configuration from TOML
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply `UIFLOW_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("UIFLOW_BASE_URL") {
            self.base_url = url;
        }
        if let Some(backend) = lookup("UIFLOW_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(headless) = lookup("UIFLOW_HEADLESS") {
            self.headless = parse_bool("UIFLOW_HEADLESS", &headless)?;
        }
        if let Some(url) = lookup("UIFLOW_WEBDRIVER_URL") {
            self.webdriver.url = url;
        }
        if let Some(strict) = lookup("UIFLOW_A11Y_STRICT") {
            self.a11y.strict = parse_bool("UIFLOW_A11Y_STRICT", &strict)?;
        }
        Ok(())
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base_url must be http(s): {}",
                self.base_url
            )));
        }
        if self.step_timeout_ms == 0 || self.login.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeouts must be non-zero".to_string()));
        }
        if self.run_timeout_secs == 0 {
            return Err(Error::InvalidConfig("run_timeout_secs must be non-zero".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// Resolve a path relative to the base URL
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Join a base URL and a relative path; absolute URLs pass through
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig(format!("{} must be a boolean, got '{}'", key, value))),
    }
}
