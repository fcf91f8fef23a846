//! CLI Commands

pub mod check;
pub mod list;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use uiflow_common::{Backend, Browser, Fixture, RunConfig};
use uiflow_e2e::{ScenarioGroup, SuiteFilter};

/// Run configuration overrides; these win over the config file and environment
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Base URL of the application under test
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Automation backend (playwright, webdriver)
    #[arg(long, global = true)]
    pub backend: Option<Backend>,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long, global = true)]
    pub browser: Option<Browser>,

    /// Run the browser headless
    #[arg(long, global = true)]
    pub headless: Option<bool>,

    /// Scenarios running in parallel
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Per-step wait timeout in milliseconds
    #[arg(long, global = true)]
    pub step_timeout_ms: Option<u64>,

    /// Whole-run deadline in seconds
    #[arg(long, global = true)]
    pub run_timeout_secs: Option<u64>,

    /// Directory of scenario YAML files
    #[arg(long, global = true)]
    pub scenarios: Option<PathBuf>,

    /// Fixture JSON file
    #[arg(long, global = true)]
    pub fixture: Option<PathBuf>,

    /// Report output directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Fail scenarios on accessibility violations
    #[arg(long, global = true)]
    pub a11y_strict: Option<bool>,

    /// WebDriver endpoint
    #[arg(long, global = true)]
    pub webdriver_url: Option<String>,
}

impl ConfigArgs {
    /// Layer defaults, the optional config file, `UIFLOW_*` variables and flags
    pub fn resolve(&self, config_path: Option<&Path>) -> Result<RunConfig> {
        let mut config = match config_path {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RunConfig::default(),
        };
        config.apply_env()?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut RunConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(browser) = self.browser {
            config.browser = browser;
        }
        if let Some(headless) = self.headless {
            config.headless = headless;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(ms) = self.step_timeout_ms {
            config.step_timeout_ms = ms;
        }
        if let Some(secs) = self.run_timeout_secs {
            config.run_timeout_secs = secs;
        }
        if let Some(dir) = &self.scenarios {
            config.scenarios_dir = dir.clone();
        }
        if let Some(path) = &self.fixture {
            config.fixture_path = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(strict) = self.a11y_strict {
            config.a11y.strict = strict;
        }
        if let Some(url) = &self.webdriver_url {
            config.webdriver.url = url.clone();
        }
    }
}

/// Scenario selection
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only scenarios carrying this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Only scenarios whose name contains this (case-insensitive)
    #[arg(long)]
    pub name: Option<String>,
}

impl From<&FilterArgs> for SuiteFilter {
    fn from(args: &FilterArgs) -> Self {
        SuiteFilter {
            tag: args.tag.clone(),
            name: args.name.clone(),
        }
    }
}

/// Scenario groups and fixture named by the configuration
pub fn load_suite(config: &RunConfig) -> Result<(Vec<ScenarioGroup>, Fixture)> {
    let groups = ScenarioGroup::load_all(&config.scenarios_dir).with_context(|| {
        format!("Failed to load scenarios from {}", config.scenarios_dir.display())
    })?;
    let fixture = Fixture::from_file(&config.fixture_path)
        .with_context(|| format!("Failed to load fixture {}", config.fixture_path.display()))?;
    Ok((groups, fixture))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = ConfigArgs {
            base_url: Some("http://localhost:8080/parabank/".to_string()),
            backend: Some(Backend::Webdriver),
            workers: Some(4),
            a11y_strict: Some(true),
            ..ConfigArgs::default()
        };
        let mut config = RunConfig::default();
        args.apply(&mut config);

        assert_eq!(config.base_url, "http://localhost:8080/parabank/");
        assert_eq!(config.backend, Backend::Webdriver);
        assert_eq!(config.workers, 4);
        assert!(config.a11y.strict);
        assert_eq!(config.browser, Browser::Chromium);
    }

    #[test]
    fn test_resolve_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uiflow.toml");
        std::fs::write(&path, "workers = 3\nstep_timeout_ms = 2500\n").unwrap();

        let args = ConfigArgs {
            workers: Some(2),
            ..ConfigArgs::default()
        };
        let config = args.resolve(Some(&path)).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.step_timeout_ms, 2500);
    }

    #[test]
    fn test_resolve_rejects_zero_workers() {
        let args = ConfigArgs {
            workers: Some(0),
            ..ConfigArgs::default()
        };
        assert!(args.resolve(None).is_err());
    }
}
