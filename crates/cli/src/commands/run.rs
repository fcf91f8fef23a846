//! Run Command - executes the scenario suite against a live browser

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use uiflow_common::RunConfig;
use uiflow_e2e::{factory_for, target, DriverFactory, SuiteFilter, SuiteRunner};

use super::{load_suite, FilterArgs};
use crate::output::{print_report, OutputFormat};

/// How long the preflight waits for the target to answer
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Do not probe the base URL before starting
    #[arg(long)]
    pub skip_preflight: bool,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Passed,
    Failed,
}

pub async fn execute(args: RunArgs, config: RunConfig, format: OutputFormat) -> Result<RunOutcome> {
    let (groups, fixture) = load_suite(&config)?;

    let known = fixture.bindings().into_keys().collect();
    for group in &groups {
        if let Some((scenario, name)) = group.unbound_references(&known).into_iter().next() {
            bail!("{}: '{}' references unbound variable '{}'", group.name, scenario, name);
        }
    }

    if !args.skip_preflight {
        info!("Checking {} is reachable...", config.base_url);
        target::wait_for_reachable(&config.base_url, PREFLIGHT_TIMEOUT).await?;
    }

    let factory = factory_for(&config)?;
    info!("Using {} backend ({})", factory.name(), config.browser.as_str());

    let suite = SuiteRunner::from_config(&config, fixture, factory);
    let report = suite.run(&groups, &SuiteFilter::from(&args.filter)).await?;

    report.write(&config.output_dir)?;
    print_report(&report, format);

    Ok(if report.success() {
        RunOutcome::Passed
    } else {
        RunOutcome::Failed
    })
}
