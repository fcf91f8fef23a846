//! Scenario runner: executes steps in order against one page

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info};

use uiflow_common::config::join_url;

use crate::a11y::{self, AccessibilityPolicy, AccessibilityProbe, Violation};
use crate::assert::{self, TextMatcher, UrlMatcher};
use crate::bindings::Bindings;
use crate::driver::{ElementRef, PageDriver};
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::session::Session;
use crate::spec::{OptionChoice, Pick, ReadSource, Scenario, Step, Target};

/// Interval between polls of a suspended step
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Final state of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Cut short by the run-level deadline
    Aborted,
}

/// Whether a step came from group setup or the scenario body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Body,
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub phase: Phase,
    pub step_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// The step that stopped a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    /// Zero-based index across setup and body steps
    pub index: usize,
    pub phase: Phase,
    pub description: String,
}

/// Result of running one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub group: String,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub failed_step: Option<FailedStep>,
    pub failure_kind: Option<FailureKind>,
    pub reason: Option<String>,
    pub expected: Option<String>,
    pub observed: Option<String>,
    /// Violations recorded under the log-only policy
    pub violations: Vec<Violation>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// A scenario that failed before its first step (no session, no page)
    pub fn not_started(name: &str, group: &str, error: &E2eError) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            status: ScenarioStatus::Failed,
            duration_ms: 0,
            steps: Vec::new(),
            failed_step: None,
            failure_kind: Some(error.kind()),
            reason: Some(error.to_string()),
            expected: None,
            observed: None,
            violations: Vec::new(),
        }
    }

    pub fn aborted(name: &str, group: &str, reason: impl Into<String>) -> Self {
        Self {
            status: ScenarioStatus::Aborted,
            failure_kind: Some(FailureKind::Aborted),
            reason: Some(reason.into()),
            ..Self::not_started(name, group, &E2eError::Aborted(String::new()))
        }
    }
}

/// Executes scenarios step by step
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    base_url: String,
    step_timeout: Duration,
    a11y_policy: AccessibilityPolicy,
    probe: AccessibilityProbe,
    /// Values visible to every scenario (fixture data)
    globals: Bindings,
}

impl ScenarioRunner {
    pub fn new(base_url: impl Into<String>, step_timeout: Duration, probe: AccessibilityProbe) -> Self {
        Self {
            base_url: base_url.into(),
            step_timeout,
            a11y_policy: AccessibilityPolicy::LogOnly,
            probe,
            globals: Bindings::new(),
        }
    }

    pub fn with_globals(mut self, globals: Bindings) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_a11y_policy(mut self, policy: AccessibilityPolicy) -> Self {
        self.a11y_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn globals(&self) -> &Bindings {
        &self.globals
    }

    /// Run a scenario, optionally on an established session.
    ///
    /// Steps run strictly in declared order. The first failing step stops
    /// the scenario; nothing after it executes.
    pub async fn run(
        &self,
        group: &str,
        scenario: &Scenario,
        session: Option<&Session>,
        page: &mut dyn PageDriver,
    ) -> ScenarioResult {
        self.run_with(group, scenario, session, page, self.globals.clone()).await
    }

    /// Like [`ScenarioRunner::run`], with extra caller-provided bindings
    pub async fn run_with(
        &self,
        group: &str,
        scenario: &Scenario,
        session: Option<&Session>,
        page: &mut dyn PageDriver,
        mut vars: Bindings,
    ) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let mut result = ScenarioResult {
            name: scenario.name.clone(),
            group: group.to_string(),
            status: ScenarioStatus::Passed,
            duration_ms: 0,
            steps: Vec::new(),
            failed_step: None,
            failure_kind: None,
            reason: None,
            expected: None,
            observed: None,
            violations: Vec::new(),
        };

        if let Some(session) = session {
            if let Err(e) = page.import_state(&session.state).await {
                let mut failed = ScenarioResult::not_started(&scenario.name, group, &e);
                failed.duration_ms = start.elapsed().as_millis() as u64;
                return failed;
            }
        }

        let steps = scenario
            .setup
            .iter()
            .map(|s| (Phase::Setup, s))
            .chain(scenario.steps.iter().map(|s| (Phase::Body, s)));

        for (index, (phase, step)) in steps.enumerate() {
            let step_name = step.describe();
            let step_start = Instant::now();
            debug!("Executing step {}: {}", index, step_name);

            let outcome = self
                .execute_step(step, page, &mut vars, &mut result.violations)
                .await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => result.steps.push(StepResult {
                    index,
                    phase,
                    step_name,
                    success: true,
                    duration_ms,
                    error: None,
                }),
                Err(e) => {
                    result.steps.push(StepResult {
                        index,
                        phase,
                        step_name: step_name.clone(),
                        success: false,
                        duration_ms,
                        error: Some(e.to_string()),
                    });
                    result.status = ScenarioStatus::Failed;
                    result.failed_step = Some(FailedStep {
                        index,
                        phase,
                        description: step_name,
                    });
                    result.failure_kind = Some(e.kind());
                    if let Some((expected, observed)) = e.expected_observed() {
                        result.expected = Some(expected.to_string());
                        result.observed = Some(observed.to_string());
                    }
                    result.reason = Some(e.to_string());
                    break; // Stop on first failure
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Execute one step against the page
    pub async fn execute_step(
        &self,
        step: &Step,
        page: &mut dyn PageDriver,
        vars: &mut Bindings,
        violations: &mut Vec<Violation>,
    ) -> E2eResult<()> {
        match step {
            Step::Navigate { url } => {
                let url = join_url(&self.base_url, &vars.render_literal(url)?);
                page.navigate(&url).await
            }
            Step::Fill { target, value } => {
                let value = vars.render_literal(value)?;
                let element = resolve(page, target, vars).await?;
                page.fill(&element, &value).await
            }
            Step::Clear { target } => {
                let element = resolve(page, target, vars).await?;
                page.clear(&element).await
            }
            Step::Click { target } => {
                let element = resolve(page, target, vars).await?;
                page.click(&element).await
            }
            Step::Select { target, option } => {
                let option = match option {
                    OptionChoice::Value(v) => OptionChoice::Value(vars.render_literal(v)?),
                    OptionChoice::Label(l) => OptionChoice::Label(vars.render_literal(l)?),
                    OptionChoice::Index(i) => OptionChoice::Index(*i),
                };
                let element = resolve(page, target, vars).await?;
                page.select_option(&element, &option).await
            }
            Step::WaitForVisible { target, timeout_ms } => {
                self.wait_for_visible(page, target, vars, self.timeout(*timeout_ms))
                    .await
                    .map(|_| ())
            }
            Step::AssertText {
                target,
                expected,
                timeout_ms,
            } => {
                let matcher = TextMatcher::compile(expected, vars)?;
                self.poll_text(page, target, vars, &matcher, self.timeout(*timeout_ms))
                    .await
            }
            Step::AssertUrl { pattern, timeout_ms } => {
                let matcher = UrlMatcher::compile(pattern, vars)?;
                let deadline = Instant::now() + self.timeout(*timeout_ms);
                loop {
                    let url = page.current_url().await?;
                    match assert::assert_url(&url, &matcher) {
                        Ok(()) => return Ok(()),
                        Err(e) if Instant::now() >= deadline => return Err(e),
                        Err(_) => sleep(POLL_INTERVAL).await,
                    }
                }
            }
            Step::AssertCount {
                locator,
                predicate,
                timeout_ms,
            } => {
                let locator = locator.render(vars)?;
                let deadline = Instant::now() + self.timeout(*timeout_ms);
                loop {
                    let count = page.query(&locator).await?.len();
                    match assert::assert_count(count, *predicate) {
                        Ok(()) => return Ok(()),
                        Err(e) if Instant::now() >= deadline => return Err(e),
                        Err(_) => sleep(POLL_INTERVAL).await,
                    }
                }
            }
            Step::Read { source, bind } => {
                let value = self.read(page, source, vars).await?;
                debug!("Bound {} = {}", bind, value);
                vars.bind(bind.clone(), value);
                Ok(())
            }
            Step::SetViewport { viewport } => page.set_viewport(viewport.viewport()).await,
            Step::Pause { ms } => {
                sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Step::AccessibilityScan { strict } => {
                let policy = strict
                    .map(AccessibilityPolicy::from_strict)
                    .unwrap_or(self.a11y_policy);
                let found = self.probe.scan(page).await?;
                a11y::enforce(policy, &found)?;
                violations.extend(found);
                Ok(())
            }
            Step::Log { message } => {
                info!("[SCENARIO LOG] {}", vars.render_literal(message)?);
                Ok(())
            }
        }
    }

    fn timeout(&self, override_ms: Option<u64>) -> Duration {
        override_ms.map(Duration::from_millis).unwrap_or(self.step_timeout)
    }

    /// Poll until the target resolves to a visible element.
    ///
    /// Elements that are absent or hidden are retried until the deadline;
    /// an ambiguous match fails at once.
    pub async fn wait_for_visible(
        &self,
        page: &mut dyn PageDriver,
        target: &Target,
        vars: &Bindings,
        timeout: Duration,
    ) -> E2eResult<ElementRef> {
        let deadline = Instant::now() + timeout;
        loop {
            match resolve(page, target, vars).await {
                // A handle can go stale between lookup and use while the page re-renders
                Ok(element) => match page.is_visible(&element).await {
                    Ok(true) => return Ok(element),
                    Ok(false) | Err(E2eError::ElementNotFound(_)) => {}
                    Err(e) => return Err(e),
                },
                Err(E2eError::ElementNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(E2eError::timeout(
                    format!("{} to be visible", target.render(vars)?),
                    timeout,
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn poll_text(
        &self,
        page: &mut dyn PageDriver,
        target: &Target,
        vars: &Bindings,
        matcher: &TextMatcher,
        timeout: Duration,
    ) -> E2eResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let last = match resolve(page, target, vars).await {
                Ok(element) => match page.text(&element).await {
                    Ok(text) => match assert::assert_text(&text, matcher) {
                        Ok(()) => return Ok(()),
                        Err(e) => e,
                    },
                    Err(e @ E2eError::ElementNotFound(_)) => e,
                    Err(e) => return Err(e),
                },
                Err(e @ E2eError::ElementNotFound(_)) => e,
                Err(e) => return Err(e),
            };
            if Instant::now() >= deadline {
                // Awaited absence is a timeout; text that never matched stays a mismatch
                return Err(match last {
                    E2eError::ElementNotFound(_) => {
                        E2eError::timeout(format!("{} to exist", target.render(vars)?), timeout)
                    }
                    other => other,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn read(
        &self,
        page: &mut dyn PageDriver,
        source: &ReadSource,
        vars: &Bindings,
    ) -> E2eResult<String> {
        match source {
            ReadSource::Url => page.current_url().await,
            ReadSource::UrlQuery(param) => {
                let url = page.current_url().await?;
                query_param(&url, param).ok_or_else(|| {
                    E2eError::ElementNotFound(format!("query parameter '{}' in {}", param, url))
                })
            }
            ReadSource::Attribute { target, name } => {
                let element = resolve(page, target, vars).await?;
                page.attribute(&element, name).await?.ok_or_else(|| {
                    E2eError::ElementNotFound(format!("attribute '{}' on {}", name, target))
                })
            }
            ReadSource::Text { target } => {
                let element = resolve(page, target, vars).await?;
                Ok(assert::normalize_whitespace(&page.text(&element).await?))
            }
            ReadSource::Today {
                offset_days,
                format,
            } => Ok(format_date(Local::now().date_naive(), *offset_days, format)),
        }
    }
}

/// Resolve a target to one element under its selection policy.
///
/// Resolution is immediate: zero matches is `ElementNotFound`.
pub async fn resolve(
    page: &mut dyn PageDriver,
    target: &Target,
    vars: &Bindings,
) -> E2eResult<ElementRef> {
    let target = &target.render(vars)?;
    let mut matches = page.query(&target.locator).await?;
    let not_found = || E2eError::ElementNotFound(target.to_string());

    match &target.pick {
        Pick::Only => match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches.remove(0)),
            count => Err(E2eError::AmbiguousTarget {
                target: target.to_string(),
                count,
            }),
        },
        Pick::First => matches.into_iter().next().ok_or_else(not_found),
        Pick::Last => matches.pop().ok_or_else(not_found),
        Pick::Nth(n) => {
            if *n < matches.len() {
                Ok(matches.swap_remove(*n))
            } else {
                Err(E2eError::ElementNotFound(format!(
                    "{} (only {} match(es))",
                    target,
                    matches.len()
                )))
            }
        }
        Pick::ByText(wanted) => {
            for element in matches {
                if page.text(&element).await?.contains(wanted.as_str()) {
                    return Ok(element);
                }
            }
            Err(not_found())
        }
    }
}

/// Format `date + offset_days` with a strftime pattern
pub fn format_date(date: NaiveDate, offset_days: i64, format: &str) -> String {
    let shifted = date
        .checked_add_signed(chrono::Duration::days(offset_days))
        .unwrap_or(date);
    shifted.format(format).to_string()
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned());
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, "%m-%d-%Y", "10-17-2026")]
    #[test_case(-3, "%m-%d-%Y", "10-14-2026")]
    #[test_case(-17, "%m-%d-%Y", "09-30-2026")]
    #[test_case(0, "%Y-%m-%d", "2026-10-17")]
    fn test_format_date(offset: i64, format: &str, expected: &str) {
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(format_date(date, offset, format), expected);
    }

    #[test]
    fn test_query_param() {
        let url = "https://parabank.parasoft.com/parabank/transaction.htm?id=14476";
        assert_eq!(query_param(url, "id").as_deref(), Some("14476"));
        assert_eq!(query_param(url, "missing"), None);
        assert_eq!(query_param("not a url", "id"), None);
    }

    #[test]
    fn test_aborted_result() {
        let result = ScenarioResult::aborted("Test Case 1", "Register", "run deadline exceeded");
        assert_eq!(result.status, ScenarioStatus::Aborted);
        assert_eq!(result.failure_kind, Some(FailureKind::Aborted));
        assert_eq!(result.reason.as_deref(), Some("run deadline exceeded"));
    }
}
