//! Suite runner: schedules scenario groups across isolated pages

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout_at;
use tracing::{debug, error, info};

use uiflow_common::{Credential, Fixture, RunConfig, Viewport};

use crate::a11y::{AccessibilityPolicy, AccessibilityProbe};
use crate::bindings::Bindings;
use crate::driver::DriverFactory;
use crate::error::{E2eError, E2eResult};
use crate::runner::{ScenarioResult, ScenarioRunner, ScenarioStatus};
use crate::session::{FormLogin, SessionCache};
use crate::spec::{Scenario, ScenarioGroup};

/// Selects which scenarios run
#[derive(Debug, Clone, Default)]
pub struct SuiteFilter {
    pub tag: Option<String>,
    /// Case-insensitive substring of the scenario name
    pub name: Option<String>,
}

impl SuiteFilter {
    pub fn matches(&self, scenario: &Scenario) -> bool {
        if let Some(tag) = &self.tag {
            if !scenario.has_tag(tag) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !scenario.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// One scheduled scenario
#[derive(Debug, Clone)]
pub struct Job {
    pub group: String,
    pub scenario: Scenario,
    pub credential: Option<Credential>,
    pub viewport: Viewport,
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn from_results(results: Vec<ScenarioResult>, duration: Duration) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            passed: count(ScenarioStatus::Passed),
            failed: count(ScenarioStatus::Failed),
            aborted: count(ScenarioStatus::Aborted),
            duration_ms: duration.as_millis() as u64,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.passed == self.total
    }

    /// Write the report as `suite-report.json` under `output_dir`
    pub fn write(&self, output_dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("suite-report.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

struct Shared {
    factory: Arc<dyn DriverFactory>,
    runner: ScenarioRunner,
    sessions: Arc<SessionCache>,
}

pub struct SuiteRunner {
    shared: Arc<Shared>,
    fixture: Fixture,
    workers: usize,
    run_timeout: Duration,
    viewport: Viewport,
}

impl SuiteRunner {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        runner: ScenarioRunner,
        sessions: Arc<SessionCache>,
        fixture: Fixture,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                runner,
                sessions,
            }),
            fixture,
            workers: 1,
            run_timeout: Duration::from_secs(600),
            viewport: Viewport::default(),
        }
    }

    /// Wire a runner, form login and session cache from configuration
    pub fn from_config(config: &RunConfig, fixture: Fixture, factory: Arc<dyn DriverFactory>) -> Self {
        let runner = ScenarioRunner::new(
            config.base_url.clone(),
            config.step_timeout(),
            AccessibilityProbe::new(config.a11y.axe_script_url.clone()),
        )
        .with_a11y_policy(AccessibilityPolicy::from_strict(config.a11y.strict))
        .with_globals(Bindings::from(fixture.bindings()));

        let login = FormLogin::new(
            Arc::clone(&factory),
            runner.clone(),
            config.login.clone(),
            config.viewport,
        );
        let sessions = Arc::new(SessionCache::new(Arc::new(login)));

        Self::new(factory, runner, sessions, fixture)
            .with_workers(config.workers)
            .with_run_timeout(config.run_timeout())
            .with_viewport(config.viewport)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.shared.sessions
    }

    /// Expand groups into jobs, resolving credentials up front
    pub fn plan(&self, groups: &[ScenarioGroup], filter: &SuiteFilter) -> E2eResult<Vec<Job>> {
        let mut jobs = Vec::new();
        for group in groups {
            let credential = match &group.credential {
                Some(identity) => Some(self.fixture.credential(identity)?),
                None => None,
            };
            let viewport = group.viewport.map(|v| v.viewport()).unwrap_or(self.viewport);

            jobs.extend(
                group
                    .expand()
                    .into_iter()
                    .filter(|scenario| filter.matches(scenario))
                    .map(|scenario| Job {
                        group: group.name.clone(),
                        scenario,
                        credential: credential.clone(),
                        viewport,
                    }),
            );
        }
        Ok(jobs)
    }

    /// Run every selected scenario.
    ///
    /// Scenarios that end their session run after all others, one at a
    /// time, and drop the cached session when they finish. Anything not
    /// finished by the run deadline is reported as aborted.
    pub async fn run(&self, groups: &[ScenarioGroup], filter: &SuiteFilter) -> E2eResult<SuiteReport> {
        let jobs = self.plan(groups, filter)?;
        Ok(self.run_jobs(jobs).await)
    }

    pub async fn run_jobs(&self, jobs: Vec<Job>) -> SuiteReport {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.run_timeout;

        info!("Running {} scenario(s) with {} worker(s)...", jobs.len(), self.workers);

        let (closing, regular): (Vec<Job>, Vec<Job>) =
            jobs.into_iter().partition(|job| job.scenario.ends_session);

        let mut results = self.run_phase(regular, self.workers, deadline).await;
        results.extend(self.run_phase(closing, 1, deadline).await);

        let report = SuiteReport::from_results(results, start.elapsed());
        info!("");
        info!(
            "Scenario Results: {} passed, {} failed, {} aborted ({} ms)",
            report.passed, report.failed, report.aborted, report.duration_ms
        );
        report
    }

    async fn run_phase(
        &self,
        jobs: Vec<Job>,
        workers: usize,
        deadline: tokio::time::Instant,
    ) -> Vec<ScenarioResult> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let shared = Arc::clone(&self.shared);
            let semaphore = Arc::clone(&semaphore);
            let name = job.scenario.name.clone();
            let group = job.group.clone();

            let (job_name, job_group) = (name.clone(), group.clone());

            let handle = tokio::spawn(async move {
                let guarded = async {
                    let _permit = semaphore.acquire_owned().await;
                    execute(&shared, job).await
                };
                match timeout_at(deadline, guarded).await {
                    Ok(result) => result,
                    Err(_) => ScenarioResult::aborted(&job_name, &job_group, "run deadline exceeded"),
                }
            });
            handles.push((name, group, handle));
        }

        let results = join_all(handles.into_iter().map(|(name, group, handle)| async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => ScenarioResult::not_started(&name, &group, &E2eError::Driver(e.to_string())),
            }
        }))
        .await;

        for result in &results {
            match result.status {
                ScenarioStatus::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
                ScenarioStatus::Failed => error!(
                    "✗ {} - {}",
                    result.name,
                    result.reason.as_deref().unwrap_or("unknown error")
                ),
                ScenarioStatus::Aborted => error!("✗ {} - aborted", result.name),
            }
        }
        results
    }
}

async fn execute(shared: &Shared, job: Job) -> ScenarioResult {
    let Job {
        group,
        scenario,
        credential,
        viewport,
    } = job;

    let session = match &credential {
        Some(credential) => match shared.sessions.get_or_create(credential).await {
            Ok(session) => Some(session),
            Err(e) => return ScenarioResult::not_started(&scenario.name, &group, &e),
        },
        None => None,
    };

    let mut page = match shared.factory.open(viewport).await {
        Ok(page) => page,
        Err(e) => return ScenarioResult::not_started(&scenario.name, &group, &e),
    };

    let result = shared
        .runner
        .run(&group, &scenario, session.as_deref(), page.as_mut())
        .await;

    if let Err(e) = page.close().await {
        debug!("Failed to close page for {}: {}", scenario.name, e);
    }

    if scenario.ends_session {
        if let Some(credential) = &credential {
            shared.sessions.invalidate(credential);
        }
    }
    result
}
