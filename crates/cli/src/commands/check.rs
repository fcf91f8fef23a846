//! Check Command - validates configuration, scenarios and fixture without a browser

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use uiflow_common::{Fixture, RunConfig};
use uiflow_e2e::{target, ScenarioGroup};

use super::load_suite;
use crate::output::{print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    /// Also probe the base URL
    #[arg(long)]
    pub preflight: bool,
}

/// Findings for one scenario group
#[derive(Debug, Serialize)]
pub struct GroupCheck {
    pub group: String,
    pub scenarios: usize,
    pub credential: Option<String>,
    pub problems: Vec<String>,
}

impl GroupCheck {
    pub fn ok(&self) -> bool {
        self.problems.is_empty()
    }
}

impl TableDisplay for GroupCheck {
    fn headers() -> Vec<&'static str> {
        vec!["Group", "Scenarios", "Credential", "Status"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.group.clone(),
            self.scenarios.to_string(),
            self.credential.clone().unwrap_or_else(|| "-".to_string()),
            if self.ok() {
                "✓ ok".to_string()
            } else {
                format!("✗ {}", self.problems.join("; "))
            },
        ]
    }
}

/// Cross-check each group against the fixture
pub fn check_groups(groups: &[ScenarioGroup], fixture: &Fixture) -> Vec<GroupCheck> {
    let known: BTreeSet<String> = fixture.bindings().into_keys().collect();

    groups
        .iter()
        .map(|group| {
            let mut problems = Vec::new();
            if let Some(identity) = &group.credential {
                if let Err(e) = fixture.credential(identity) {
                    problems.push(e.to_string());
                }
            }
            for (scenario, name) in group.unbound_references(&known) {
                problems.push(format!("{}: unbound '{}'", scenario, name));
            }
            GroupCheck {
                group: group.name.clone(),
                scenarios: group.scenarios.len(),
                credential: group.credential.clone(),
                problems,
            }
        })
        .collect()
}

/// Returns whether everything checked out
pub async fn execute(args: CheckArgs, config: RunConfig, format: OutputFormat) -> Result<bool> {
    let (groups, fixture) = load_suite(&config)?;
    let checks = check_groups(&groups, &fixture);
    print_list(&checks, format);

    let mut ok = checks.iter().all(GroupCheck::ok);

    if args.preflight {
        match target::wait_for_reachable(&config.base_url, Duration::from_secs(10)).await {
            Ok(()) => print_success(&format!("{} is reachable", config.base_url)),
            Err(e) => {
                print_warning(&e.to_string());
                ok = false;
            }
        }
    }

    if ok {
        print_success(&format!(
            "{} group(s), {} scenario(s) valid",
            checks.len(),
            checks.iter().map(|c| c.scenarios).sum::<usize>()
        ));
    }
    Ok(ok)
}
