//! List Command - shows the scenarios a run would execute

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use uiflow_common::RunConfig;
use uiflow_e2e::{ScenarioGroup, SuiteFilter};

use super::{load_suite, FilterArgs};
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
}

/// One selected scenario
#[derive(Debug, Serialize)]
pub struct ScenarioRow {
    pub group: String,
    pub scenario: String,
    pub tags: Vec<String>,
    pub credential: Option<String>,
    pub steps: usize,
    pub ends_session: bool,
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["Group", "Scenario", "Tags", "Credential", "Steps", "Ends Session"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.group.clone(),
            self.scenario.clone(),
            self.tags.join(", "),
            self.credential.clone().unwrap_or_else(|| "-".to_string()),
            self.steps.to_string(),
            if self.ends_session { "yes" } else { "" }.to_string(),
        ]
    }
}

/// Rows for every scenario the filter selects, in run order within each group
pub fn rows(groups: &[ScenarioGroup], filter: &SuiteFilter) -> Vec<ScenarioRow> {
    groups
        .iter()
        .flat_map(|group| {
            group
                .expand()
                .into_iter()
                .filter(|scenario| filter.matches(scenario))
                .map(move |scenario| ScenarioRow {
                    group: group.name.clone(),
                    steps: scenario.all_steps().count(),
                    scenario: scenario.name,
                    tags: scenario.tags,
                    credential: group.credential.clone(),
                    ends_session: scenario.ends_session,
                })
        })
        .collect()
}

pub fn execute(args: ListArgs, config: RunConfig, format: OutputFormat) -> Result<()> {
    let (groups, _) = load_suite(&config)?;
    print_list(&rows(&groups, &SuiteFilter::from(&args.filter)), format);
    Ok(())
}
