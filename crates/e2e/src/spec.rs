//! Declarative YAML scenario model
//!
//! One file holds one [`ScenarioGroup`]: scenarios that share setup steps
//! and, optionally, an authenticated session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use uiflow_common::{Viewport, ViewportPreset};

use crate::bindings;
use crate::error::{E2eError, E2eResult};

/// A set of scenarios sharing setup steps and a credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioGroup {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering; inherited by every scenario in the group
    #[serde(default)]
    pub tags: Vec<String>,

    /// Fixture identity whose session every scenario runs under
    #[serde(default)]
    pub credential: Option<String>,

    /// Initial viewport for each scenario page
    #[serde(default)]
    pub viewport: Option<ViewportSpec>,

    /// Steps run before each scenario, on the same page
    #[serde(default)]
    pub before_each: Vec<Step>,

    pub scenarios: Vec<Scenario>,
}

/// One end-to-end test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Human-readable identifier, e.g. "Test Case 12: ..."
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// The scenario terminates its session (logout); it is scheduled after
    /// every other scenario sharing the credential.
    #[serde(default)]
    pub ends_session: bool,

    pub steps: Vec<Step>,

    /// Group setup steps, filled in by [`ScenarioGroup::expand`]
    #[serde(skip)]
    pub setup: Vec<Step>,
}

/// Viewport given by preset name or explicit size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewportSpec {
    Preset(ViewportPreset),
    Size(Viewport),
}

impl ViewportSpec {
    pub fn viewport(self) -> Viewport {
        match self {
            ViewportSpec::Preset(preset) => preset.viewport(),
            ViewportSpec::Size(size) => size,
        }
    }
}

/// A single atomic interaction or assertion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Navigate to a URL (relative to the base URL)
    Navigate { url: String },

    /// Replace the value of an input
    Fill { target: Target, value: String },

    /// Empty an input
    Clear { target: Target },

    Click { target: Target },

    /// Choose an option of a `<select>`
    Select { target: Target, option: OptionChoice },

    /// Wait until the target resolves and is visible
    WaitForVisible {
        target: Target,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert the text content of an element
    AssertText {
        target: Target,
        expected: Expected,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert the current page URL
    AssertUrl {
        pattern: UrlPattern,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Assert how many elements a locator matches
    AssertCount {
        locator: Locator,
        predicate: CountPredicate,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Read a runtime value and bind it under a name
    Read { source: ReadSource, bind: String },

    SetViewport { viewport: ViewportSpec },

    /// Fixed delay (use sparingly)
    Pause { ms: u64 },

    /// Run the accessibility probe against the current page
    AccessibilityScan {
        /// Overrides the configured policy
        #[serde(default)]
        strict: Option<bool>,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

/// How to locate elements on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLocator", into = "RawLocator")]
pub enum Locator {
    /// CSS selector
    Css(String),
    /// Visible text (substring)
    Text(String),
    /// Accessible role with optional accessible name
    Role {
        role: String,
        name: Option<String>,
        exact: bool,
    },
}

/// Which of several matching elements a step acts on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    /// Exactly one element must match
    #[default]
    Only,
    First,
    Last,
    /// Zero-based position in document order
    Nth(usize),
    /// First match whose text contains the given string
    ByText(String),
}

/// Locator plus selection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub struct Target {
    pub locator: Locator,
    pub pick: Pick,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    exact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTarget {
    #[serde(flatten)]
    locator: RawLocator,
    #[serde(default)]
    pick: Pick,
}

impl TryFrom<RawLocator> for Locator {
    type Error = String;

    fn try_from(raw: RawLocator) -> Result<Self, String> {
        match (raw.css, raw.text, raw.role) {
            (Some(css), None, None) => Ok(Locator::Css(css)),
            (None, Some(text), None) => Ok(Locator::Text(text)),
            (None, None, Some(role)) => Ok(Locator::Role {
                role,
                name: raw.name,
                exact: raw.exact,
            }),
            (None, None, None) => Err("locator needs one of css, text, role".to_string()),
            _ => Err("locator takes exactly one of css, text, role".to_string()),
        }
    }
}

impl From<Locator> for RawLocator {
    fn from(locator: Locator) -> Self {
        match locator {
            Locator::Css(css) => RawLocator {
                css: Some(css),
                ..Default::default()
            },
            Locator::Text(text) => RawLocator {
                text: Some(text),
                ..Default::default()
            },
            Locator::Role { role, name, exact } => RawLocator {
                role: Some(role),
                name,
                exact,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<RawTarget> for Target {
    type Error = String;

    fn try_from(raw: RawTarget) -> Result<Self, String> {
        Ok(Target {
            locator: Locator::try_from(raw.locator)?,
            pick: raw.pick,
        })
    }
}

impl From<Target> for RawTarget {
    fn from(target: Target) -> Self {
        RawTarget {
            locator: target.locator.into(),
            pick: target.pick,
        }
    }
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text(text.into())
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name.into()),
            exact: false,
        }
    }

    /// Substitute bound variables into the selector strings
    pub fn render(&self, vars: &bindings::Bindings) -> E2eResult<Locator> {
        Ok(match self {
            Locator::Css(css) => Locator::Css(vars.render_literal(css)?),
            Locator::Text(text) => Locator::Text(vars.render_literal(text)?),
            Locator::Role { role, name, exact } => Locator::Role {
                role: role.clone(),
                name: name.as_deref().map(|n| vars.render_literal(n)).transpose()?,
                exact: *exact,
            },
        })
    }

    fn templates(&self) -> Vec<&str> {
        match self {
            Locator::Css(s) | Locator::Text(s) => vec![s.as_str()],
            Locator::Role { name, .. } => name.iter().map(String::as_str).collect(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "css={}", css),
            Locator::Text(text) => write!(f, "text={}", text),
            Locator::Role { role, name: Some(name), exact } => {
                write!(f, "role={}[name={:?}{}]", role, name, if *exact { ",exact" } else { "" })
            }
            Locator::Role { role, name: None, .. } => write!(f, "role={}", role),
        }
    }
}

impl Target {
    pub fn new(locator: Locator, pick: Pick) -> Self {
        Self { locator, pick }
    }

    pub fn only(locator: Locator) -> Self {
        Self::new(locator, Pick::Only)
    }

    /// Substitute bound variables into the locator and the picked text
    pub fn render(&self, vars: &bindings::Bindings) -> E2eResult<Target> {
        let pick = match &self.pick {
            Pick::ByText(text) => Pick::ByText(vars.render_literal(text)?),
            other => other.clone(),
        };
        Ok(Target::new(self.locator.render(vars)?, pick))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pick {
            Pick::Only => write!(f, "{}", self.locator),
            Pick::First => write!(f, "{}[first]", self.locator),
            Pick::Last => write!(f, "{}[last]", self.locator),
            Pick::Nth(n) => write!(f, "{}[nth={}]", self.locator, n),
            Pick::ByText(t) => write!(f, "{}[text={:?}]", self.locator, t),
        }
    }
}

/// Option of a `<select>` element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionChoice {
    Value(String),
    Index(usize),
    Label(String),
}

/// Expected text outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expected {
    /// Substring containment (whitespace-normalised)
    Contains(String),
    /// Full text equality (whitespace-normalised)
    Equals(String),
    /// Regular expression; `${var}` values are escaped, `${var|amount}`
    /// expands to the currency tolerance
    Matches(String),
}

/// Expected URL outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlPattern {
    Contains(String),
    Matches(String),
}

/// Threshold on a match count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPredicate {
    GreaterThan(usize),
    AtLeast(usize),
    Equals(usize),
}

/// Where a `read` step takes its value from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSource {
    /// The full current URL
    Url,
    /// One query parameter of the current URL
    UrlQuery(String),
    /// An attribute of an element
    Attribute { target: Target, name: String },
    /// The text content of an element
    Text { target: Target },
    /// The local date, shifted by `offset_days`
    Today {
        #[serde(default)]
        offset_days: i64,
        #[serde(default = "default_date_format")]
        format: String,
    },
}

fn default_date_format() -> String {
    "%m-%d-%Y".to_string()
}

impl Step {
    /// Short label used in logs and reports
    pub fn describe(&self) -> String {
        match self {
            Step::Navigate { url } => format!("navigate:{}", url),
            Step::Fill { target, .. } => format!("fill:{}", target),
            Step::Clear { target } => format!("clear:{}", target),
            Step::Click { target } => format!("click:{}", target),
            Step::Select { target, option } => format!("select:{}={:?}", target, option),
            Step::WaitForVisible { target, .. } => format!("wait_for_visible:{}", target),
            Step::AssertText { target, .. } => format!("assert_text:{}", target),
            Step::AssertUrl { pattern, .. } => format!("assert_url:{:?}", pattern),
            Step::AssertCount { locator, predicate, .. } => {
                format!("assert_count:{}:{:?}", locator, predicate)
            }
            Step::Read { bind, .. } => format!("read:{}", bind),
            Step::SetViewport { viewport } => format!("set_viewport:{}", viewport.viewport()),
            Step::Pause { ms } => format!("pause:{}ms", ms),
            Step::AccessibilityScan { .. } => "accessibility_scan".to_string(),
            Step::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    /// Name bound by this step, if any
    pub fn binds(&self) -> Option<&str> {
        match self {
            Step::Read { bind, .. } => Some(bind),
            _ => None,
        }
    }

    /// Every template string the step renders at run time
    pub fn templates(&self) -> Vec<&str> {
        fn target_templates<'a>(target: &'a Target, out: &mut Vec<&'a str>) {
            out.extend(target.locator.templates());
        }

        let mut out = Vec::new();
        match self {
            Step::Navigate { url } => out.push(url.as_str()),
            Step::Fill { target, value } => {
                target_templates(target, &mut out);
                out.push(value.as_str());
            }
            Step::Clear { target } | Step::Click { target } | Step::WaitForVisible { target, .. } => {
                target_templates(target, &mut out)
            }
            Step::Select { target, option } => {
                target_templates(target, &mut out);
                if let OptionChoice::Value(v) | OptionChoice::Label(v) = option {
                    out.push(v.as_str());
                }
            }
            Step::AssertText { target, expected, .. } => {
                target_templates(target, &mut out);
                match expected {
                    Expected::Contains(s) | Expected::Equals(s) | Expected::Matches(s) => {
                        out.push(s.as_str())
                    }
                }
            }
            Step::AssertUrl { pattern, .. } => match pattern {
                UrlPattern::Contains(s) | UrlPattern::Matches(s) => out.push(s.as_str()),
            },
            Step::AssertCount { locator, .. } => out.extend(locator.templates()),
            Step::Read { source, .. } => match source {
                ReadSource::Attribute { target, .. } | ReadSource::Text { target } => {
                    target_templates(target, &mut out)
                }
                ReadSource::Url | ReadSource::UrlQuery(_) | ReadSource::Today { .. } => {}
            },
            Step::Log { message } => out.push(message.as_str()),
            Step::SetViewport { .. } | Step::Pause { .. } | Step::AccessibilityScan { .. } => {}
        }
        out
    }
}

impl ScenarioGroup {
    /// Parse a scenario group from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let group: Self = serde_yaml::from_str(yaml)?;
        if group.scenarios.is_empty() {
            return Err(E2eError::SpecParse(format!("group '{}' has no scenarios", group.name)));
        }
        Ok(group)
    }

    /// Parse a scenario group from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenario groups from a directory, ordered by file name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut groups = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            groups.push(Self::from_file(entry.path())?);
        }

        Ok(groups)
    }

    /// Scenarios with group setup and tags folded in
    pub fn expand(&self) -> Vec<Scenario> {
        self.scenarios
            .iter()
            .map(|scenario| {
                let mut scenario = scenario.clone();
                scenario.setup = self.before_each.clone();
                for tag in &self.tags {
                    if !scenario.tags.contains(tag) {
                        scenario.tags.push(tag.clone());
                    }
                }
                scenario
            })
            .collect()
    }

    /// Template references that nothing binds.
    ///
    /// `known` holds names bound before any step runs (fixture values).
    /// Reads bind names for the steps after them in the same scenario.
    pub fn unbound_references(&self, known: &BTreeSet<String>) -> Vec<(String, String)> {
        let mut problems = Vec::new();
        for scenario in &self.scenarios {
            let mut bound = known.clone();
            for step in self.before_each.iter().chain(&scenario.steps) {
                for template in step.templates() {
                    match bindings::references(template) {
                        Ok(names) => {
                            for name in names {
                                if !bound.contains(&name) {
                                    problems.push((scenario.name.clone(), name));
                                }
                            }
                        }
                        Err(e) => problems.push((scenario.name.clone(), e.to_string())),
                    }
                }
                if let Some(name) = step.binds() {
                    bound.insert(name.to_string());
                }
            }
        }
        problems
    }
}

impl Scenario {
    /// Setup steps followed by the scenario's own steps
    pub fn all_steps(&self) -> impl Iterator<Item = &Step> {
        self.setup.iter().chain(self.steps.iter())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group() {
        let yaml = r##"
name: Find Transactions Tests
credential: validUser
tags: [transactions]
before_each:
  - action: navigate
    url: index.htm
  - action: click
    target: { role: link, name: Find Transactions }
scenarios:
  - name: "Test Case 16: Validate Incorrect Search For Transaction By ID"
    steps:
      - action: fill
        target: { css: "#transactionId" }
        value: qwerty
      - action: click
        target: { css: "#findById" }
      - action: assert_text
        target: { css: "#transactionIdError" }
        expected: { contains: Invalid transaction ID }
"##;
        let group = ScenarioGroup::from_yaml(yaml).unwrap();
        assert_eq!(group.credential.as_deref(), Some("validUser"));
        assert_eq!(group.before_each.len(), 2);
        assert_eq!(group.scenarios[0].steps.len(), 3);
        match &group.before_each[1] {
            Step::Click { target } => {
                assert_eq!(target.locator, Locator::role("link", "Find Transactions"));
                assert_eq!(target.pick, Pick::Only);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_pick_policies() {
        let yaml = r##"
name: picks
scenarios:
  - name: picks
    steps:
      - action: click
        target: { text: Funds Transfer Sent, pick: first }
      - action: read
        source:
          attribute:
            target: { css: "#toAccountId option", pick: last }
            name: value
        bind: to
      - action: click
        target: { css: "tr", pick: { nth: 2 } }
      - action: select
        target: { css: "#type" }
        option: { value: CHECKING }
      - action: select
        target: { css: "#fromAccountId" }
        option: { index: 0 }
"##;
        let group = ScenarioGroup::from_yaml(yaml).unwrap();
        let steps = &group.scenarios[0].steps;
        assert!(matches!(&steps[0], Step::Click { target } if target.pick == Pick::First));
        match &steps[1] {
            Step::Read { source: ReadSource::Attribute { target, name }, bind } => {
                assert_eq!(target.pick, Pick::Last);
                assert_eq!(name, "value");
                assert_eq!(bind, "to");
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(matches!(&steps[2], Step::Click { target } if target.pick == Pick::Nth(2)));
        assert!(matches!(&steps[4], Step::Select { option: OptionChoice::Index(0), .. }));
    }

    #[test]
    fn test_locator_requires_exactly_one_kind() {
        let yaml = r##"
name: bad
scenarios:
  - name: bad
    steps:
      - action: click
        target: { css: "#a", text: "b" }
"##;
        assert!(ScenarioGroup::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(ScenarioGroup::from_yaml("name: empty\nscenarios: []\n").is_err());
    }

    #[test]
    fn test_viewport_spec_forms() {
        let preset: ViewportSpec = serde_yaml::from_str("mobile").unwrap();
        assert_eq!(preset.viewport(), Viewport::new(375, 667));
        let size: ViewportSpec = serde_yaml::from_str("{ width: 800, height: 600 }").unwrap();
        assert_eq!(size.viewport(), Viewport::new(800, 600));
    }

    #[test]
    fn test_read_today_defaults() {
        let step: Step =
            serde_yaml::from_str("action: read\nsource: { today: {} }\nbind: today\n").unwrap();
        let Step::Read { source, .. } = step else {
            panic!("expected a read step");
        };
        assert_eq!(
            source,
            ReadSource::Today {
                offset_days: 0,
                format: "%m-%d-%Y".to_string()
            }
        );
    }

    #[test]
    fn test_expand_folds_setup_and_tags() {
        let yaml = r#"
name: g
tags: [smoke]
before_each:
  - action: navigate
    url: index.htm
scenarios:
  - name: one
    steps:
      - action: log
        message: hi
"#;
        let group = ScenarioGroup::from_yaml(yaml).unwrap();
        let expanded = group.expand();
        assert_eq!(expanded[0].setup.len(), 1);
        assert_eq!(expanded[0].all_steps().count(), 2);
        assert!(expanded[0].has_tag("smoke"));
    }

    #[test]
    fn test_unbound_references_respect_step_order() {
        let yaml = r##"
name: g
scenarios:
  - name: uses before bind
    steps:
      - action: fill
        target: { css: "#transactionId" }
        value: "${transactionId}"
      - action: read
        source: { url_query: id }
        bind: transactionId
  - name: binds first
    steps:
      - action: read
        source: { url_query: id }
        bind: transactionId
      - action: fill
        target: { css: "#transactionId" }
        value: "${transactionId} ${validUser.username}"
"##;
        let group = ScenarioGroup::from_yaml(yaml).unwrap();
        let known: BTreeSet<String> = ["validUser.username".to_string()].into_iter().collect();
        let problems = group.unbound_references(&known);
        assert_eq!(
            problems,
            vec![("uses before bind".to_string(), "transactionId".to_string())]
        );
    }

    #[test]
    fn test_target_display() {
        let target = Target::new(Locator::css("#fromAccountId option"), Pick::First);
        assert_eq!(target.to_string(), "css=#fromAccountId option[first]");
    }
}
