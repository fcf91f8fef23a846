//! Accessibility probe backed by axe-core

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};

/// A reported non-conformance for the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
    /// Number of offending nodes
    #[serde(default)]
    pub nodes: usize,
}

/// What to do with violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessibilityPolicy {
    /// Any violation fails the scenario
    Strict,
    /// Violations are logged and recorded only
    LogOnly,
}

impl AccessibilityPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            AccessibilityPolicy::Strict
        } else {
            AccessibilityPolicy::LogOnly
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessibilityProbe {
    axe_script_url: String,
}

impl AccessibilityProbe {
    pub fn new(axe_script_url: impl Into<String>) -> Self {
        Self {
            axe_script_url: axe_script_url.into(),
        }
    }

    /// Audit the current page. The page state is not modified apart from
    /// injecting axe-core when it is missing.
    pub async fn scan(&self, page: &mut dyn PageDriver) -> E2eResult<Vec<Violation>> {
        let result = page.evaluate(&self.script()).await?;
        parse_violations(result)
    }

    fn script(&self) -> String {
        format!(
            r#"
if (!window.axe) {{
  await new Promise((resolve, reject) => {{
    const s = document.createElement('script');
    s.src = {url};
    s.onload = resolve;
    s.onerror = () => reject(new Error('failed to load axe-core'));
    document.head.appendChild(s);
  }});
}}
const results = await window.axe.run(document);
return results.violations.map(v => ({{
  id: v.id,
  description: v.description,
  impact: v.impact,
  help: v.help,
  nodes: v.nodes.length
}}));
"#,
            url = serde_json::to_string(&self.axe_script_url).unwrap_or_else(|_| "''".to_string())
        )
    }
}

/// Parse the probe's result payload
pub fn parse_violations(value: Value) -> E2eResult<Vec<Violation>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        Value::Object(mut map) => match map.remove("violations") {
            Some(inner) => parse_violations(inner),
            None => Err(E2eError::Driver("accessibility result has no violations".to_string())),
        },
        other => Err(E2eError::Driver(format!("unexpected accessibility result: {}", other))),
    }
}

/// Log violations and apply the policy
pub fn enforce(policy: AccessibilityPolicy, violations: &[Violation]) -> E2eResult<()> {
    info!("{} accessibility violation(s) detected", violations.len());
    for violation in violations {
        warn!(
            impact = violation.impact.as_deref().unwrap_or("unknown"),
            "{}: {}", violation.id, violation.description
        );
    }

    if policy == AccessibilityPolicy::Strict && !violations.is_empty() {
        let ids = violations
            .iter()
            .map(|v| v.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(E2eError::AccessibilityViolation {
            count: violations.len(),
            ids,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!([
            {
                "id": "color-contrast",
                "description": "Ensures the contrast between foreground and background colors meets WCAG 2 AA",
                "impact": "serious",
                "help": "Elements must have sufficient color contrast",
                "nodes": 4
            },
            { "id": "image-alt", "description": "Ensures <img> elements have alternate text", "impact": null }
        ])
    }

    #[test]
    fn test_parse_violation_list() {
        let violations = parse_violations(sample()).unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].nodes, 4);
        assert_eq!(violations[1].impact, None);
    }

    #[test]
    fn test_parse_wrapped_results() {
        let violations = parse_violations(json!({ "violations": sample() })).unwrap();
        assert_eq!(violations.len(), 2);
        assert!(parse_violations(json!({ "passes": [] })).is_err());
    }

    #[test]
    fn test_strict_policy_fails_on_violations() {
        let violations = parse_violations(sample()).unwrap();
        let err = enforce(AccessibilityPolicy::Strict, &violations).unwrap_err();
        assert!(matches!(
            err,
            E2eError::AccessibilityViolation { count: 2, ref ids } if ids == "color-contrast, image-alt"
        ));
    }

    #[test]
    fn test_log_only_policy_passes() {
        let violations = parse_violations(sample()).unwrap();
        enforce(AccessibilityPolicy::LogOnly, &violations).unwrap();
        enforce(AccessibilityPolicy::Strict, &[]).unwrap();
    }

    #[test]
    fn test_script_embeds_quoted_url() {
        let probe = AccessibilityProbe::new("https://cdn.example/axe.min.js");
        assert!(probe.script().contains(r#"s.src = "https://cdn.example/axe.min.js";"#));
    }
}
