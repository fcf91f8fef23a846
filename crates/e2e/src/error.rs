//! Error types for scenario execution

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Authentication failed for {username}: {reason}")]
    Authentication { username: String, reason: String },

    #[error("Timeout after {timeout_ms} ms waiting for: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Assertion failed: expected {expected}, observed {observed}")]
    AssertionMismatch { expected: String, observed: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Ambiguous target: {target} matched {count} elements")]
    AmbiguousTarget { target: String, count: usize },

    #[error("{count} accessibility violation(s): {ids}")]
    AccessibilityViolation { count: usize, ids: String },

    #[error("Unbound variable: ${{{0}}}")]
    UnboundVariable(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Target unreachable after {attempts} attempts: {url}")]
    TargetUnreachable { url: String, attempts: usize },

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Common(#[from] uiflow_common::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Stable failure classification carried into reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authentication,
    Timeout,
    AssertionMismatch,
    ElementNotFound,
    AmbiguousTarget,
    AccessibilityViolation,
    Aborted,
    Scenario,
    Driver,
}

impl E2eError {
    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::Authentication { .. } => FailureKind::Authentication,
            E2eError::Timeout { .. } => FailureKind::Timeout,
            E2eError::AssertionMismatch { .. } => FailureKind::AssertionMismatch,
            E2eError::ElementNotFound(_) => FailureKind::ElementNotFound,
            E2eError::AmbiguousTarget { .. } => FailureKind::AmbiguousTarget,
            E2eError::AccessibilityViolation { .. } => FailureKind::AccessibilityViolation,
            E2eError::Aborted(_) => FailureKind::Aborted,
            E2eError::UnboundVariable(_) | E2eError::SpecParse(_) | E2eError::Regex(_) => {
                FailureKind::Scenario
            }
            _ => FailureKind::Driver,
        }
    }

    /// Expected and observed values, when the failure carries them
    pub fn expected_observed(&self) -> Option<(&str, &str)> {
        match self {
            E2eError::AssertionMismatch { expected, observed } => {
                Some((expected.as_str(), observed.as_str()))
            }
            _ => None,
        }
    }

    pub fn timeout(what: impl Into<String>, timeout: std::time::Duration) -> Self {
        E2eError::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn mismatch(expected: impl Into<String>, observed: impl Into<String>) -> Self {
        E2eError::AssertionMismatch {
            expected: expected.into(),
            observed: observed.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(E2eError::mismatch("a", "b"), FailureKind::AssertionMismatch)]
    #[test_case(E2eError::ElementNotFound("#x".into()), FailureKind::ElementNotFound)]
    #[test_case(E2eError::UnboundVariable("id".into()), FailureKind::Scenario)]
    #[test_case(E2eError::Driver("closed".into()), FailureKind::Driver)]
    #[test_case(E2eError::PlaywrightNotFound, FailureKind::Driver)]
    fn test_kind(err: E2eError, expected: FailureKind) {
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn test_mismatch_carries_both_values() {
        let err = E2eError::mismatch("contains \"Welcome\"", "Error!");
        assert_eq!(err.expected_observed(), Some(("contains \"Welcome\"", "Error!")));
        assert_eq!(E2eError::Aborted("late".into()).expected_observed(), None);
    }

    #[test]
    fn test_timeout_display() {
        let err = E2eError::timeout("css=#headerPanel to be visible", std::time::Duration::from_secs(5));
        assert_eq!(
            err.to_string(),
            "Timeout after 5000 ms waiting for: css=#headerPanel to be visible"
        );
    }
}
