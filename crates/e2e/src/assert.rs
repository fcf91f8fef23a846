//! Assertion layer: compare observed page state against expectations

use regex::Regex;

use crate::bindings::Bindings;
use crate::error::{E2eError, E2eResult};
use crate::spec::{CountPredicate, Expected, UrlPattern};

/// Compiled text expectation
#[derive(Debug, Clone)]
pub enum TextMatcher {
    Contains(String),
    Equals(String),
    Pattern(Regex),
}

impl TextMatcher {
    /// Render templates and compile patterns
    pub fn compile(expected: &Expected, vars: &Bindings) -> E2eResult<Self> {
        Ok(match expected {
            Expected::Contains(s) => {
                TextMatcher::Contains(normalize_whitespace(&vars.render_literal(s)?))
            }
            Expected::Equals(s) => TextMatcher::Equals(normalize_whitespace(&vars.render_literal(s)?)),
            Expected::Matches(p) => TextMatcher::Pattern(Regex::new(&vars.render_pattern(p)?)?),
        })
    }

    pub fn matches(&self, observed: &str) -> bool {
        match self {
            TextMatcher::Contains(needle) => normalize_whitespace(observed).contains(needle.as_str()),
            TextMatcher::Equals(expected) => normalize_whitespace(observed) == *expected,
            TextMatcher::Pattern(re) => re.is_match(&normalize_whitespace(observed)),
        }
    }
}

impl std::fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextMatcher::Contains(s) => write!(f, "text containing {:?}", s),
            TextMatcher::Equals(s) => write!(f, "text equal to {:?}", s),
            TextMatcher::Pattern(re) => write!(f, "text matching /{}/", re.as_str()),
        }
    }
}

/// Compiled URL expectation
#[derive(Debug, Clone)]
pub enum UrlMatcher {
    Contains(String),
    Pattern(Regex),
}

impl UrlMatcher {
    pub fn compile(pattern: &UrlPattern, vars: &Bindings) -> E2eResult<Self> {
        Ok(match pattern {
            UrlPattern::Contains(s) => UrlMatcher::Contains(vars.render_literal(s)?),
            UrlPattern::Matches(p) => UrlMatcher::Pattern(Regex::new(&vars.render_pattern(p)?)?),
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatcher::Contains(s) => url.contains(s.as_str()),
            UrlMatcher::Pattern(re) => re.is_match(url),
        }
    }
}

impl std::fmt::Display for UrlMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlMatcher::Contains(s) => write!(f, "URL containing {:?}", s),
            UrlMatcher::Pattern(re) => write!(f, "URL matching /{}/", re.as_str()),
        }
    }
}

impl CountPredicate {
    pub fn holds(&self, count: usize) -> bool {
        match *self {
            CountPredicate::GreaterThan(n) => count > n,
            CountPredicate::AtLeast(n) => count >= n,
            CountPredicate::Equals(n) => count == n,
        }
    }
}

impl std::fmt::Display for CountPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountPredicate::GreaterThan(n) => write!(f, "count > {}", n),
            CountPredicate::AtLeast(n) => write!(f, "count >= {}", n),
            CountPredicate::Equals(n) => write!(f, "count == {}", n),
        }
    }
}

pub fn assert_text(observed: &str, matcher: &TextMatcher) -> E2eResult<()> {
    if matcher.matches(observed) {
        Ok(())
    } else {
        Err(E2eError::mismatch(matcher.to_string(), truncate(observed, 200)))
    }
}

pub fn assert_url(observed: &str, matcher: &UrlMatcher) -> E2eResult<()> {
    if matcher.matches(observed) {
        Ok(())
    } else {
        Err(E2eError::mismatch(matcher.to_string(), observed))
    }
}

pub fn assert_count(observed: usize, predicate: CountPredicate) -> E2eResult<()> {
    if predicate.holds(observed) {
        Ok(())
    } else {
        Err(E2eError::mismatch(predicate.to_string(), format!("count == {}", observed)))
    }
}

/// Regex for a monetary amount that tolerates an optional `$` prefix and
/// an optional trailing `.00`.
///
/// `"100"` and `"100.00"` both yield `\$?100(?:\.00)?`; amounts with
/// non-zero cents must match exactly.
pub fn amount_pattern(amount: &str) -> String {
    let trimmed = amount.trim().trim_start_matches('$');
    let whole = trimmed.strip_suffix(".00").unwrap_or(trimmed);
    let integral = !whole.is_empty() && whole.chars().all(|c| c.is_ascii_digit() || c == ',');
    if integral {
        format!(r"\$?{}(?:\.00)?", regex::escape(whole))
    } else {
        format!(r"\$?{}", regex::escape(whole))
    }
}

/// Collapse runs of whitespace and trim the ends
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}...", head)
    }
}
