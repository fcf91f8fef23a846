//! Variable bindings and `${name}` templates
//!
//! Scenario strings may reference fixture values and values bound by
//! earlier `read` steps. Literal templates substitute the raw value;
//! pattern templates escape it for use inside a regular expression, and
//! `${name|amount}` expands to the currency tolerance of
//! [`crate::assert::amount_pattern`].

use std::collections::BTreeMap;

use crate::assert::amount_pattern;
use crate::error::{E2eError, E2eResult};

/// Named values visible to a running scenario
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<String, String>,
}

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Var { name: &'a str, filter: Option<&'a str> },
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Substitute raw values
    pub fn render_literal(&self, template: &str) -> E2eResult<String> {
        self.render(template, |value, filter| match filter {
            None => Ok(value.to_string()),
            Some(other) => Err(E2eError::SpecParse(format!(
                "filter '{}' is only valid inside patterns",
                other
            ))),
        })
    }

    /// Substitute regex-escaped values into a pattern
    pub fn render_pattern(&self, template: &str) -> E2eResult<String> {
        self.render(template, |value, filter| match filter {
            None => Ok(regex::escape(value)),
            Some("amount") => Ok(amount_pattern(value)),
            Some(other) => Err(E2eError::SpecParse(format!("unknown template filter '{}'", other))),
        })
    }

    fn render<F>(&self, template: &str, mut substitute: F) -> E2eResult<String>
    where
        F: FnMut(&str, Option<&str>) -> E2eResult<String>,
    {
        let mut out = String::with_capacity(template.len());
        for segment in parse(template)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var { name, filter } => {
                    let value = self
                        .get(name)
                        .ok_or_else(|| E2eError::UnboundVariable(name.to_string()))?;
                    out.push_str(&substitute(value, filter)?);
                }
            }
        }
        Ok(out)
    }
}

impl From<BTreeMap<String, String>> for Bindings {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

/// Variable names referenced by a template
pub fn references(template: &str) -> E2eResult<Vec<String>> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Var { name, .. } => Some(name.to_string()),
            Segment::Text(_) => None,
        })
        .collect())
}

fn parse(template: &str) -> E2eResult<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            E2eError::SpecParse(format!("unterminated '${{' in template: {}", template))
        })?;
        let inner = after[..end].trim();
        let (name, filter) = match inner.split_once('|') {
            Some((name, filter)) => (name.trim(), Some(filter.trim())),
            None => (inner, None),
        };
        if name.is_empty() {
            return Err(E2eError::SpecParse(format!("empty variable name in template: {}", template)));
        }
        segments.push(Segment::Var { name, filter });
        rest = &after[end + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Bindings {
        let mut b = Bindings::new();
        b.bind("transactionId", "14476");
        b.bind("amount", "100");
        b.bind("payee.name", "Rose Wrong");
        b.bind("fromAccount", "13344");
        b
    }

    #[test]
    fn test_literal_substitution() {
        let b = vars();
        assert_eq!(b.render_literal("id=${transactionId}").unwrap(), "id=14476");
        assert_eq!(b.render_literal("${ payee.name }!").unwrap(), "Rose Wrong!");
        assert_eq!(b.render_literal("no vars").unwrap(), "no vars");
    }

    #[test]
    fn test_pattern_escapes_values() {
        let mut b = Bindings::new();
        b.bind("price", "$1.50 (net)");
        assert_eq!(b.render_pattern("^${price}$").unwrap(), r"^\$1\.50 \(net\)$");
    }

    #[test]
    fn test_amount_filter() {
        let b = vars();
        let pattern = b
            .render_pattern("transferred ${amount|amount} from account #${fromAccount}")
            .unwrap();
        let re = regex::Regex::new(&pattern).unwrap();
        assert!(re.is_match("transferred $100.00 from account #13344"));
        assert!(re.is_match("transferred 100 from account #13344"));
        assert!(!re.is_match("transferred $100.50 from account #13344"));
    }

    #[test]
    fn test_filter_rejected_in_literals() {
        assert!(vars().render_literal("${amount|amount}").is_err());
    }

    #[test]
    fn test_unbound_variable() {
        let err = vars().render_literal("${missing}").unwrap_err();
        assert!(matches!(err, E2eError::UnboundVariable(name) if name == "missing"));
    }

    #[test]
    fn test_unterminated_template() {
        assert!(matches!(
            references("Welcome ${validUser.username"),
            Err(E2eError::SpecParse(_))
        ));
    }

    #[test]
    fn test_references() {
        assert_eq!(
            references("${a} and ${b|amount} and $c").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
