use crate::{config::duration_str, ConfigError, TransportErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// What a check gets to look at after a request completes.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    pub status: u16,
    pub duration: Duration,
    pub body: Option<&'a str>,
    pub error: Option<TransportErrorKind>,
}

/// A named boolean assertion evaluated against every response.
///
/// In a JSON configuration the predicate sits next to the name:
///
/// ```json
/// { "name": "status is 200", "status_equals": 200 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    StatusEquals(u16),
    StatusRange {
        min: u16,
        max: u16,
    },
    BodyContains(String),
    DurationBelow(#[serde(with = "duration_str")] Duration),
    /// Escape hatch for assertions the fixed set cannot express. Only plain functions are
    /// accepted so a check cannot capture or mutate state.
    #[serde(skip)]
    Custom(CustomPredicate),
}

#[derive(Clone, Copy)]
pub struct CustomPredicate(pub fn(&Exchange<'_>) -> bool);

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomPredicate(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

impl Check {
    pub fn new(name: &str, predicate: Predicate) -> Self {
        Self {
            name: name.to_string(),
            predicate,
        }
    }

    pub fn status_equals(name: &str, status: u16) -> Self {
        Self::new(name, Predicate::StatusEquals(status))
    }

    pub fn status_range(name: &str, min: u16, max: u16) -> Self {
        Self::new(name, Predicate::StatusRange { min, max })
    }

    pub fn body_contains(name: &str, needle: &str) -> Self {
        Self::new(name, Predicate::BodyContains(needle.to_string()))
    }

    pub fn duration_below(name: &str, limit: Duration) -> Self {
        Self::new(name, Predicate::DurationBelow(limit))
    }

    pub fn custom(name: &str, func: fn(&Exchange<'_>) -> bool) -> Self {
        Self::new(name, Predicate::Custom(CustomPredicate(func)))
    }

    pub fn run(&self, exchange: &Exchange<'_>) -> CheckResult {
        CheckResult {
            name: self.name.clone(),
            passed: self.predicate.evaluate(exchange),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidCheck {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }

        match &self.predicate {
            Predicate::StatusRange { min, max } if min > max => {
                Err(invalid(&format!("status range {min}..={max} is empty")))
            }
            Predicate::BodyContains(needle) if needle.is_empty() => {
                Err(invalid("body_contains needs a non-empty needle"))
            }
            _ => Ok(()),
        }
    }
}

impl Predicate {
    pub fn evaluate(&self, exchange: &Exchange<'_>) -> bool {
        match self {
            Predicate::StatusEquals(status) => exchange.status == *status,
            Predicate::StatusRange { min, max } => (*min..=*max).contains(&exchange.status),
            Predicate::BodyContains(needle) => exchange
                .body
                .map(|body| body.contains(needle.as_str()))
                .unwrap_or(false),
            Predicate::DurationBelow(limit) => {
                exchange.error.is_none() && exchange.duration < *limit
            }
            Predicate::Custom(CustomPredicate(func)) => func(exchange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(status: u16, body: Option<&str>) -> Exchange<'_> {
        Exchange {
            status,
            duration: Duration::from_millis(40),
            body,
            error: None,
        }
    }

    #[test]
    fn fixed_predicates() {
        let ok = exchange(200, Some("{\"items\":[]}"));
        assert!(Check::status_equals("status is 200", 200).run(&ok).passed);
        assert!(Check::status_range("2xx", 200, 299).run(&ok).passed);
        assert!(Check::body_contains("has items", "items").run(&ok).passed);
        assert!(
            Check::duration_below("fast", Duration::from_millis(300))
                .run(&ok)
                .passed
        );

        let err = exchange(500, None);
        assert!(!Check::status_equals("status is 200", 200).run(&err).passed);
        assert!(!Check::body_contains("has items", "items").run(&err).passed);
    }

    #[test]
    fn transport_failure_never_counts_as_fast() {
        let failed = Exchange {
            status: 0,
            duration: Duration::from_millis(1),
            body: None,
            error: Some(TransportErrorKind::Connect),
        };
        assert!(
            !Check::duration_below("fast", Duration::from_millis(300))
                .run(&failed)
                .passed
        );
    }

    #[test]
    fn custom_predicate() {
        fn is_teapot(exchange: &Exchange<'_>) -> bool {
            exchange.status == 418
        }

        let check = Check::custom("teapot", is_teapot);
        assert!(check.run(&exchange(418, None)).passed);
        assert!(!check.run(&exchange(200, None)).passed);
    }

    #[test]
    fn rejects_empty_range() {
        let err = Check::status_range("bad", 300, 200).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCheck { .. }));
        assert!(Check::status_equals(" ", 200).validate().is_err());
    }

    #[test]
    fn deserializes_flattened_predicate() {
        let check: Check =
            serde_json::from_str(r#"{ "name": "status is 200", "status_equals": 200 }"#).unwrap();
        assert_eq!(check.name, "status is 200");
        assert!(matches!(check.predicate, Predicate::StatusEquals(200)));

        let check: Check =
            serde_json::from_str(r#"{ "name": "fast", "duration_below": "250ms" }"#).unwrap();
        assert!(
            matches!(check.predicate, Predicate::DurationBelow(d) if d == Duration::from_millis(250))
        );
    }
}
