use crate::{builtin_kind, ConfigError, MetricKind};
use serde::Serialize;
use std::fmt;

/// Which statistic of a metric a threshold looks at.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Percentile in `0..=100`.
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    Sum,
}

impl Selector {
    fn parse(raw: &str) -> Result<Self, String> {
        let selector = match raw {
            "avg" | "mean" => Selector::Avg,
            "min" => Selector::Min,
            "max" => Selector::Max,
            "med" => Selector::Med,
            "count" => Selector::Count,
            "rate" => Selector::Rate,
            "value" => Selector::Value,
            "sum" => Selector::Sum,
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown statistic `{other}`"))?;
                let pct: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| format!("`{inner}` is not a percentile"))?;
                if !(0.0..=100.0).contains(&pct) {
                    return Err(format!("percentile {pct} is outside 0..=100"));
                }
                Selector::Percentile(pct)
            }
        };
        Ok(selector)
    }

    pub fn accepts(&self, kind: MetricKind) -> bool {
        use Selector::*;
        match kind {
            MetricKind::Trend => matches!(
                self,
                Percentile(_) | Avg | Min | Max | Med | Count | Sum
            ),
            MetricKind::Rate => matches!(self, Rate | Count),
            MetricKind::Counter => matches!(self, Count | Rate | Sum),
            MetricKind::Gauge => matches!(self, Value | Min | Max),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Percentile(p) => write!(f, "p({p})"),
            Selector::Avg => f.write_str("avg"),
            Selector::Min => f.write_str("min"),
            Selector::Max => f.write_str("max"),
            Selector::Med => f.write_str("med"),
            Selector::Count => f.write_str("count"),
            Selector::Rate => f.write_str("rate"),
            Selector::Value => f.write_str("value"),
            Selector::Sum => f.write_str("sum"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

// Longest operators first so `<=` is not read as `<`.
const OPERATORS: &[(&str, Comparison)] = &[
    ("===", Comparison::Eq),
    ("<=", Comparison::Le),
    (">=", Comparison::Ge),
    ("==", Comparison::Eq),
    ("!=", Comparison::Ne),
    ("<", Comparison::Lt),
    (">", Comparison::Gt),
];

impl Comparison {
    pub fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// A parsed pass/fail condition such as `p(95) < 300ms` on `http_req_duration`.
///
/// Duration literals are converted to milliseconds, the unit trend metrics are recorded in.
/// Bare numbers are taken as-is.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub selector: Selector,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn new(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let kind = builtin_kind(metric).ok_or_else(|| ConfigError::UnknownMetric {
            metric: metric.to_string(),
        })?;

        let invalid = |reason: String| ConfigError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason,
        };

        let (selector, comparison, bound) = parse_expression(expression).map_err(invalid)?;

        if !selector.accepts(kind) {
            return Err(ConfigError::IncompatibleSelector {
                metric: metric.to_string(),
                selector: selector.to_string(),
                kind,
            });
        }

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.to_string(),
            selector,
            comparison,
            bound,
        })
    }

    pub fn passes(&self, observed: f64) -> bool {
        self.comparison.holds(observed, self.bound)
    }
}

fn parse_expression(expression: &str) -> Result<(Selector, Comparison, f64), String> {
    let op_start = expression
        .find(['<', '>', '=', '!'])
        .ok_or_else(|| "missing comparison operator".to_string())?;

    let (lhs, rest) = expression.split_at(op_start);
    let (op_len, comparison) = OPERATORS
        .iter()
        .find(|(symbol, _)| rest.starts_with(symbol))
        .map(|(symbol, cmp)| (symbol.len(), *cmp))
        .ok_or_else(|| format!("malformed operator in `{rest}`"))?;

    let lhs = lhs.trim();
    if lhs.is_empty() {
        return Err("missing statistic before the operator".to_string());
    }
    let selector = Selector::parse(lhs)?;
    let bound = parse_bound(rest[op_len..].trim())?;

    Ok((selector, comparison, bound))
}

fn parse_bound(raw: &str) -> Result<f64, String> {
    if raw.is_empty() {
        return Err("missing bound after the operator".to_string());
    }

    if let Ok(value) = raw.parse::<f64>() {
        if value.is_finite() {
            return Ok(value);
        }
        return Err(format!("bound `{raw}` is not finite"));
    }

    humantime::parse_duration(raw)
        .map(|dur| dur.as_secs_f64() * 1_000.)
        .map_err(|err| format!("bound `{raw}` is neither a number nor a duration ({err})"))
}
