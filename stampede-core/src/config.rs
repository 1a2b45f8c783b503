use crate::{
    Check, ConfigError, StageProfile, Threshold, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RUN_NAME,
    DEFAULT_TICK,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// One segment of the concurrency profile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        };
        f.write_str(s)
    }
}

/// Pause between two iterations of a virtual user.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThinkTime {
    Fixed(#[serde(with = "duration_str")] Duration),
    Uniform {
        #[serde(with = "duration_str")]
        min: Duration,
        #[serde(with = "duration_str")]
        max: Duration,
    },
}

impl Default for ThinkTime {
    fn default() -> Self {
        ThinkTime::Fixed(Duration::ZERO)
    }
}

/// Inclusive range of statuses that count as a successful request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub fn contains(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl Default for StatusRange {
    fn default() -> Self {
        Self { min: 200, max: 399 }
    }
}

/// Everything needed to describe one load test run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub target_url: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub start_vus: u64,
    #[serde(default, deserialize_with = "one_or_many")]
    pub thresholds: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub think_time: ThinkTime,
    #[serde(default)]
    pub checks: Vec<Check>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_output_path: Option<PathBuf>,
    #[serde(default = "default_tick", with = "duration_str")]
    pub tick: Duration,
    #[serde(default = "default_request_timeout", with = "duration_str")]
    pub request_timeout: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rps: Option<NonZeroU32>,
    #[serde(default)]
    pub expected_status: StatusRange,
}

/// A configuration that passed validation, with its thresholds parsed.
#[derive(Clone, Debug)]
pub struct RunPlan {
    pub profile: StageProfile,
    pub thresholds: Vec<Threshold>,
}

impl RunConfig {
    pub fn new(name: &str, target_url: &str) -> Self {
        Self {
            name: name.to_string(),
            target_url: target_url.to_string(),
            http_method: HttpMethod::default(),
            body: None,
            headers: BTreeMap::new(),
            stages: vec![],
            start_vus: 0,
            thresholds: BTreeMap::new(),
            think_time: ThinkTime::default(),
            checks: vec![],
            report_output_path: None,
            tick: DEFAULT_TICK,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_rps: None,
            expected_status: StatusRange::default(),
        }
    }

    pub fn add_threshold(&mut self, metric: &str, expression: &str) {
        self.thresholds
            .entry(metric.to_string())
            .or_default()
            .push(expression.to_string());
    }

    /// Check the whole configuration and parse its thresholds.
    ///
    /// Runs before any virtual user exists; the first problem found is returned.
    pub fn validate(&self) -> Result<RunPlan, ConfigError> {
        if self.target_url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl);
        }

        let profile = StageProfile::new(self.start_vus, self.stages.clone())?;

        if self.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        if let ThinkTime::Uniform { min, max } = self.think_time {
            if min > max {
                return Err(ConfigError::InvalidThinkTime { min, max });
            }
        }

        let StatusRange { min, max } = self.expected_status;
        if min > max {
            return Err(ConfigError::InvalidStatusRange { min, max });
        }

        let mut names = HashSet::new();
        for check in &self.checks {
            check.validate()?;
            if !names.insert(check.name.as_str()) {
                return Err(ConfigError::InvalidCheck {
                    name: check.name.clone(),
                    reason: "name is used by another check".to_string(),
                });
            }
        }

        let mut thresholds = vec![];
        for (metric, expressions) in &self.thresholds {
            for expression in expressions {
                thresholds.push(Threshold::new(metric, expression)?);
            }
        }

        debug!(
            "Configuration `{}` is valid: {} stages, {} thresholds, {} checks",
            self.name,
            profile.stages().len(),
            thresholds.len(),
            self.checks.len()
        );

        Ok(RunPlan {
            profile,
            thresholds,
        })
    }
}

fn default_name() -> String {
    DEFAULT_RUN_NAME.to_string()
}

fn default_tick() -> Duration {
    DEFAULT_TICK
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(metric, exprs)| match exprs {
            OneOrMany::One(expr) => (metric, vec![expr]),
            OneOrMany::Many(exprs) => (metric, exprs),
        })
        .collect())
}

/// Durations as human readable strings (`"30s"`, `"1m"`, `"250ms"`).
pub(crate) mod duration_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*dur))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(D::Error::custom)
    }
}
