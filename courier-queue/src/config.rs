//! Lane configuration.

use crate::error::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::time::Duration;

/// Default per-attempt timeout for queued jobs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lane configuration.
///
/// The fallback lane is always valid, whether or not it appears in `lanes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Lane used when a requested lane is missing or unknown
    pub fallback_lane: String,

    /// Explicitly valid lane names
    #[serde(default)]
    pub lanes: BTreeSet<String>,

    /// Timeout applied to jobs that do not carry their own
    #[serde(
        rename = "default_timeout_secs",
        with = "duration_secs",
        default = "default_timeout"
    )]
    pub default_timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl QueueConfig {
    /// Create a configuration with only a fallback lane.
    pub fn new(fallback_lane: impl Into<String>) -> Self {
        Self {
            fallback_lane: fallback_lane.into(),
            lanes: BTreeSet::new(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Add a valid lane.
    pub fn with_lane(mut self, lane: impl Into<String>) -> Self {
        self.lanes.insert(lane.into());
        self
    }

    /// Add several valid lanes.
    pub fn with_lanes<I, S>(mut self, lanes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lanes.extend(lanes.into_iter().map(Into::into));
        self
    }

    /// Set the default job timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Check whether a lane name is accepted.
    pub fn is_valid_lane(&self, lane: &str) -> bool {
        lane == self.fallback_lane || self.lanes.contains(lane)
    }

    /// Resolve a requested lane, falling back when it is unset or unknown.
    pub fn resolve_lane<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(lane) if self.is_valid_lane(lane) => lane,
            _ => &self.fallback_lane,
        }
    }

    /// Load from `<PREFIX>_FALLBACK`, `<PREFIX>_LANES` and `<PREFIX>_TIMEOUT_SECS`.
    pub fn from_env(prefix: &str) -> QueueResult<Self> {
        let prefix = format!("{}_", prefix.trim_end_matches('_'));
        let vars: HashMap<String, String> = env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect();

        Self::from_vars(&vars)
    }

    /// Build from already-collected, prefix-stripped, lowercase keys.
    pub fn from_vars(vars: &HashMap<String, String>) -> QueueResult<Self> {
        let fallback = vars
            .get("fallback")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| QueueError::Config("missing fallback lane".to_string()))?;

        let mut config = Self::new(fallback);

        if let Some(lanes) = vars.get("lanes") {
            config = config.with_lanes(
                lanes
                    .split(',')
                    .map(str::trim)
                    .filter(|lane| !lane.is_empty()),
            );
        }

        if let Some(secs) = vars.get("timeout_secs") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| QueueError::Config(format!("invalid timeout_secs '{}': {}", secs, e)))?;
            config = config.with_default_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
