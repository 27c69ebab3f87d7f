//! Metric observation model.
//!
//! An [`Observation`] is the only thing the collectors produce. Names are
//! relative (`innodb.history_list_length`); the namespace prefix is applied
//! by the [`MetricWriter`](crate::sink::MetricWriter) when the line is rendered.

use std::collections::BTreeMap;
use std::fmt;

/// Tag every observation carries, set to the endpoint's logical name.
pub const SCHEMA_TAG: &str = "schema";

/// Numeric value of an observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl MetricValue {
    /// Parses a status value the way the snapshot emitter coerces it:
    /// anything containing a `.` is floating-point, everything else integer.
    ///
    /// Returns `None` for non-numeric text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.contains('.') {
            return text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Float);
        }
        if let Ok(v) = text.parse::<i64>() {
            return Some(MetricValue::Int(v));
        }
        text.parse::<u64>().ok().map(MetricValue::UInt)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::UInt(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::UInt(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A single normalized metric point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Dot-separated metric name, relative to the writer's namespace.
    pub name: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub value: MetricValue,
    /// Tag key -> value. Always contains [`SCHEMA_TAG`].
    pub tags: BTreeMap<String, String>,
}

impl Observation {
    /// Creates an observation tagged with `schema=<schema>`.
    pub fn new(
        name: impl Into<String>,
        timestamp: i64,
        value: impl Into<MetricValue>,
        schema: &str,
    ) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(SCHEMA_TAG.to_string(), schema.to_string());
        Self {
            name: name.into(),
            timestamp,
            value: value.into(),
            tags,
        }
    }

    /// Adds an extra tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a tag, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns the logical endpoint name this observation belongs to.
    pub fn schema(&self) -> &str {
        self.tag(SCHEMA_TAG).unwrap_or_default()
    }
}
