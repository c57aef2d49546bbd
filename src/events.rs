//! Records of the load-test runner's newline-delimited JSON output.
//!
//! Every line of a `--out json` dump is one self-contained object tagged by
//! its `type` field:
//!
//! ```text
//! {"type":"Metric","metric":"http_req_duration","data":{"type":"trend","contains":"time","thresholds":["p(95)<2000"]}}
//! {"type":"Point","metric":"http_req_duration","data":{"time":"2024-05-09T14:34:45.625+02:00","value":120.4}}
//! ```

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One decoded line of the metrics stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Declares (or re-declares) a metric and its metadata.
    Metric {
        metric: String,
        #[serde(default)]
        data: MetricMeta,
    },

    /// A single sample emitted for a metric.
    Point {
        metric: String,
        #[serde(default)]
        data: PointData,
    },

    /// Any record kind the runner may add that carries nothing we aggregate.
    #[serde(other)]
    Other,
}

impl Event {
    /// Decode one line of the stream.
    ///
    /// Only text that is not JSON is an error. A well-formed line that does
    /// not have the shape of a record (no `type`, no `metric`, not an object)
    /// decodes as `Event::Other`.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            debug!(error = %e, "Record does not match a known shape");
            Event::Other
        }))
    }
}

/// Kind of a metric as declared by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
    #[serde(other)]
    Unknown,
}

/// What the values of a metric represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Default,
    Time,
    Data,
    #[serde(other)]
    Unknown,
}

/// Metadata carried by a `Metric` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricMeta {
    #[serde(default, rename = "type")]
    pub kind: Option<MetricKind>,

    #[serde(default)]
    pub contains: Option<ValueKind>,

    /// Threshold expressions attached to the metric by the test script.
    #[serde(default)]
    pub thresholds: Option<Vec<String>>,
}

impl MetricMeta {
    pub fn declared_thresholds(&self) -> &[String] {
        self.thresholds.as_deref().unwrap_or(&[])
    }
}

/// Payload of a `Point` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointData {
    /// Raw sample; anything other than a JSON number is kept but never aggregated.
    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub time: Option<String>,
}

impl PointData {
    /// The sample as a number, or `None` when it is missing, non-numeric or NaN.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_f64().filter(|v| !v.is_nan())
    }

    /// Emission time of the sample. Unparsable timestamps are treated as absent.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
    }
}
