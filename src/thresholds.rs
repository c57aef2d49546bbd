//! Pass/fail thresholds over metric aggregations.
//!
//! Expressions follow the runner's threshold syntax:
//!
//! ```text
//! p(95)<2000     avg<=300     rate<0.1     count>100     max!=0
//! ```

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::events::MetricKind;
use crate::ingest::{MetricSeries, MetricStore};
use crate::summary::{percentile, Summary};

lazy_static::lazy_static! {
    static ref THRESHOLD_RE: Regex = Regex::new(
        r"^\s*(avg|min|max|med|count|rate|value|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|==|!=|<|>)\s*(-?\d+(?:\.\d+)?)\s*$"
    ).expect("threshold regex is valid");
}

/// Rate metrics the runner always emits, recognised even without a `Metric` record.
const BUILTIN_RATES: &[&str] = &["http_req_failed", "checks"];

/// Counter metrics the runner always emits, recognised even without a `Metric` record.
const BUILTIN_COUNTERS: &[&str] = &["http_reqs", "iterations", "data_sent", "data_received"];

/// Errors from parsing a threshold expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Invalid threshold expression '{0}'")]
    Invalid(String),

    #[error("Percentile out of range in '{0}' (expected 0 < p <= 100)")]
    PercentileOutOfRange(String),
}

/// A threshold as written: the metric it applies to and its expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThresholdSpec {
    pub metric: String,
    pub expression: String,
}

impl ThresholdSpec {
    pub fn new(metric: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            expression: expression.into(),
        }
    }
}

/// Thresholds applied to every report.
pub fn default_thresholds() -> Vec<ThresholdSpec> {
    vec![
        ThresholdSpec::new("http_req_duration", "p(95)<2000"),
        ThresholdSpec::new("http_req_failed", "rate<0.1"),
        ThresholdSpec::new("http_reqs", "rate>10"),
        ThresholdSpec::new("checks", "rate>0.9"),
    ]
}

/// Aggregation a threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    Percentile(f64),
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Value => write!(f, "value"),
            Aggregation::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            _ => None,
        }
    }

    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }
}

/// A parsed threshold expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn parse(expression: &str) -> Result<Self, ThresholdError> {
        let invalid = || ThresholdError::Invalid(expression.to_string());
        let caps = THRESHOLD_RE.captures(expression).ok_or_else(invalid)?;

        let aggregation = match &caps[1] {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            "value" => Aggregation::Value,
            _ => {
                let p: f64 = caps
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .ok_or_else(invalid)?;
                if p <= 0.0 || p > 100.0 {
                    return Err(ThresholdError::PercentileOutOfRange(expression.to_string()));
                }
                Aggregation::Percentile(p)
            }
        };

        let comparison = Comparison::from_operator(&caps[3]).ok_or_else(invalid)?;
        let bound: f64 = caps[4].parse().map_err(|_| invalid())?;

        Ok(Self {
            aggregation,
            comparison,
            bound,
        })
    }

    /// Compute the aggregated value this threshold compares, if available.
    pub fn observe(
        &self,
        metric: &str,
        series: &MetricSeries,
        summary: &Summary,
        store: &MetricStore,
    ) -> Option<f64> {
        match self.aggregation {
            Aggregation::Avg => Some(summary.avg),
            Aggregation::Min => Some(summary.min),
            Aggregation::Max => Some(summary.max),
            Aggregation::Count => match effective_kind(metric, series) {
                Some(MetricKind::Counter) => Some(series.total_sum()),
                _ => Some(series.total_count() as f64),
            },
            Aggregation::Med => sorted_percentile(series, 50.0),
            Aggregation::Percentile(p) => sorted_percentile(series, p),
            Aggregation::Value => series.last_value(),
            Aggregation::Rate => match effective_kind(metric, series) {
                Some(MetricKind::Rate) => Some(summary.avg),
                Some(MetricKind::Counter) => {
                    let secs = store.run_window()?.as_secs_f64();
                    if secs > 0.0 {
                        Some(series.total_sum() / secs)
                    } else {
                        None
                    }
                }
                _ => None,
            },
        }
    }
}

fn sorted_percentile(series: &MetricSeries, p: f64) -> Option<f64> {
    let mut values = series.numeric_values();
    values.sort_by(f64::total_cmp);
    percentile(&values, p)
}

fn effective_kind(metric: &str, series: &MetricSeries) -> Option<MetricKind> {
    match series.kind() {
        Some(MetricKind::Unknown) | None => {
            if BUILTIN_RATES.contains(&metric) {
                Some(MetricKind::Rate)
            } else if BUILTIN_COUNTERS.contains(&metric) {
                Some(MetricKind::Counter)
            } else {
                None
            }
        }
        kind => kind,
    }
}

/// Result of checking one threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdOutcome {
    Passed { observed: f64 },
    Failed { observed: f64 },
    /// Metric absent, or the aggregation is unavailable for it.
    NoData,
    Invalid(String),
}

impl ThresholdOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ThresholdOutcome::Passed { .. } => "PASS",
            ThresholdOutcome::Failed { .. } => "FAIL",
            ThresholdOutcome::NoData => "NO DATA",
            ThresholdOutcome::Invalid(_) => "INVALID",
        }
    }

    pub fn observed(&self) -> Option<f64> {
        match self {
            ThresholdOutcome::Passed { observed } | ThresholdOutcome::Failed { observed } => {
                Some(*observed)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub spec: ThresholdSpec,
    pub outcome: ThresholdOutcome,
}

impl ThresholdResult {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, ThresholdOutcome::Failed { .. })
    }
}

/// Merge configured thresholds with those declared by `Metric` records.
///
/// Duplicates are removed; configured thresholds come first.
pub fn collect_thresholds(configured: &[ThresholdSpec], store: &MetricStore) -> Vec<ThresholdSpec> {
    let mut specs: Vec<ThresholdSpec> = configured.to_vec();

    for (name, series) in store.iter() {
        let Some(meta) = series.meta() else {
            continue;
        };
        for expression in meta.declared_thresholds() {
            let spec = ThresholdSpec::new(name, expression.trim());
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }
    }

    specs
}

/// Check one threshold against the collected data.
pub fn evaluate(
    spec: &ThresholdSpec,
    store: &MetricStore,
    summaries: &BTreeMap<String, Summary>,
) -> ThresholdOutcome {
    let threshold = match Threshold::parse(&spec.expression) {
        Ok(t) => t,
        Err(e) => {
            warn!(metric = %spec.metric, error = %e, "Skipping invalid threshold");
            return ThresholdOutcome::Invalid(e.to_string());
        }
    };

    let (Some(series), Some(summary)) = (store.get(&spec.metric), summaries.get(&spec.metric))
    else {
        return ThresholdOutcome::NoData;
    };

    let Some(observed) = threshold.observe(&spec.metric, series, summary, store) else {
        debug!(
            metric = %spec.metric,
            aggregation = %threshold.aggregation,
            "Threshold aggregation unavailable for metric"
        );
        return ThresholdOutcome::NoData;
    };

    if threshold.comparison.holds(observed, threshold.bound) {
        ThresholdOutcome::Passed { observed }
    } else {
        ThresholdOutcome::Failed { observed }
    }
}

/// Check every threshold, in order.
pub fn evaluate_all(
    specs: &[ThresholdSpec],
    store: &MetricStore,
    summaries: &BTreeMap<String, Summary>,
) -> Vec<ThresholdResult> {
    specs
        .iter()
        .map(|spec| ThresholdResult {
            spec: spec.clone(),
            outcome: evaluate(spec, store, summaries),
        })
        .collect()
}
