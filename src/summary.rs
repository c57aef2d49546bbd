//! Descriptive statistics over accumulated samples.
//!
//! Percentiles use the nearest-rank method: the value at sorted rank
//! `ceil(p/100 * n)`. No interpolation between neighbouring samples.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::ingest::MetricStore;

/// Summary statistics for one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Number of numeric samples
    pub count: usize,

    pub min: f64,

    pub max: f64,

    /// Arithmetic mean
    pub avg: f64,

    /// 90th percentile
    pub p90: f64,

    /// 95th percentile
    pub p95: f64,

    /// 99th percentile
    pub p99: f64,
}

/// Statistics that could not be computed for a metric.
#[derive(Error, Debug, PartialEq)]
pub enum SummaryError {
    #[error("{stat} is not finite over {count} samples")]
    NonFinite { stat: &'static str, count: usize },
}

impl Summary {
    /// Compute a summary from raw samples.
    ///
    /// NaN values are excluded first. Returns `Ok(None)` when nothing remains.
    pub fn compute(values: &[f64]) -> Result<Option<Self>, SummaryError> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return Ok(None);
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let min = sorted[0];
        let max = sorted[count - 1];
        let sum: f64 = sorted.iter().sum();

        for (stat, value) in [("min", min), ("max", max), ("sum", sum)] {
            if !value.is_finite() {
                return Err(SummaryError::NonFinite { stat, count });
            }
        }

        // Rounding can push the mean of identical values a hair past max.
        let avg = (sum / count as f64).clamp(min, max);

        Ok(Some(Self {
            count,
            min,
            max,
            avg,
            p90: nearest_rank(&sorted, 90.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        }))
    }

    /// Placeholder for a metric whose statistics could not be computed.
    pub fn zeroed(count: usize) -> Self {
        Self {
            count,
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
        }
    }

    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:.2}, max={:.2}, avg={:.2}, p90={:.2}, p95={:.2}, p99={:.2}",
            self.count, self.min, self.max, self.avg, self.p90, self.p95, self.p99
        )
    }

    /// Format statistics as a compact table row.
    pub fn format_table_row(&self, label: &str) -> String {
        format!(
            "{:<30} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            label, self.count, self.min, self.avg, self.p90, self.p95, self.p99, self.max,
        )
    }
}

/// Nearest-rank percentile of an ascending slice.
///
/// Returns `None` for an empty slice. `p` is clamped to `0..=100`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(nearest_rank(sorted, p))
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let rank = ((p.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}

/// Summarize every metric that has at least one numeric sample.
///
/// A metric whose statistics fail to compute is logged and represented by a
/// zeroed summary so the rest of the report still renders.
pub fn summarize(store: &MetricStore) -> BTreeMap<String, Summary> {
    let mut summaries = BTreeMap::new();

    for (name, series) in store.iter() {
        if series.is_empty() {
            continue;
        }

        let values = series.numeric_values();
        match Summary::compute(&values) {
            Ok(Some(summary)) => {
                summaries.insert(name.to_string(), summary);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(metric = name, error = %e, "Failed to calculate summary, using zeroed statistics");
                summaries.insert(name.to_string(), Summary::zeroed(values.len()));
            }
        }
    }

    summaries
}

/// Format summaries as a table.
pub fn format_summary_table(summaries: &BTreeMap<String, Summary>) -> String {
    if summaries.is_empty() {
        return "No numeric metrics found.\n".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "\n{:<30} {:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
        "Metric", "Count", "Min", "Avg", "P90", "P95", "P99", "Max"
    ));
    output.push_str(&"-".repeat(110));
    output.push('\n');

    for (name, summary) in summaries {
        output.push_str(&summary.format_table_row(name));
        output.push('\n');
    }

    output
}
