//! Per-metric sample accumulation from a newline-delimited JSON dump.
//!
//! Each metric keeps its samples in arrival order, bounded by a fixed cap so
//! that long endurance runs cannot exhaust memory. Samples past the cap are
//! dropped. The drop is counted per metric and surfaced in the report rather
//! than silently discarded.

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::ReportError;
use crate::events::{Event, MetricKind, MetricMeta, PointData};

/// Default number of samples kept per metric.
pub const DEFAULT_MAX_POINTS_PER_METRIC: usize = 10_000;

/// One accumulated sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// `None` when the point carried a non-numeric value.
    pub value: Option<f64>,
    pub time: Option<DateTime<FixedOffset>>,
}

impl From<&PointData> for Sample {
    fn from(data: &PointData) -> Self {
        Self {
            value: data.numeric_value(),
            time: data.timestamp(),
        }
    }
}

impl Sample {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            time: None,
        }
    }
}

/// Whether a pushed sample was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// The metric already holds the maximum number of samples.
    Dropped,
}

/// Accumulated samples and metadata for one metric.
#[derive(Debug, Clone, Default)]
pub struct MetricSeries {
    meta: Option<MetricMeta>,
    samples: Vec<Sample>,
    dropped: u64,
    /// Running totals over every numeric point received, dropped ones included.
    total_count: u64,
    total_sum: f64,
}

impl MetricSeries {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples discarded because the cap was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Numeric points received for the metric, including those past the cap.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Sum of every numeric point received, including those past the cap.
    pub fn total_sum(&self) -> f64 {
        self.total_sum
    }

    pub fn meta(&self) -> Option<&MetricMeta> {
        self.meta.as_ref()
    }

    /// Declared metric kind, if a `Metric` record named one.
    pub fn kind(&self) -> Option<MetricKind> {
        self.meta.as_ref().and_then(|m| m.kind)
    }

    /// Numeric samples in arrival order, with non-numeric and NaN entries removed.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.samples
            .iter()
            .filter_map(|s| s.value)
            .filter(|v| !v.is_nan())
            .collect()
    }

    /// Last numeric sample received.
    pub fn last_value(&self) -> Option<f64> {
        self.samples
            .iter()
            .rev()
            .filter_map(|s| s.value)
            .find(|v| !v.is_nan())
    }
}

/// Counters describing one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Non-blank lines decoded.
    pub lines: usize,
    pub metric_records: usize,
    pub points: usize,
    /// Points discarded by the per-metric cap.
    pub dropped: u64,
    /// Well-formed lines that are neither `Metric` nor `Point` records.
    pub ignored: usize,
}

impl IngestStats {
    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "{} lines: {} metric definitions, {} points ({} dropped), {} ignored",
            self.lines, self.metric_records, self.points, self.dropped, self.ignored
        )
    }
}

/// Mapping from metric name to its accumulated series.
#[derive(Debug, Clone)]
pub struct MetricStore {
    series: BTreeMap<String, MetricSeries>,
    max_points_per_metric: usize,
    first_point_at: Option<DateTime<FixedOffset>>,
    last_point_at: Option<DateTime<FixedOffset>>,
}

impl MetricStore {
    /// Create an empty store keeping at most `max_points_per_metric` samples per metric.
    pub fn new(max_points_per_metric: usize) -> Self {
        Self {
            series: BTreeMap::new(),
            max_points_per_metric,
            first_point_at: None,
            last_point_at: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_points_per_metric)
    }

    /// Register a metric name, replacing any metadata seen before.
    ///
    /// Samples already accumulated for the metric are kept.
    pub fn register(&mut self, name: &str, meta: MetricMeta) {
        let series = self.series.entry(name.to_string()).or_default();
        series.meta = Some(meta);
    }

    /// Append a sample to a metric, unless the metric is already full.
    pub fn push(&mut self, name: &str, sample: Sample) -> PushOutcome {
        if let Some(time) = sample.time {
            self.track_time(time);
        }

        let series = self.series.entry(name.to_string()).or_default();

        if let Some(value) = sample.value.filter(|v| !v.is_nan()) {
            series.total_count += 1;
            series.total_sum += value;
        }

        if series.samples.len() >= self.max_points_per_metric {
            if series.dropped == 0 {
                warn!(
                    metric = name,
                    max_points = self.max_points_per_metric,
                    "Sample limit reached for metric, further points will be dropped"
                );
            }
            series.dropped += 1;
            return PushOutcome::Dropped;
        }

        series.samples.push(sample);
        PushOutcome::Stored
    }

    /// Apply one decoded record to the store.
    pub fn apply(&mut self, event: Event, stats: &mut IngestStats) {
        match event {
            Event::Metric { metric, data } => {
                stats.metric_records += 1;
                self.register(&metric, data);
            }
            Event::Point { metric, data } => {
                stats.points += 1;
                if self.push(&metric, Sample::from(&data)) == PushOutcome::Dropped {
                    stats.dropped += 1;
                }
            }
            Event::Other => {
                stats.ignored += 1;
            }
        }
    }

    /// Ingest a whole newline-delimited JSON document.
    ///
    /// Blank lines are skipped. The first line that fails to decode aborts
    /// ingestion with its 1-based line number.
    pub fn ingest_str(&mut self, contents: &str) -> Result<IngestStats, ReportError> {
        let mut stats = IngestStats::default();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event = Event::parse_line(line).map_err(|source| ReportError::MalformedLine {
                line: idx + 1,
                source,
            })?;

            if matches!(event, Event::Other) {
                debug!(line = idx + 1, "Ignoring line that is not a metric or point record");
            }

            stats.lines += 1;
            self.apply(event, &mut stats);
        }

        debug!(
            lines = stats.lines,
            points = stats.points,
            metrics = self.series.len(),
            dropped = stats.dropped,
            "Ingested metrics stream"
        );

        Ok(stats)
    }

    /// Read a metrics file fully and ingest it.
    pub fn ingest_file(&mut self, path: &Path) -> Result<IngestStats, ReportError> {
        let contents = fs::read_to_string(path).map_err(|source| ReportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.ingest_str(&contents)
    }

    pub fn get(&self, name: &str) -> Option<&MetricSeries> {
        self.series.get(name)
    }

    /// Iterate over metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricSeries)> {
        self.series.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn capacity_per_metric(&self) -> usize {
        self.max_points_per_metric
    }

    /// Total samples dropped across all metrics.
    pub fn total_dropped(&self) -> u64 {
        self.series.values().map(|s| s.dropped).sum()
    }

    /// Span between the earliest and latest point timestamps seen.
    ///
    /// Points dropped by the cap still extend the window.
    pub fn run_window(&self) -> Option<Duration> {
        let (first, last) = (self.first_point_at?, self.last_point_at?);
        (last - first).to_std().ok()
    }

    fn track_time(&mut self, time: DateTime<FixedOffset>) {
        if self.first_point_at.map_or(true, |t| time < t) {
            self.first_point_at = Some(time);
        }
        if self.last_point_at.map_or(true, |t| time > t) {
            self.last_point_at = Some(time);
        }
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS_PER_METRIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(metric: &str, value: &str) -> String {
        format!(
            r#"{{"type":"Point","metric":"{}","data":{{"value":{}}}}}"#,
            metric, value
        )
    }

    #[test]
    fn test_points_accumulate_in_order() {
        let mut store = MetricStore::default();
        let input = [point("latency", "3"), point("latency", "1"), point("latency", "2")].join("\n");

        let stats = store.ingest_str(&input).unwrap();
        assert_eq!(stats.points, 3);

        let series = store.get("latency").unwrap();
        assert_eq!(series.numeric_values(), vec![3.0, 1.0, 2.0]);
        assert_eq!(series.last_value(), Some(2.0));
    }

    #[test]
    fn test_metric_record_registers_name() {
        let mut store = MetricStore::default();
        store
            .ingest_str(r#"{"type":"Metric","metric":"vus","data":{"type":"gauge"}}"#)
            .unwrap();

        let series = store.get("vus").unwrap();
        assert!(series.is_empty());
        assert_eq!(series.kind(), Some(MetricKind::Gauge));
    }

    #[test]
    fn test_metric_record_keeps_samples() {
        let mut store = MetricStore::default();
        let input = [
            point("vus", "5"),
            r#"{"type":"Metric","metric":"vus","data":{"type":"gauge"}}"#.to_string(),
        ]
        .join("\n");
        store.ingest_str(&input).unwrap();

        let series = store.get("vus").unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.kind(), Some(MetricKind::Gauge));
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut store = MetricStore::default();
        let input = format!("\n{}\n   \n{}\n\n", point("m", "1"), point("m", "2"));
        let stats = store.ingest_str(&input).unwrap();
        assert_eq!(stats.lines, 2);
        assert_eq!(store.get("m").unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut store = MetricStore::default();
        let input = format!("{}\n{}\n", point("m", "1"), r#"{"type":"Point""#);
        let err = store.ingest_str(&input).unwrap_err();
        match err {
            ReportError::MalformedLine { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_cap_drops_newest() {
        let mut store = MetricStore::new(3);
        let outcomes: Vec<_> = (0..5)
            .map(|i| store.push("m", Sample::value(i as f64)))
            .collect();

        assert_eq!(
            outcomes,
            vec![
                PushOutcome::Stored,
                PushOutcome::Stored,
                PushOutcome::Stored,
                PushOutcome::Dropped,
                PushOutcome::Dropped
            ]
        );
        let series = store.get("m").unwrap();
        assert_eq!(series.numeric_values(), vec![0.0, 1.0, 2.0]);
        assert_eq!(series.dropped(), 2);
        assert_eq!(store.total_dropped(), 2);
    }

    #[test]
    fn test_totals_include_dropped_points() {
        let mut store = MetricStore::new(2);
        for v in [1.0, 2.0, 3.0, 4.0] {
            store.push("m", Sample::value(v));
        }
        store.push(
            "m",
            Sample {
                value: None,
                time: None,
            },
        );

        let series = store.get("m").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.total_count(), 4);
        assert_eq!(series.total_sum(), 10.0);
    }

    #[test]
    fn test_cap_is_per_metric() {
        let mut store = MetricStore::new(1);
        assert_eq!(store.push("a", Sample::value(1.0)), PushOutcome::Stored);
        assert_eq!(store.push("b", Sample::value(1.0)), PushOutcome::Stored);
        assert_eq!(store.push("a", Sample::value(2.0)), PushOutcome::Dropped);
        assert_eq!(store.get("b").unwrap().dropped(), 0);
    }

    #[test]
    fn test_non_numeric_samples_count_towards_cap() {
        let mut store = MetricStore::new(2);
        let input = [point("m", r#""x""#), point("m", "null"), point("m", "7")].join("\n");
        let stats = store.ingest_str(&input).unwrap();

        assert_eq!(stats.dropped, 1);
        let series = store.get("m").unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.numeric_values().is_empty());
    }

    #[test]
    fn test_unknown_records_ignored() {
        let mut store = MetricStore::default();
        let stats = store
            .ingest_str(r#"{"type":"Summary","metric":"m","data":{}}"#)
            .unwrap();
        assert_eq!(stats.ignored, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_line_without_type_is_skipped() {
        let mut store = MetricStore::default();
        let input = [
            r#"{"metric":"x","data":{"value":1}}"#.to_string(),
            r#"{"type":"Point","data":{"value":1}}"#.to_string(),
            point("http_reqs", "1"),
        ]
        .join("\n");

        let stats = store.ingest_str(&input).unwrap();
        assert_eq!(stats.ignored, 2);
        assert_eq!(stats.points, 1);
        assert!(store.get("x").is_none());
        assert_eq!(store.get("http_reqs").unwrap().len(), 1);
    }

    #[test]
    fn test_run_window() {
        let mut store = MetricStore::default();
        let input = [
            r#"{"type":"Point","metric":"http_reqs","data":{"time":"2024-05-09T14:00:10+00:00","value":1}}"#,
            r#"{"type":"Point","metric":"http_reqs","data":{"time":"2024-05-09T14:00:00+00:00","value":1}}"#,
            r#"{"type":"Point","metric":"vus","data":{"time":"2024-05-09T14:00:20+00:00","value":3}}"#,
        ]
        .join("\n");
        store.ingest_str(&input).unwrap();

        assert_eq!(store.run_window(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_run_window_without_timestamps() {
        let mut store = MetricStore::default();
        store.ingest_str(&point("m", "1")).unwrap();
        assert_eq!(store.run_window(), None);
    }

    #[test]
    fn test_missing_file() {
        let mut store = MetricStore::default();
        let err = store
            .ingest_file(Path::new("/definitely/not/here/metrics.json"))
            .unwrap_err();
        assert!(matches!(err, ReportError::Read { .. }));
    }
}
