//! Static HTML report rendering.
//!
//! The report is a single self-contained document: inline CSS, no scripts,
//! no external assets. Only a fixed set of well-known metrics get a card;
//! everything else stays in the summary map and is left out of the page.

use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::errors::ReportError;
use crate::summary::Summary;
use crate::thresholds::{ThresholdOutcome, ThresholdResult};

const NOT_AVAILABLE: &str = "N/A";

/// How a metric's values are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    /// Milliseconds, two decimals.
    Duration,
    /// Fraction shown as a percentage, two decimals.
    Rate,
    /// Digit-grouped number.
    Count,
}

impl ValueFormat {
    pub fn format(&self, value: f64) -> String {
        match self {
            ValueFormat::Duration => format!("{:.2}ms", value),
            ValueFormat::Rate => format!("{:.2}%", value * 100.0),
            ValueFormat::Count => format_grouped(value),
        }
    }
}

/// A metric that gets a card in the report.
#[derive(Debug, Clone, Copy)]
pub struct CardSpec {
    pub metric: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub format: ValueFormat,
}

/// Metrics rendered as cards, in display order.
pub const KEY_METRICS: [CardSpec; 5] = [
    CardSpec {
        metric: "http_reqs",
        title: "HTTP Requests",
        icon: "🌐",
        format: ValueFormat::Count,
    },
    CardSpec {
        metric: "http_req_duration",
        title: "Response Time",
        icon: "⏱️",
        format: ValueFormat::Duration,
    },
    CardSpec {
        metric: "http_req_failed",
        title: "Failed Requests",
        icon: "❌",
        format: ValueFormat::Rate,
    },
    CardSpec {
        metric: "vus",
        title: "Virtual Users",
        icon: "👥",
        format: ValueFormat::Count,
    },
    CardSpec {
        metric: "iterations",
        title: "Iterations",
        icon: "🔄",
        format: ValueFormat::Count,
    },
];

/// Everything the renderer needs.
#[derive(Debug, Clone, Copy)]
pub struct ReportData<'a> {
    pub summaries: &'a BTreeMap<String, Summary>,
    pub thresholds: &'a [ThresholdResult],
    /// Samples discarded by the per-metric cap.
    pub dropped_points: u64,
}

/// Insert thousands separators into a string of ASCII digits.
fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format an integer count with thousands separators, e.g. `12,345`.
pub fn format_count(count: usize) -> String {
    group_digits(&count.to_string())
}

/// Format a number with thousands separators and at most three decimals.
///
/// Trailing zero decimals are dropped: `1234.5` → `1,234.5`, `7.0` → `7`.
pub fn format_grouped(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::new();
    if value < 0.0 && (int_part != "0" || !frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(&group_digits(int_part));
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn render_stat(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!(
        r#"
                <div class="stat">
                    <span class="stat-label">{}</span>
                    <span class="stat-value">{}</span>
                </div>"#,
        label,
        escape_html(value)
    ));
}

fn render_card(out: &mut String, card: &CardSpec, summary: &Summary) {
    out.push_str(&format!(
        r#"
        <div class="metric-card" id="card-{}">
            <h3>{} {}</h3>
            <div class="metric-stats">"#,
        card.metric, card.icon, card.title
    ));
    render_stat(out, "Count", &format_count(summary.count));
    render_stat(out, "Average", &card.format.format(summary.avg));
    render_stat(out, "Min", &card.format.format(summary.min));
    render_stat(out, "Max", &card.format.format(summary.max));
    render_stat(out, "95th Percentile", &card.format.format(summary.p95));
    out.push_str(
        r#"
            </div>
        </div>"#,
    );
}

/// Metric cards for the well-known metrics present in `summaries`.
pub fn render_metric_cards(summaries: &BTreeMap<String, Summary>) -> String {
    let mut out = String::new();
    for card in KEY_METRICS.iter() {
        if let Some(summary) = summaries.get(card.metric) {
            render_card(&mut out, card, summary);
        }
    }
    out
}

fn status_class(outcome: &ThresholdOutcome) -> &'static str {
    match outcome {
        ThresholdOutcome::Passed { .. } => "status-good",
        ThresholdOutcome::Failed { .. } => "status-danger",
        ThresholdOutcome::NoData | ThresholdOutcome::Invalid(_) => "status-warning",
    }
}

/// Thresholds table, or nothing when there are no thresholds.
pub fn render_thresholds(results: &[ThresholdResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut out = String::from(
        r#"
            <div class="chart-container">
                <div class="chart-title">🎯 Thresholds</div>
                <table class="thresholds">
                    <tr><th>Metric</th><th>Threshold</th><th>Observed</th><th>Status</th></tr>"#,
    );

    for result in results {
        let observed = match result.outcome.observed() {
            Some(v) => format_grouped(v),
            None => match &result.outcome {
                ThresholdOutcome::Invalid(reason) => reason.clone(),
                _ => NOT_AVAILABLE.to_string(),
            },
        };
        out.push_str(&format!(
            r#"
                    <tr><td>{}</td><td><code>{}</code></td><td>{}</td><td class="{}">{}</td></tr>"#,
            escape_html(&result.spec.metric),
            escape_html(&result.spec.expression),
            escape_html(&observed),
            status_class(&result.outcome),
            result.outcome.label()
        ));
    }

    out.push_str(
        r#"
                </table>
            </div>"#,
    );
    out
}

/// Narrative section restating the headline numbers.
pub fn render_insights(summaries: &BTreeMap<String, Summary>) -> String {
    let total_requests = summaries
        .get("http_reqs")
        .map(|s| format_count(s.count))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let avg_response = summaries
        .get("http_req_duration")
        .map(|s| ValueFormat::Duration.format(s.avg))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let failed = summaries
        .get("http_req_failed")
        .map(|s| ValueFormat::Rate.format(s.avg))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let peak_vus = summaries
        .get("vus")
        .map(|s| format_grouped(s.max))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    format!(
        r#"
            <div class="chart-container">
                <div class="chart-title">📈 Performance Overview</div>
                <p>This report provides detailed insights into your application's performance under load.</p>
                <p><strong>Key Insights:</strong></p>
                <ul>
                    <li>Total HTTP Requests: {}</li>
                    <li>Average Response Time: {}</li>
                    <li>Failed Requests: {}</li>
                    <li>Peak Virtual Users: {}</li>
                </ul>
            </div>"#,
        total_requests, avg_response, failed, peak_vus
    )
}

fn render_dropped_notice(dropped_points: u64) -> String {
    if dropped_points == 0 {
        return String::new();
    }
    format!(
        r#"
            <p class="status-warning">{} data points were dropped after reaching the per-metric sample limit; statistics cover the retained samples only.</p>"#,
        group_digits(&dropped_points.to_string())
    )
}

/// Render the complete HTML document.
pub fn render(data: &ReportData<'_>, generated_at: DateTime<Local>) -> String {
    let timestamp = generated_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let cards = render_metric_cards(data.summaries);
    let thresholds = render_thresholds(data.thresholds);
    let insights = render_insights(data.summaries);
    let dropped = render_dropped_notice(data.dropped_points);

    debug!(
        metrics = data.summaries.len(),
        thresholds = data.thresholds.len(),
        "Rendering HTML report"
    );

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Performance Test Report</title>
    <style>
{STYLE}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>🚀 Performance Test Report</h1>
            <p>Generated on {timestamp}</p>
        </div>

        <div class="content">
            <div class="summary-grid">{cards}
            </div>

            <div class="charts-section">
                <h2>📊 Performance Metrics</h2>{thresholds}{insights}
            </div>
        </div>

        <div class="footer">
            <p>Generated by k6-report</p>
            <p>This report shows detailed performance metrics from your load test</p>{dropped}
        </div>
    </div>
</body>
</html>
"#,
        STYLE = STYLE,
        timestamp = timestamp,
        cards = cards,
        thresholds = thresholds,
        insights = insights,
        dropped = dropped,
    )
}

/// Write the rendered report, replacing any existing file.
pub fn write_report(path: &Path, html: &str) -> Result<(), ReportError> {
    fs::write(path, html).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

const STYLE: &str = r#"        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            padding: 20px;
        }

        .container {
            max-width: 1200px;
            margin: 0 auto;
            background: white;
            border-radius: 12px;
            box-shadow: 0 10px 30px rgba(0,0,0,0.2);
            overflow: hidden;
        }

        .header {
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
            padding: 30px;
            text-align: center;
        }

        .header h1 {
            font-size: 2.5em;
            margin-bottom: 10px;
            font-weight: 300;
        }

        .header p {
            font-size: 1.2em;
            opacity: 0.9;
        }

        .content {
            padding: 30px;
        }

        .summary-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(300px, 1fr));
            gap: 20px;
            margin-bottom: 30px;
        }

        .metric-card {
            background: #f8f9fa;
            border-radius: 8px;
            padding: 20px;
            border-left: 4px solid #667eea;
        }

        .metric-card h3 {
            color: #495057;
            margin-bottom: 15px;
            font-size: 1.2em;
        }

        .metric-stats {
            display: grid;
            grid-template-columns: repeat(2, 1fr);
            gap: 10px;
        }

        .stat {
            display: flex;
            justify-content: space-between;
            padding: 8px 0;
            border-bottom: 1px solid #e9ecef;
        }

        .stat:last-child {
            border-bottom: none;
        }

        .stat-label {
            color: #6c757d;
            font-weight: 500;
        }

        .stat-value {
            color: #495057;
            font-weight: 600;
        }

        .charts-section {
            margin-top: 30px;
        }

        .charts-section h2 {
            color: #495057;
            margin-bottom: 20px;
            font-size: 1.5em;
        }

        .chart-container {
            background: #f8f9fa;
            border-radius: 8px;
            padding: 20px;
            margin-bottom: 20px;
        }

        .chart-title {
            color: #495057;
            margin-bottom: 15px;
            font-size: 1.1em;
        }

        table.thresholds {
            width: 100%;
            border-collapse: collapse;
        }

        table.thresholds th,
        table.thresholds td {
            text-align: left;
            padding: 8px;
            border-bottom: 1px solid #e9ecef;
        }

        .footer {
            background: #f8f9fa;
            padding: 20px;
            text-align: center;
            color: #6c757d;
            border-top: 1px solid #e9ecef;
        }

        .status-good { color: #28a745; }
        .status-warning { color: #ffc107; }
        .status-danger { color: #dc3545; }"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdSpec;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 9, 14, 30, 0).unwrap()
    }

    fn summaries(entries: Vec<(&str, Vec<f64>)>) -> BTreeMap<String, Summary> {
        entries
            .into_iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    Summary::compute(&values).unwrap().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(7.0), "7");
        assert_eq!(format_grouped(1234.5), "1,234.5");
        assert_eq!(format_grouped(0.12345), "0.123");
        assert_eq!(format_grouped(-2500.25), "-2,500.25");
        assert_eq!(format_grouped(-0.0001), "0");
    }

    #[test]
    fn test_value_formats() {
        assert_eq!(ValueFormat::Duration.format(100.0), "100.00ms");
        assert_eq!(ValueFormat::Rate.format(0.0525), "5.25%");
        assert_eq!(ValueFormat::Count.format(20.0), "20");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_cards_only_for_key_metrics() {
        let s = summaries(vec![
            ("http_req_duration", vec![80.0, 120.0]),
            ("my_custom_metric", vec![1.0]),
        ]);
        let cards = render_metric_cards(&s);
        assert!(cards.contains("Response Time"));
        assert!(cards.contains("100.00ms"));
        assert!(!cards.contains("my_custom_metric"));
        assert!(!cards.contains("HTTP Requests"));
    }

    #[test]
    fn test_cards_in_display_order() {
        let s = summaries(vec![
            ("iterations", vec![1.0]),
            ("http_reqs", vec![1.0]),
            ("vus", vec![5.0]),
        ]);
        let cards = render_metric_cards(&s);
        let reqs = cards.find("HTTP Requests").unwrap();
        let vus = cards.find("Virtual Users").unwrap();
        let iters = cards.find("Iterations").unwrap();
        assert!(reqs < vus && vus < iters);
    }

    #[test]
    fn test_insights_not_available() {
        let insights = render_insights(&BTreeMap::new());
        assert!(insights.contains("Total HTTP Requests: N/A"));
        assert!(insights.contains("Average Response Time: N/A"));
        assert!(insights.contains("Failed Requests: N/A"));
        assert!(insights.contains("Peak Virtual Users: N/A"));
    }

    #[test]
    fn test_insights_values() {
        let s = summaries(vec![
            ("http_reqs", vec![1.0, 1.0, 1.0]),
            ("http_req_duration", vec![80.0, 120.0]),
            ("http_req_failed", vec![0.0, 1.0, 0.0, 0.0]),
            ("vus", vec![2.0, 10.0, 4.0]),
        ]);
        let insights = render_insights(&s);
        assert!(insights.contains("Total HTTP Requests: 3"));
        assert!(insights.contains("Average Response Time: 100.00ms"));
        assert!(insights.contains("Failed Requests: 25.00%"));
        assert!(insights.contains("Peak Virtual Users: 10"));
    }

    #[test]
    fn test_thresholds_table() {
        let results = vec![
            ThresholdResult {
                spec: ThresholdSpec::new("http_req_duration", "p(95)<2000"),
                outcome: ThresholdOutcome::Passed { observed: 120.0 },
            },
            ThresholdResult {
                spec: ThresholdSpec::new("checks", "rate>0.9"),
                outcome: ThresholdOutcome::NoData,
            },
        ];
        let table = render_thresholds(&results);
        assert!(table.contains("p(95)&lt;2000"));
        assert!(table.contains(r#"<td class="status-good">PASS</td>"#));
        assert!(table.contains(r#"<td class="status-warning">NO DATA</td>"#));
        assert!(render_thresholds(&[]).is_empty());
    }

    #[test]
    fn test_render_document() {
        let s = summaries(vec![("http_reqs", vec![1.0, 1.0])]);
        let html = render(
            &ReportData {
                summaries: &s,
                thresholds: &[],
                dropped_points: 0,
            },
            fixed_time(),
        );
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Generated on 2024-05-09 14:30:00"));
        assert!(html.contains("HTTP Requests"));
        assert!(!html.contains("data points were dropped"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_render_dropped_notice() {
        let html = render(
            &ReportData {
                summaries: &BTreeMap::new(),
                thresholds: &[],
                dropped_points: 12_500,
            },
            fixed_time(),
        );
        assert!(html.contains("12,500 data points were dropped"));
    }
}
