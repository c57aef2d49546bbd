//! The end-to-end report run: ingest, summarize, check thresholds, render, write.

use chrono::Local;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::Config;
use crate::errors::ReportError;
use crate::ingest::{IngestStats, MetricStore};
use crate::report::{render, write_report, ReportData};
use crate::summary::{format_summary_table, summarize, Summary};
use crate::thresholds::{collect_thresholds, evaluate_all, ThresholdResult};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub ingest: IngestStats,
    pub summaries: BTreeMap<String, Summary>,
    pub thresholds: Vec<ThresholdResult>,
}

impl ReportOutcome {
    pub fn failed_thresholds(&self) -> usize {
        self.thresholds.iter().filter(|t| t.failed()).count()
    }
}

/// Generate the report described by `config`, narrating each stage.
///
/// Nothing is written unless every earlier stage succeeded.
pub fn generate_report(config: &Config) -> Result<ReportOutcome, ReportError> {
    println!("📊 Parsing k6 JSON data...");
    let mut store = MetricStore::from_config(config);
    let ingest = store.ingest_file(&config.input_path)?;
    println!("   {}", ingest.format());

    println!("📈 Calculating summary statistics...");
    let summaries = summarize(&store);
    print!("{}", format_summary_table(&summaries));

    println!("🎯 Evaluating thresholds...");
    let specs = collect_thresholds(&config.thresholds, &store);
    let thresholds = evaluate_all(&specs, &store, &summaries);
    for result in &thresholds {
        println!(
            "   {:<8} {} {}",
            result.outcome.label(),
            result.spec.metric,
            result.spec.expression
        );
    }

    println!("🎨 Generating HTML report...");
    let html = render(
        &ReportData {
            summaries: &summaries,
            thresholds: &thresholds,
            dropped_points: store.total_dropped(),
        },
        Local::now(),
    );

    write_report(&config.output_path, &html)?;
    info!(
        output = %config.output_path.display(),
        bytes = html.len(),
        "Report written"
    );

    Ok(ReportOutcome {
        ingest,
        summaries,
        thresholds,
    })
}
