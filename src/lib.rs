//! HTML reports from load-test metric dumps.
//!
//! Reads the newline-delimited JSON a load-test run writes with
//! `--out json`, summarizes every metric, checks pass/fail thresholds and
//! renders a self-contained HTML page.

pub mod config;
pub mod errors;
pub mod events;
pub mod ingest;
pub mod pipeline;
pub mod report;
pub mod summary;
pub mod thresholds;
