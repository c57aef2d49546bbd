use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use k6_report::config::Config;
use k6_report::pipeline::generate_report;

/// Prints command-line usage.
fn print_usage() {
    eprintln!("Usage: k6-report <json-file> <output-html-file>");
    eprintln!("Example: k6-report results/k6-test.json results/k6-report.html");
    eprintln!();
    eprintln!("  json-file         - Newline-delimited JSON written by `k6 run --out json=...`");
    eprintln!("  output-html-file  - Destination of the HTML report (overwritten if present)");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: warn).");
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_args(std::env::args_os().skip(1)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    config.print_summary();

    match generate_report(&config) {
        Ok(outcome) => {
            let failed = outcome.failed_thresholds();
            if failed > 0 {
                println!("⚠️  {} threshold(s) failed", failed);
            }
            println!("✅ HTML report generated: {}", config.output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(kind = e.label(), error = %e, "Report generation failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
