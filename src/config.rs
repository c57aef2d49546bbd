use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

use crate::ingest::DEFAULT_MAX_POINTS_PER_METRIC;
use crate::thresholds::{default_thresholds, ThresholdSpec};

/// Errors raised while building the configuration from the command line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Expected 2 arguments (input JSON file, output HTML file), got {0}")]
    MissingArguments(usize),
}

/// Main configuration for a report run.
///
/// Built once in `main` and handed to every stage by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Samples kept per metric; later samples are dropped and counted.
    pub max_points_per_metric: usize,
    /// Pass/fail criteria checked in addition to those declared in the dump.
    pub thresholds: Vec<ThresholdSpec>,
}

impl Config {
    /// Creates a configuration with the default sample cap and thresholds.
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            max_points_per_metric: DEFAULT_MAX_POINTS_PER_METRIC,
            thresholds: default_thresholds(),
        }
    }

    /// Builds the configuration from positional arguments (program name excluded).
    ///
    /// The first two arguments are the input and output paths. Anything after
    /// them is ignored with a warning.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        let args: Vec<PathBuf> = args.into_iter().map(Into::into).collect();

        if args.len() < 2 {
            return Err(ConfigError::MissingArguments(args.len()));
        }

        if args.len() > 2 {
            warn!(
                ignored = args.len() - 2,
                "Ignoring extra command-line arguments"
            );
        }

        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(input), Some(output)) => Ok(Self::new(input, output)),
            _ => Err(ConfigError::MissingArguments(0)),
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        println!("Generating load test report:");
        println!("  Input JSON: {}", self.input_path.display());
        println!("  Output HTML: {}", self.output_path.display());
        println!("  Max Points Per Metric: {}", self.max_points_per_metric);
        println!("  Default Thresholds: {}", self.thresholds.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args_two_paths() {
        let config = Config::from_args(["results/run.json", "results/run.html"]).unwrap();
        assert_eq!(config.input_path, PathBuf::from("results/run.json"));
        assert_eq!(config.output_path, PathBuf::from("results/run.html"));
        assert_eq!(config.max_points_per_metric, 10_000);
        assert!(!config.thresholds.is_empty());
    }

    #[test]
    fn test_from_args_too_few() {
        assert_eq!(
            Config::from_args(Vec::<String>::new()).unwrap_err(),
            ConfigError::MissingArguments(0)
        );
        assert_eq!(
            Config::from_args(["only.json"]).unwrap_err(),
            ConfigError::MissingArguments(1)
        );
    }

    #[test]
    fn test_from_args_ignores_extras() {
        let config = Config::from_args(["in.json", "out.html", "--verbose"]).unwrap();
        assert_eq!(config.input_path, PathBuf::from("in.json"));
        assert_eq!(config.output_path, PathBuf::from("out.html"));
    }
}
