use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Collect payment batch files, transform them and deliver them to the queue and database
#[derive(Parser, Debug)]
#[command(name = "payments-pipeline")]
#[command(about = "Route tax payment batches from a drop directory to a queue and a SQL store", long_about = None)]
pub struct CliArgs {
    /// Routing configuration file (TOML)
    #[arg(
        long = "config",
        short = 'c',
        value_name = "FILE",
        help = "Path to the TOML routing configuration (defaults and PIPELINE_* variables apply otherwise)"
    )]
    pub config: Option<PathBuf>,

    /// Log filter directive
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "info",
        help = "Log level or filter directive; RUST_LOG takes precedence when set"
    )]
    pub log_level: String,

    /// Log output format
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "text",
        help = "Log output format: 'text' or 'json'"
    )]
    pub log_format: LogFormat,

    /// Runtime worker threads
    #[arg(
        long = "worker-threads",
        value_name = "COUNT",
        help = "Number of runtime worker threads (default: CPU cores)"
    )]
    pub worker_threads: Option<usize>,
}

/// Available log output formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl CliArgs {
    /// Worker thread count, falling back to the number of CPU cores when unset or zero
    pub fn worker_threads(&self) -> usize {
        match self.worker_threads {
            Some(count) if count > 0 => count,
            _ => num_cpus::get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_format(&["program"], LogFormat::Text)]
    #[case::explicit_text(&["program", "--log-format", "text"], LogFormat::Text)]
    #[case::explicit_json(&["program", "--log-format", "json"], LogFormat::Json)]
    fn test_log_format_parsing(#[case] args: &[&str], #[case] expected: LogFormat) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.log_format, expected);
    }

    #[rstest]
    #[case::no_options(&["program"], None, "info")]
    #[case::long_config(&["program", "--config", "pipeline.toml"], Some("pipeline.toml"), "info")]
    #[case::short_config(&["program", "-c", "pipeline.toml"], Some("pipeline.toml"), "info")]
    #[case::log_level(&["program", "--log-level", "payments_pipeline=debug"], None, "payments_pipeline=debug")]
    fn test_options(
        #[case] args: &[&str],
        #[case] config: Option<&str>,
        #[case] log_level: &str,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.config, config.map(PathBuf::from));
        assert_eq!(parsed.log_level, log_level);
    }

    #[rstest]
    #[case::default(&["program"], num_cpus::get())]
    #[case::custom(&["program", "--worker-threads", "4"], 4)]
    #[case::zero_falls_back(&["program", "--worker-threads", "0"], num_cpus::get())]
    fn test_worker_threads(#[case] args: &[&str], #[case] expected: usize) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.worker_threads(), expected);
    }

    #[rstest]
    #[case::invalid_format(&["program", "--log-format", "xml"])]
    #[case::invalid_threads(&["program", "--worker-threads", "many"])]
    #[case::unexpected_positional(&["program", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
