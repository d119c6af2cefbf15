//! Routing configuration
//!
//! Uses `figment` for layered configuration: built-in defaults -> optional TOML
//! file -> environment variables prefixed with `PIPELINE_` (`__` separates
//! nested keys, e.g. `PIPELINE_RETRY__DELAY_MS=250`).
//!
//! The configuration is loaded and validated once at startup and is immutable
//! afterwards.

use crate::core::retry::RetryPolicy;
use crate::io::{CsvSchema, MalformedLinePolicy};
use crate::sinks::channel::DEFAULT_MAX_REDELIVERIES;
use crate::types::{PipelineError, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PIPELINE_";

/// Remote drop directory the batch files are collected from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Path to the private key used to authenticate
    pub private_key: String,
    /// Directory polled for batch files
    pub path: String,
    pub poll_interval_ms: u64,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            username: "pagos".to_string(),
            private_key: String::new(),
            path: "inbox".to_string(),
            poll_interval_ms: 5000,
        }
    }
}

impl FileSourceConfig {
    /// Endpoint rendered for logs, e.g. `sftp://pagos@localhost:22/inbox`
    pub fn endpoint(&self) -> String {
        format!(
            "sftp://{}@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            self.path.trim_start_matches('/')
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Message queue connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub queue_name: String,
    /// Messages the queue holds before senders wait
    pub capacity: usize,
    /// Times a rejected message is delivered again before it is dead-lettered
    pub max_redeliveries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 61616,
            username: String::new(),
            password: String::new(),
            queue_name: "pagos".to_string(),
            capacity: 1024,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
        }
    }
}

/// SQL sink connection and statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// SQLite database file (`:memory:` for a private in-memory database)
    pub database: String,
    /// Statement executed once per record, with named parameters
    pub statement: String,
    /// Optional setup SQL run once at startup
    pub init: Option<String>,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            database: "pagos.db".to_string(),
            statement: "INSERT INTO pagos (nit, valor, fecha_recaudo, codigo_impuesto) \
                        VALUES (:taxpayerId, :amount, :collectionDate, :taxCode)"
                .to_string(),
            init: Some(
                "CREATE TABLE IF NOT EXISTS pagos (\
                 nit TEXT NOT NULL, valor REAL NOT NULL, \
                 fecha_recaudo TEXT NOT NULL, codigo_impuesto TEXT NOT NULL)"
                    .to_string(),
            ),
        }
    }
}

/// Batch file layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub delimiter: String,
    pub skip_header: bool,
    pub on_malformed: MalformedLinePolicy,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            skip_header: true,
            on_malformed: MalformedLinePolicy::FailFast,
        }
    }
}

impl CsvConfig {
    /// Build the parser schema
    ///
    /// # Errors
    ///
    /// `FatalConfiguration` when the delimiter is not exactly one byte.
    pub fn schema(&self) -> Result<CsvSchema> {
        match self.delimiter.as_bytes() {
            [byte] => Ok(CsvSchema::new(*byte, self.skip_header)),
            _ => Err(PipelineError::fatal_configuration(format!(
                "csv.delimiter must be a single byte, got '{}'",
                self.delimiter
            ))),
        }
    }
}

/// Where the batch protocol delivers transformed records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTarget {
    #[default]
    Queue,
    Sql,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch_target: BatchTarget,
    /// Run the transformation again on messages taken from the queue
    pub reapply_transform: bool,
}

/// Complete routing configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub file_source: FileSourceConfig,
    pub queue: QueueConfig,
    pub sql: SqlConfig,
    pub retry: RetryPolicy,
    pub csv: CsvConfig,
    pub pipeline: PipelineConfig,
}

impl RoutingConfig {
    /// Load configuration from defaults, an optional TOML file and the environment
    ///
    /// The result is not validated; call [`RoutingConfig::validate`] before use.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Ok(layered(path, ENV_PREFIX).extract()?)
    }

    /// Check every setting the pipeline relies on
    ///
    /// # Errors
    ///
    /// `FatalConfiguration` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("file_source.path", &self.file_source.path),
            ("queue.queue_name", &self.queue.queue_name),
            ("sql.statement", &self.sql.statement),
            ("sql.database", &self.sql.database),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(PipelineError::fatal_configuration(format!(
                    "{} must not be empty",
                    key
                )));
            }
        }

        for (key, port) in [
            ("file_source.port", self.file_source.port),
            ("queue.port", self.queue.port),
        ] {
            if port == 0 {
                return Err(PipelineError::fatal_configuration(format!(
                    "{} must be non-zero",
                    key
                )));
            }
        }

        if self.file_source.poll_interval_ms == 0 {
            return Err(PipelineError::fatal_configuration(
                "file_source.poll_interval_ms must be non-zero",
            ));
        }
        if self.queue.capacity == 0 {
            return Err(PipelineError::fatal_configuration(
                "queue.capacity must be non-zero",
            ));
        }

        self.csv.schema().map(|_| ())
    }
}

fn layered(path: Option<&Path>, env_prefix: &str) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(RoutingConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file_exact(path));
    }
    figment.merge(Env::prefixed(env_prefix).split("__"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = RoutingConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.pipeline.batch_target, BatchTarget::Queue);
        assert!(!config.pipeline.reapply_transform);
    }

    #[test]
    fn test_endpoint_rendering() {
        let source = FileSourceConfig {
            host: "sftp.example.org".to_string(),
            port: 2222,
            username: "recaudo".to_string(),
            path: "/upload/pagos".to_string(),
            ..FileSourceConfig::default()
        };

        assert_eq!(source.endpoint(), "sftp://recaudo@sftp.example.org:2222/upload/pagos");
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[retry]
delay_ms = 250

[csv]
delimiter = ";"
on_malformed = "skip"

[pipeline]
batch_target = "sql"
"#
        )
        .unwrap();

        let config = RoutingConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.retry.delay_ms, 250);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.csv.schema().unwrap().delimiter, b';');
        assert_eq!(config.csv.on_malformed, MalformedLinePolicy::Skip);
        assert_eq!(config.pipeline.batch_target, BatchTarget::Sql);
        assert_eq!(config.queue, QueueConfig::default());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = RoutingConfig::load(Some(Path::new("/nonexistent/pipeline.toml")));

        assert!(matches!(result, Err(PipelineError::FatalConfiguration { .. })));
    }

    #[test]
    fn test_environment_overrides_nested_keys() {
        std::env::set_var("PIPELINE_ENV_TEST_RETRY__MAX_RETRIES", "5");
        std::env::set_var("PIPELINE_ENV_TEST_QUEUE__QUEUE_NAME", "recaudos");

        let config: RoutingConfig = layered(None, "PIPELINE_ENV_TEST_").extract().unwrap();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.queue.queue_name, "recaudos");
    }

    #[rstest]
    #[case::empty_path(|c: &mut RoutingConfig| c.file_source.path.clear(), "file_source.path")]
    #[case::empty_queue(|c: &mut RoutingConfig| c.queue.queue_name.clear(), "queue.queue_name")]
    #[case::empty_statement(|c: &mut RoutingConfig| c.sql.statement = "  ".into(), "sql.statement")]
    #[case::zero_port(|c: &mut RoutingConfig| c.queue.port = 0, "queue.port")]
    #[case::zero_capacity(|c: &mut RoutingConfig| c.queue.capacity = 0, "queue.capacity")]
    #[case::zero_poll(|c: &mut RoutingConfig| c.file_source.poll_interval_ms = 0, "poll_interval_ms")]
    #[case::long_delimiter(|c: &mut RoutingConfig| c.csv.delimiter = "||".into(), "csv.delimiter")]
    #[case::empty_delimiter(|c: &mut RoutingConfig| c.csv.delimiter.clear(), "csv.delimiter")]
    fn test_validate_rejects(#[case] mutate: fn(&mut RoutingConfig), #[case] key: &str) {
        let mut config = RoutingConfig::default();
        mutate(&mut config);

        match config.validate() {
            Err(PipelineError::FatalConfiguration { message }) => {
                assert!(message.contains(key), "'{}' does not name {}", message, key)
            }
            other => panic!("Expected configuration error, got {:?}", other),
        }
    }
}
