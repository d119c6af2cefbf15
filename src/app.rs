//! Application wiring
//!
//! Connects the drop directory, the batch protocol, the in-process queue, the
//! single-message protocol and the SQLite sink into one running service:
//!
//! ```text
//! DirectoryFileSource ─► batch protocol ─► ChannelQueue ─► single-message protocol ─► SqliteSink
//!                              └─────────── (batch_target = "sql") ──────────────────────┘
//! ```

use crate::config::{BatchTarget, RoutingConfig};
use crate::core::pipeline::Pipeline;
use crate::core::traits::Dispatcher;
use crate::sinks::{ChannelQueue, QueueDispatcher, SqlDispatcher, SqliteSink};
use crate::sources::DirectoryFileSource;
use crate::types::{PipelineError, Result};
use crate::worker::{run_file_worker, run_queue_worker};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// SQLite database name that selects a private in-memory database
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// A fully wired pipeline, ready to run
pub struct Application {
    config: RoutingConfig,
    pipeline: Arc<Pipeline>,
    files: Arc<DirectoryFileSource>,
    queue: Arc<ChannelQueue>,
    sql: SqliteSink,
}

impl Application {
    /// Validate the configuration and connect every component
    ///
    /// Runs the optional setup SQL and checks the statement template compiles,
    /// so a broken database configuration fails here rather than per record.
    pub fn build(config: RoutingConfig) -> Result<Self> {
        config.validate()?;

        let sql = if config.sql.database == IN_MEMORY_DATABASE {
            SqliteSink::open_in_memory(config.sql.statement.clone())
        } else {
            SqliteSink::open(&config.sql.database, config.sql.statement.clone())
        }
        .map_err(|e| {
            PipelineError::fatal_configuration(format!(
                "cannot open database '{}': {}",
                config.sql.database, e
            ))
        })?;
        if let Some(init) = &config.sql.init {
            sql.run_setup(init)?;
        }
        sql.verify_statement()?;

        let queue = Arc::new(
            ChannelQueue::new(config.queue.queue_name.clone(), config.queue.capacity)
                .with_max_redeliveries(config.queue.max_redeliveries),
        );
        let sql_dispatcher: Arc<dyn Dispatcher> =
            Arc::new(SqlDispatcher::new(Arc::new(sql.clone())));
        let batch_dispatcher: Arc<dyn Dispatcher> = match config.pipeline.batch_target {
            BatchTarget::Queue => Arc::new(QueueDispatcher::new(queue.clone())),
            BatchTarget::Sql => sql_dispatcher.clone(),
        };

        let pipeline = Pipeline::from_config(&config, batch_dispatcher, sql_dispatcher)?;
        let files = Arc::new(DirectoryFileSource::new(&config.file_source.path));

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            files,
            queue,
            sql,
        })
    }

    /// The SQL sink, for inspecting what was stored
    pub fn sql(&self) -> &SqliteSink {
        &self.sql
    }

    /// Run both workers until `shutdown` fires
    ///
    /// On shutdown the file worker stops after its current file, then the
    /// queue is closed and the queue worker drains what is left before
    /// returning. Messages that were never stored are logged with their body.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            endpoint = %self.config.file_source.endpoint(),
            queue = %self.queue.name(),
            database = %self.config.sql.database,
            batch_target = ?self.config.pipeline.batch_target,
            "Starting payments pipeline"
        );

        let file_worker = tokio::spawn(run_file_worker(
            self.pipeline.clone(),
            self.files.clone(),
            self.config.file_source.poll_interval(),
            shutdown.clone(),
        ));
        let queue_worker = tokio::spawn(run_queue_worker(
            self.pipeline.clone(),
            self.queue.clone(),
            CancellationToken::new(),
        ));

        shutdown.cancelled().await;
        info!("Shutdown requested");

        let file_result = file_worker.await;
        self.queue.close();
        let queue_result = queue_worker.await;

        file_result.map_err(|e| PipelineError::Io {
            message: format!("file worker failed: {}", e),
        })?;
        let acknowledged = queue_result.map_err(|e| PipelineError::Io {
            message: format!("queue worker failed: {}", e),
        })?;

        let undelivered = self.queue.report_undelivered().await;
        info!(acknowledged, undelivered, "Payments pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RoutingConfig {
        let mut config = RoutingConfig::default();
        config.sql.database = IN_MEMORY_DATABASE.to_string();
        config
    }

    #[test]
    fn test_build_with_defaults_in_memory() {
        assert!(Application::build(config()).is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_statement() {
        let mut config = config();
        config.sql.statement = "INSERT INTO missing_table VALUES (:amount)".to_string();

        let result = Application::build(config);

        assert!(matches!(result, Err(PipelineError::FatalConfiguration { .. })));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = config();
        config.queue.capacity = 0;

        assert!(matches!(
            Application::build(config),
            Err(PipelineError::FatalConfiguration { .. })
        ));
    }
}
