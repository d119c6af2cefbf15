//! SQLite statement sink
//!
//! Runs one pre-configured statement per record, binding the message fields as
//! named parameters (`:taxpayerId`, `:amount`, `:collectionDate`, `:taxCode`).
//! The template may use any subset of them; a parameter with no value fails the
//! execution.
//!
//! rusqlite is blocking, so each execution runs on tokio's blocking pool.

use crate::core::traits::SqlSink;
use crate::types::{NamedParams, PipelineError, Result, SqlValue};
use async_trait::async_trait;
use rusqlite::{Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQL sink backed by a single SQLite connection
#[derive(Debug, Clone)]
pub struct SqliteSink {
    connection: Arc<Mutex<Connection>>,
    statement: Arc<str>,
}

impl SqliteSink {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>, statement: impl Into<String>) -> Result<Self> {
        let connection = Connection::open(path)?;
        Ok(Self::with_connection(connection, statement))
    }

    /// Open a private in-memory database
    pub fn open_in_memory(statement: impl Into<String>) -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self::with_connection(connection, statement))
    }

    fn with_connection(connection: Connection, statement: impl Into<String>) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            statement: Arc::from(statement.into()),
        }
    }

    /// Run setup SQL (e.g. `CREATE TABLE IF NOT EXISTS ...`) before processing starts
    ///
    /// # Errors
    ///
    /// Returns `FatalConfiguration`, since a database that cannot be prepared
    /// must stop the pipeline from starting.
    pub fn run_setup(&self, sql: &str) -> Result<()> {
        lock(&self.connection)?
            .execute_batch(sql)
            .map_err(|e| PipelineError::fatal_configuration(format!("setup SQL failed: {}", e)))
    }

    /// Check the statement template compiles against the current schema
    pub fn verify_statement(&self) -> Result<()> {
        let connection = lock(&self.connection)?;
        connection.prepare(&self.statement).map(|_| ()).map_err(|e| {
            PipelineError::fatal_configuration(format!(
                "statement '{}' is invalid: {}",
                self.statement, e
            ))
        })
    }

    /// Run a read query and map each row
    pub fn query<T, F>(&self, sql: &str, mut map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let connection = lock(&self.connection)?;
        let mut stmt = connection.prepare(sql)?;
        let rows = stmt.query_map([], |row| map(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
    }
}

fn lock(connection: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    connection
        .lock()
        .map_err(|_| PipelineError::transient_dispatch("sql", "connection lock poisoned"))
}

fn execute_bound(connection: &Connection, statement: &str, params: &NamedParams) -> Result<usize> {
    let mut stmt = connection.prepare_cached(statement)?;

    for index in 1..=stmt.parameter_count() {
        let name = stmt.parameter_name(index).map(str::to_owned).ok_or_else(|| {
            PipelineError::transient_dispatch("sql", format!("parameter {} must be named", index))
        })?;

        match params.get(&name) {
            Some(SqlValue::Text(text)) => stmt.raw_bind_parameter(index, text.as_str())?,
            Some(SqlValue::Real(value)) => stmt.raw_bind_parameter(index, *value)?,
            None => {
                return Err(PipelineError::transient_dispatch(
                    "sql",
                    format!("no value for statement parameter '{}'", name),
                ))
            }
        }
    }

    Ok(stmt.raw_execute()?)
}

#[async_trait]
impl SqlSink for SqliteSink {
    async fn execute(&self, params: &NamedParams) -> Result<()> {
        let connection = Arc::clone(&self.connection);
        let statement = Arc::clone(&self.statement);
        let params = params.clone();

        let changed = tokio::task::spawn_blocking(move || {
            let connection = lock(&connection)?;
            execute_bound(&connection, &statement, &params)
        })
        .await
        .map_err(|e| PipelineError::transient_dispatch("sql", e))??;

        debug!(rows = changed, "Executed statement");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMessage;

    const SETUP: &str = "CREATE TABLE pagos (nit TEXT, valor REAL, fecha_recaudo TEXT, codigo_impuesto TEXT)";
    const INSERT: &str = "INSERT INTO pagos (nit, valor, fecha_recaudo, codigo_impuesto) \
                          VALUES (:taxpayerId, :amount, :collectionDate, :taxCode)";

    fn message(taxpayer_id: &str, amount: f64) -> PaymentMessage {
        PaymentMessage {
            taxpayer_id: taxpayer_id.to_string(),
            amount,
            collection_date: "2024-01-01".to_string(),
            tax_code: "IMP_001".to_string(),
        }
    }

    fn rows(sink: &SqliteSink) -> Vec<(String, f64)> {
        sink.query("SELECT nit, valor FROM pagos ORDER BY rowid", |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_inserts_bound_values() {
        let sink = SqliteSink::open_in_memory(INSERT).unwrap();
        sink.run_setup(SETUP).unwrap();

        sink.execute(&message("900111", 95.0).to_params()).await.unwrap();
        sink.execute(&message("900222", 50.0).to_params()).await.unwrap();

        assert_eq!(
            rows(&sink),
            vec![("900111".to_string(), 95.0), ("900222".to_string(), 50.0)]
        );
    }

    #[tokio::test]
    async fn test_execute_allows_subset_of_params() {
        let sink =
            SqliteSink::open_in_memory("INSERT INTO pagos (nit, valor) VALUES (:taxpayerId, :amount)")
                .unwrap();
        sink.run_setup(SETUP).unwrap();

        sink.execute(&message("900111", 1.5).to_params()).await.unwrap();

        assert_eq!(rows(&sink), vec![("900111".to_string(), 1.5)]);
    }

    #[tokio::test]
    async fn test_execute_unknown_param_is_dispatch_error() {
        let sink =
            SqliteSink::open_in_memory("INSERT INTO pagos (nit) VALUES (:unknown)").unwrap();
        sink.run_setup(SETUP).unwrap();

        let result = sink.execute(&message("900111", 1.5).to_params()).await;

        assert!(matches!(result, Err(PipelineError::TransientDispatch { .. })));
    }

    #[tokio::test]
    async fn test_execute_missing_table_is_dispatch_error() {
        let sink = SqliteSink::open_in_memory(INSERT).unwrap();

        let result = sink.execute(&message("900111", 1.5).to_params()).await;

        assert!(matches!(result, Err(PipelineError::TransientDispatch { .. })));
    }

    #[test]
    fn test_verify_statement() {
        let sink = SqliteSink::open_in_memory(INSERT).unwrap();
        assert!(matches!(
            sink.verify_statement(),
            Err(PipelineError::FatalConfiguration { .. })
        ));

        sink.run_setup(SETUP).unwrap();
        assert!(sink.verify_statement().is_ok());
    }
}
