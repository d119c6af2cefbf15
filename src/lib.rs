//! Payments Pipeline Library
//! # Overview
//!
//! This library routes tax payment batches from a drop directory to a message
//! queue and on to a SQL store, applying per-tax-code amount rules on the way.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (PaymentRecord, PaymentMessage, errors)
//! - [`io`] - CSV batch parsing
//! - [`core`] - Pipeline components:
//!   - [`core::transform`] - Tax-code transformation rules
//!   - [`core::retry`] - Retry scope for whole units of work
//!   - [`core::pipeline`] - Batch and single-message protocols
//! - [`sinks`] - Queue and SQL dispatchers and their sink adapters
//! - [`sources`] - Batch file sources
//! - [`worker`] - Long-running file and queue workers
//! - [`config`] - Layered routing configuration
//! - [`app`] - Wiring of the full service
//! - [`cli`] - CLI arguments parsing
//!
//! # Entry Protocols
//!
//! - **Batch**: a CSV file is parsed record by record; each record is
//!   transformed and dispatched before the next line is read. The file is
//!   acknowledged (deleted) only when every record went through.
//! - **Single message**: a JSON message is decoded and dispatched to the SQL
//!   statement, then acknowledged.
//!
//! Either unit of work is retried as a whole (3 retries, 1 second apart by
//! default). Records dispatched on a failed attempt are dispatched again on
//! the next one.
//!
//! # Transformation Rules
//!
//! - **IMP_001**: amount multiplied by 0.95
//! - **any other code**: record passed through unchanged

// Module declarations
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod sinks;
pub mod sources;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testing;

pub use app::Application;
pub use config::RoutingConfig;
pub use core::{Pipeline, RetryPolicy, TransformRegistry};
pub use io::{parse_batch, CsvSchema};
pub use types::{PaymentMessage, PaymentRecord, PipelineError, Result};
