//! Types module
//!
//! Contains core data structures used throughout the pipeline.
//! This module organizes types into logical submodules:
//! - `record`: The payment record model and its field decode rules
//! - `message`: The wire message format and SQL bind parameters
//! - `error`: Error types for the pipeline

pub mod error;
pub mod message;
pub mod record;

pub use error::{PipelineError, Result};
pub use message::{NamedParams, PaymentMessage, SqlValue};
pub use record::{PaymentRecord, RecordField};
