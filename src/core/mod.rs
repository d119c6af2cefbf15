//! Core pipeline module
//!
//! This module contains the processing components shared by both entry protocols:
//! - `traits` - Collaborator contracts for sources, sinks and dispatch
//! - `transform` - Tax-code transformation rules
//! - `retry` - Fixed-delay retry scope for units of work
//! - `pipeline` - Stage sequencing for the batch and single-message protocols

pub mod pipeline;
pub mod retry;
pub mod traits;
pub mod transform;

pub use pipeline::{BatchOutcome, Pipeline};
pub use retry::RetryPolicy;
pub use traits::{Delivery, Dispatcher, FileSource, QueueSink, QueueSource, SourceFile, SqlSink};
pub use transform::{TransformRegistry, TransformRule};
