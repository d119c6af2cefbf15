//! Collaborator traits for sources, sinks and dispatch
//!
//! This module defines the contracts the pipeline needs from the outside world.
//! Transfer mechanics, broker clients and database drivers live behind these
//! traits so the pipeline stages can be exercised with in-memory doubles.

use crate::types::{NamedParams, PaymentMessage, Result};
use async_trait::async_trait;

/// One file handed over by a file source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// File name, used to identify the unit of work in logs and errors
    pub name: String,
    /// Raw file content
    pub content: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// One message handed over by a queue source
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Source-assigned delivery identifier
    pub id: String,
    /// Opaque message body
    pub body: Vec<u8>,
}

/// Supplies batch files
///
/// A file must stay available until it is acknowledged. The pipeline only
/// acknowledges after the batch protocol succeeded, never after the retry scope
/// gave up.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// List and read the files currently available, in processing order
    async fn poll(&self) -> Result<Vec<SourceFile>>;

    /// Commit a successfully processed file (e.g. delete it)
    async fn acknowledge(&self, file: &SourceFile) -> Result<()>;
}

/// Supplies single messages
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Wait for the next message
    ///
    /// Returns `Ok(None)` once the source is closed and drained.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Commit a successfully processed message
    async fn acknowledge(&self, delivery: &Delivery) -> Result<()>;

    /// Hand back a message whose processing gave up, so it is delivered again
    async fn reject(&self, delivery: &Delivery) -> Result<()>;
}

/// Forwards a raw message body to a queue
#[async_trait]
pub trait QueueSink: Send + Sync {
    async fn send(&self, body: Vec<u8>) -> Result<()>;
}

/// Executes the configured statement once with the given named parameters
#[async_trait]
pub trait SqlSink: Send + Sync {
    async fn execute(&self, params: &NamedParams) -> Result<()>;
}

/// Delivers one transformed message to a sink
///
/// This is the last stage of both entry protocols.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short sink name for logs
    fn name(&self) -> &str;

    /// Deliver a message; failures propagate to the retry scope
    async fn dispatch(&self, message: &PaymentMessage) -> Result<()>;
}
