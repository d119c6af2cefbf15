//! Sink dispatchers
//!
//! Thin adapters that deliver a `PaymentMessage` to a sink:
//! - `QueueDispatcher` serializes the message to its JSON body and forwards it
//!   unmodified to a queue sink
//! - `SqlDispatcher` binds the flattened fields as named parameters and runs
//!   the sink's statement once
//!
//! Neither retries, batches, or coordinates across records. Failures propagate
//! to the orchestrator's retry scope.

use crate::core::traits::{Dispatcher, QueueSink, SqlSink};
use crate::types::{PaymentMessage, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Delivers messages to a queue as JSON bodies
#[derive(Clone)]
pub struct QueueDispatcher {
    sink: Arc<dyn QueueSink>,
}

impl QueueDispatcher {
    pub fn new(sink: Arc<dyn QueueSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    fn name(&self) -> &str {
        "queue"
    }

    async fn dispatch(&self, message: &PaymentMessage) -> Result<()> {
        let body = message.to_json()?;
        self.sink.send(body).await
    }
}

/// Delivers messages to a SQL statement as named parameters
#[derive(Clone)]
pub struct SqlDispatcher {
    sink: Arc<dyn SqlSink>,
}

impl SqlDispatcher {
    pub fn new(sink: Arc<dyn SqlSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Dispatcher for SqlDispatcher {
    fn name(&self) -> &str {
        "sql"
    }

    async fn dispatch(&self, message: &PaymentMessage) -> Result<()> {
        self.sink.execute(&message.to_params()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::memory::{MemoryQueueSink, MemorySqlSink};
    use crate::types::{PipelineError, SqlValue};

    fn message() -> PaymentMessage {
        PaymentMessage {
            taxpayer_id: "900111".to_string(),
            amount: 95.0,
            collection_date: "2024-01-01".to_string(),
            tax_code: "IMP_001".to_string(),
        }
    }

    #[tokio::test]
    async fn test_queue_dispatcher_sends_json_body() {
        let sink = Arc::new(MemoryQueueSink::default());
        let dispatcher = QueueDispatcher::new(sink.clone());

        dispatcher.dispatch(&message()).await.unwrap();

        let bodies = sink.bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(PaymentMessage::from_json(&bodies[0]).unwrap(), message());
    }

    #[tokio::test]
    async fn test_sql_dispatcher_binds_named_params() {
        let sink = Arc::new(MemorySqlSink::default());
        let dispatcher = SqlDispatcher::new(sink.clone());

        dispatcher.dispatch(&message()).await.unwrap();

        let executed = sink.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].get(":amount"), Some(&SqlValue::Real(95.0)));
    }

    #[tokio::test]
    async fn test_sql_dispatcher_propagates_failure() {
        let sink = Arc::new(MemorySqlSink::failing_first(1));
        let dispatcher = SqlDispatcher::new(sink.clone());

        let result = dispatcher.dispatch(&message()).await;

        assert!(matches!(result, Err(PipelineError::TransientDispatch { .. })));
        assert!(sink.executed().is_empty());
    }
}
