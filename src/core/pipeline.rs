//! Pipeline orchestrator
//!
//! This module sequences the stages of both entry protocols and owns the retry
//! contract.
//!
//! # Architecture
//!
//! ```text
//! Batch protocol:
//!   SourceFile ─► parse_batch ─► (per record, in order)
//!                                  TransformRegistry::apply
//!                                  PaymentMessage::from
//!                                  batch Dispatcher (queue or SQL)
//!
//! Single-message protocol:
//!   Delivery ─► PaymentMessage::from_json ─► [optional re-transform]
//!                                            message Dispatcher (SQL)
//! ```
//!
//! Records of one batch are dispatched strictly one after the other. The retry
//! scope wraps a whole unit: a retry re-parses, re-transforms and re-dispatches
//! every record, including those that already went through on an earlier
//! attempt. Sinks are not deduplicated.

use crate::config::RoutingConfig;
use crate::core::retry::RetryPolicy;
use crate::core::traits::{Delivery, Dispatcher, FileSource, QueueSource, SourceFile};
use crate::core::transform::TransformRegistry;
use crate::io::{parse_batch, CsvSchema, MalformedLinePolicy};
use crate::types::{PaymentMessage, PaymentRecord, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts for one successful batch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Records dispatched, in file order
    pub dispatched: usize,
    /// Malformed lines skipped (always 0 under fail-fast)
    pub skipped: usize,
}

/// The stage pipeline shared by every entry point
///
/// Immutable once built, so one instance can be shared by the file and queue
/// workers through an `Arc`.
pub struct Pipeline {
    schema: CsvSchema,
    malformed_policy: MalformedLinePolicy,
    transforms: TransformRegistry,
    retry: RetryPolicy,
    batch_dispatcher: Arc<dyn Dispatcher>,
    message_dispatcher: Arc<dyn Dispatcher>,
    reapply_transform: bool,
}

impl Pipeline {
    /// Create a pipeline with default schema, rules and retry policy
    ///
    /// # Arguments
    ///
    /// * `batch_dispatcher` - Final stage of the batch protocol
    /// * `message_dispatcher` - Final stage of the single-message protocol
    pub fn new(
        batch_dispatcher: Arc<dyn Dispatcher>,
        message_dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            schema: CsvSchema::default(),
            malformed_policy: MalformedLinePolicy::default(),
            transforms: TransformRegistry::default(),
            retry: RetryPolicy::default(),
            batch_dispatcher,
            message_dispatcher,
            reapply_transform: false,
        }
    }

    /// Create a pipeline from validated routing configuration
    pub fn from_config(
        config: &RoutingConfig,
        batch_dispatcher: Arc<dyn Dispatcher>,
        message_dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        Ok(Self::new(batch_dispatcher, message_dispatcher)
            .with_schema(config.csv.schema()?)
            .with_malformed_policy(config.csv.on_malformed)
            .with_retry_policy(config.retry)
            .with_reapply_transform(config.pipeline.reapply_transform))
    }

    pub fn with_schema(mut self, schema: CsvSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether the single-message protocol runs the transformation stage again
    pub fn with_reapply_transform(mut self, reapply: bool) -> Self {
        self.reapply_transform = reapply;
        self
    }

    /// Transformation stage: apply the tax-code rule and flatten to the wire format
    pub fn transform_stage(&self, record: PaymentRecord) -> PaymentMessage {
        PaymentMessage::from(self.transforms.apply(record))
    }

    /// Run one attempt of the batch protocol over a file payload
    ///
    /// Records are parsed lazily and each one is transformed and dispatched
    /// before the next line is decoded, so under fail-fast nothing after a
    /// malformed line is dispatched.
    ///
    /// # Errors
    ///
    /// The first malformed line (fail-fast) or the first dispatch failure.
    pub async fn process_batch(&self, content: &[u8]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for parsed in parse_batch(content, &self.schema) {
            let record = match parsed {
                Ok(record) => record,
                Err(e) if e.is_malformed() && self.malformed_policy == MalformedLinePolicy::Skip => {
                    warn!("Skipping line: {}", e);
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let message = self.transform_stage(record);
            self.dispatch(self.batch_dispatcher.as_ref(), &message).await?;
            outcome.dispatched += 1;
        }

        Ok(outcome)
    }

    /// Run one attempt of the single-message protocol
    ///
    /// # Arguments
    ///
    /// * `id` - Delivery id, used as the record id if the transformation is re-applied
    /// * `body` - JSON body in the wire format
    pub async fn process_message(&self, id: &str, body: &[u8]) -> Result<()> {
        let message = PaymentMessage::from_json(body)?;

        let message = if self.reapply_transform {
            self.transform_stage(message.into_record(id))
        } else {
            message
        };

        self.dispatch(self.message_dispatcher.as_ref(), &message).await
    }

    async fn dispatch(&self, dispatcher: &dyn Dispatcher, message: &PaymentMessage) -> Result<()> {
        debug!(
            sink = dispatcher.name(),
            taxpayer_id = %message.taxpayer_id,
            "Dispatching payment"
        );
        dispatcher.dispatch(message).await
    }

    /// Batch protocol with retry and commit-on-success
    ///
    /// Runs [`Pipeline::process_batch`] inside the retry scope and acknowledges
    /// the file only when an attempt succeeds.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOutcome)` of the successful attempt (file acknowledged)
    /// * `Err(PipelineError::RetriesExhausted)` when every attempt failed (file
    ///   left in place), or the acknowledgment error
    pub async fn run_batch(
        &self,
        source: &dyn FileSource,
        file: &SourceFile,
    ) -> Result<BatchOutcome> {
        let content = file.content.as_slice();
        let records = parse_batch(content, &self.schema).count();
        info!(
            file = %file.name,
            bytes = content.len(),
            records,
            "Received file {} with {} records",
            file.name,
            records
        );

        let outcome = self
            .retry
            .run(&file.name, move |_| self.process_batch(content))
            .await?;

        source.acknowledge(file).await?;
        info!(
            file = %file.name,
            dispatched = outcome.dispatched,
            skipped = outcome.skipped,
            "Completed file {}",
            file.name
        );

        Ok(outcome)
    }

    /// Single-message protocol with retry and commit-on-success
    ///
    /// A message whose retry scope gives up is rejected back to the source
    /// for redelivery instead of being acknowledged.
    pub async fn run_message(&self, source: &dyn QueueSource, delivery: &Delivery) -> Result<()> {
        debug!(delivery = %delivery.id, "Received message");

        let id = delivery.id.as_str();
        let body = delivery.body.as_slice();
        let outcome = self
            .retry
            .run(id, move |_| self.process_message(id, body))
            .await;

        match outcome {
            Ok(()) => source.acknowledge(delivery).await,
            Err(e) => {
                if let Err(reject_error) = source.reject(delivery).await {
                    warn!(delivery = %delivery.id, "Failed to reject message: {}", reject_error);
                }
                Err(e)
            }
        }
    }
}
