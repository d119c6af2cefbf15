//! In-memory sinks
//!
//! Record everything they receive and can be told to fail on chosen calls.
//! Useful for dry runs and for exercising the retry scope.

use crate::core::traits::{Dispatcher, QueueSink, SqlSink};
use crate::types::{NamedParams, PaymentMessage, PipelineError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Schedule of 1-based call numbers that should fail
#[derive(Debug, Default)]
struct FailurePlan {
    calls: AtomicUsize,
    failing: BTreeSet<usize>,
}

impl FailurePlan {
    fn new(failing: impl IntoIterator<Item = usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: failing.into_iter().collect(),
        }
    }

    /// Count a call and report whether it should fail
    fn next_fails(&self) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.failing.contains(&call)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// SQL sink that keeps the parameters of every successful execution
#[derive(Debug, Default)]
pub struct MemorySqlSink {
    executed: Mutex<Vec<NamedParams>>,
    plan: FailurePlan,
}

impl MemorySqlSink {
    /// Fail the given 1-based calls, succeed on all others
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            executed: Mutex::default(),
            plan: FailurePlan::new(calls),
        }
    }

    /// Fail the first `n` calls
    pub fn failing_first(n: usize) -> Self {
        Self::failing_on(1..=n)
    }

    /// Parameters of successful executions, in order
    pub fn executed(&self) -> Vec<NamedParams> {
        lock(&self.executed).clone()
    }

    /// Total calls, failed ones included
    pub fn calls(&self) -> usize {
        self.plan.calls()
    }
}

#[async_trait]
impl SqlSink for MemorySqlSink {
    async fn execute(&self, params: &NamedParams) -> Result<()> {
        if self.plan.next_fails() {
            return Err(PipelineError::transient_dispatch("sql", "simulated connection failure"));
        }
        lock(&self.executed).push(params.clone());
        Ok(())
    }
}

/// Queue sink that keeps every body it was sent
#[derive(Debug, Default)]
pub struct MemoryQueueSink {
    bodies: Mutex<Vec<Vec<u8>>>,
    plan: FailurePlan,
}

impl MemoryQueueSink {
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            bodies: Mutex::default(),
            plan: FailurePlan::new(calls),
        }
    }

    pub fn bodies(&self) -> Vec<Vec<u8>> {
        lock(&self.bodies).clone()
    }
}

#[async_trait]
impl QueueSink for MemoryQueueSink {
    async fn send(&self, body: Vec<u8>) -> Result<()> {
        if self.plan.next_fails() {
            return Err(PipelineError::transient_dispatch("queue", "simulated broker failure"));
        }
        lock(&self.bodies).push(body);
        Ok(())
    }
}

/// Dispatcher that keeps every message it was given
#[derive(Debug)]
pub struct MemoryDispatcher {
    name: String,
    messages: Mutex<Vec<PaymentMessage>>,
}

impl MemoryDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: Mutex::default(),
        }
    }

    pub fn messages(&self) -> Vec<PaymentMessage> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, message: &PaymentMessage) -> Result<()> {
        lock(&self.messages).push(message.clone());
        Ok(())
    }
}
