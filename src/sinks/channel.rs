//! In-process queue
//!
//! `ChannelQueue` is a bounded tokio channel that acts as both ends of the
//! message queue: the batch protocol sends into it as a `QueueSink`, and the
//! single-message protocol consumes from it as a `QueueSource`.
//!
//! Received messages stay in an in-flight table until acknowledged. A rejected
//! message is served again, up to a redelivery limit, after which it is kept
//! aside as a dead letter (see [`ChannelQueue::dead_letters`]).

use crate::core::traits::{Delivery, QueueSink, QueueSource};
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

/// Redeliveries allowed before a rejected message is dead-lettered
pub const DEFAULT_MAX_REDELIVERIES: u32 = 6;

#[derive(Debug, Clone)]
struct Pending {
    seq: u64,
    body: Vec<u8>,
    redeliveries: u32,
}

/// Bounded in-process message queue
///
/// Meant for a single consumer: a rejected message is served again by the next
/// `receive`, ahead of anything still in the channel.
#[derive(Debug)]
pub struct ChannelQueue {
    name: String,
    capacity: usize,
    max_redeliveries: u32,
    sender: SyncMutex<Option<mpsc::Sender<Vec<u8>>>>,
    receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
    next_id: AtomicU64,
    in_flight: Mutex<BTreeMap<u64, Pending>>,
    redeliver: Mutex<VecDeque<Pending>>,
    dead_letters: Mutex<Vec<Pending>>,
}

impl ChannelQueue {
    /// Create a queue holding at most `capacity` pending messages
    ///
    /// `capacity` must be non-zero (checked by configuration validation).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            name: name.into(),
            capacity,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            sender: SyncMutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
            next_id: AtomicU64::new(1),
            in_flight: Mutex::new(BTreeMap::new()),
            redeliver: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    /// Set how often a rejected message is served again before it is dead-lettered
    pub fn with_max_redeliveries(mut self, max_redeliveries: u32) -> Self {
        self.max_redeliveries = max_redeliveries;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting messages
    ///
    /// Messages already queued, and rejected ones still due for redelivery,
    /// can still be received; once they are drained `receive` returns `None`.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    /// Number of messages waiting in the channel (0 once closed)
    pub fn pending(&self) -> usize {
        self.current_sender()
            .map(|sender| self.capacity - sender.capacity())
            .unwrap_or(0)
    }

    fn current_sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Messages received but not acknowledged, including those awaiting redelivery
    pub async fn unacknowledged(&self) -> Vec<Delivery> {
        let mut deliveries: Vec<Delivery> = self
            .in_flight
            .lock()
            .await
            .values()
            .map(|pending| self.delivery(pending))
            .collect();
        deliveries.extend(self.redeliver.lock().await.iter().map(|p| self.delivery(p)));
        deliveries
    }

    /// Messages rejected more often than the redelivery limit allows
    pub async fn dead_letters(&self) -> Vec<Delivery> {
        self.dead_letters
            .lock()
            .await
            .iter()
            .map(|pending| self.delivery(pending))
            .collect()
    }

    /// Log every message that was never stored, with its body
    ///
    /// Returns how many there were.
    pub async fn report_undelivered(&self) -> usize {
        let unacknowledged = self.unacknowledged().await;
        let dead_letters = self.dead_letters().await;

        for delivery in unacknowledged.iter().chain(&dead_letters) {
            error!(
                queue = %self.name,
                delivery = %delivery.id,
                body = %String::from_utf8_lossy(&delivery.body),
                "Message was never stored"
            );
        }
        unacknowledged.len() + dead_letters.len()
    }

    fn delivery(&self, pending: &Pending) -> Delivery {
        Delivery {
            id: self.delivery_id(pending.seq),
            body: pending.body.clone(),
        }
    }

    fn delivery_id(&self, seq: u64) -> String {
        format!("{}-{}", self.name, seq)
    }

    fn parse_delivery_id(&self, id: &str) -> Option<u64> {
        id.strip_prefix(self.name.as_str())?
            .strip_prefix('-')?
            .parse()
            .ok()
    }

    async fn take_in_flight(&self, delivery: &Delivery) -> Result<Pending> {
        let removed = match self.parse_delivery_id(&delivery.id) {
            Some(seq) => self.in_flight.lock().await.remove(&seq),
            None => None,
        };

        removed.ok_or_else(|| PipelineError::Io {
            message: format!("unknown delivery '{}' on queue '{}'", delivery.id, self.name),
        })
    }
}

#[async_trait]
impl QueueSink for ChannelQueue {
    async fn send(&self, body: Vec<u8>) -> Result<()> {
        let closed = || {
            PipelineError::transient_dispatch("queue", format!("queue '{}' is closed", self.name))
        };

        let sender = self.current_sender().ok_or_else(closed)?;
        sender.send(body).await.map_err(|_| closed())
    }
}

#[async_trait]
impl QueueSource for ChannelQueue {
    async fn receive(&self) -> Result<Option<Delivery>> {
        let redelivered = self.redeliver.lock().await.pop_front();
        let pending = match redelivered {
            Some(pending) => pending,
            None => match self.receiver.lock().await.recv().await {
                Some(body) => Pending {
                    seq: self.next_id.fetch_add(1, Ordering::SeqCst),
                    body,
                    redeliveries: 0,
                },
                None => return Ok(None),
            },
        };

        let delivery = self.delivery(&pending);
        debug!(
            queue = %self.name,
            delivery = %delivery.id,
            redeliveries = pending.redeliveries,
            "Received message"
        );
        self.in_flight.lock().await.insert(pending.seq, pending);
        Ok(Some(delivery))
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<()> {
        self.take_in_flight(delivery).await.map(|_| ())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<()> {
        let mut pending = self.take_in_flight(delivery).await?;

        if pending.redeliveries >= self.max_redeliveries {
            error!(
                queue = %self.name,
                delivery = %delivery.id,
                redeliveries = pending.redeliveries,
                body = %String::from_utf8_lossy(&pending.body),
                "Moving message to dead letters"
            );
            self.dead_letters.lock().await.push(pending);
        } else {
            pending.redeliveries += 1;
            warn!(
                queue = %self.name,
                delivery = %delivery.id,
                redelivery = pending.redeliveries,
                "Message rejected, scheduling redelivery"
            );
            self.redeliver.lock().await.push_back(pending);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_then_receive_preserves_order() {
        let queue = ChannelQueue::new("pagos", 8);
        queue.send(b"one".to_vec()).await.unwrap();
        queue.send(b"two".to_vec()).await.unwrap();
        assert_eq!(queue.pending(), 2);

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();

        assert_eq!(first.body, b"one");
        assert_eq!(second.body, b"two");
        assert_eq!(first.id, "pagos-1");
        assert_eq!(second.id, "pagos-2");
    }

    #[tokio::test]
    async fn test_acknowledge_clears_in_flight() {
        let queue = ChannelQueue::new("pagos", 8);
        queue.send(b"one".to_vec()).await.unwrap();
        queue.send(b"two".to_vec()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        queue.acknowledge(&first).await.unwrap();

        assert_eq!(queue.unacknowledged().await, vec![second]);
    }

    #[tokio::test]
    async fn test_acknowledge_twice_fails() {
        let queue = ChannelQueue::new("pagos", 8);
        queue.send(b"one".to_vec()).await.unwrap();
        let delivery = queue.receive().await.unwrap().unwrap();

        queue.acknowledge(&delivery).await.unwrap();
        assert!(queue.acknowledge(&delivery).await.is_err());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = ChannelQueue::new("pagos", 8);
        queue.send(b"one".to_vec()).await.unwrap();
        queue.close();

        assert!(queue.send(b"late".to_vec()).await.is_err());
        assert!(queue.receive().await.unwrap().is_some());
        assert!(queue.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_redelivers_same_message_first() {
        let queue = ChannelQueue::new("pagos", 8);
        queue.send(b"one".to_vec()).await.unwrap();
        queue.send(b"two".to_vec()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        queue.reject(&first).await.unwrap();
        assert_eq!(queue.unacknowledged().await, vec![first.clone()]);

        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again, first);
        queue.acknowledge(&again).await.unwrap();

        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.body, b"two");
    }

    #[tokio::test]
    async fn test_reject_past_limit_dead_letters() {
        let queue = ChannelQueue::new("pagos", 8).with_max_redeliveries(1);
        queue.send(b"one".to_vec()).await.unwrap();
        queue.close();

        let delivery = queue.receive().await.unwrap().unwrap();
        queue.reject(&delivery).await.unwrap();
        let redelivered = queue.receive().await.unwrap().unwrap();
        queue.reject(&redelivered).await.unwrap();

        assert!(queue.receive().await.unwrap().is_none());
        assert!(queue.unacknowledged().await.is_empty());
        assert_eq!(queue.dead_letters().await, vec![delivery]);
        assert_eq!(queue.report_undelivered().await, 1);
    }

    #[tokio::test]
    async fn test_closed_queue_still_serves_redeliveries() {
        let queue = ChannelQueue::new("pagos", 8);
        queue.send(b"one".to_vec()).await.unwrap();
        let delivery = queue.receive().await.unwrap().unwrap();
        queue.close();

        queue.reject(&delivery).await.unwrap();

        assert_eq!(queue.receive().await.unwrap(), Some(delivery));
    }
}
