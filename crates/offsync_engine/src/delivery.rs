//! Remote delivery abstraction.

use async_trait::async_trait;
use offsync_protocol::{DeliveryOutcome, SyncQueueItem};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Hands queued mutations to the authoritative remote.
///
/// The engine owns no wire format; an implementation maps each item onto
/// whatever API the remote exposes and reports one of the three outcomes.
/// Delivery is at-least-once, so the remote must tolerate seeing the same
/// item id again after a crash mid-pass.
#[async_trait]
pub trait RemoteDelivery: Send + Sync {
    /// Attempts to deliver one item.
    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryOutcome;
}

#[async_trait]
impl<T: RemoteDelivery + ?Sized> RemoteDelivery for Arc<T> {
    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryOutcome {
        (**self).deliver(item).await
    }
}

/// A delivery stub for testing.
///
/// Answers with per-resource scripted outcomes first, then with the default
/// outcome, and records every item it was handed.
#[derive(Debug)]
pub struct MockDelivery {
    default_outcome: Mutex<DeliveryOutcome>,
    scripted: Mutex<HashMap<String, VecDeque<DeliveryOutcome>>>,
    calls: Mutex<Vec<SyncQueueItem>>,
    delay: Mutex<Option<Duration>>,
}

impl MockDelivery {
    /// Creates a stub that accepts everything.
    pub fn new() -> Self {
        Self::with_default(DeliveryOutcome::Success)
    }

    /// Creates a stub whose default answer is `outcome`.
    pub fn with_default(outcome: DeliveryOutcome) -> Self {
        Self {
            default_outcome: Mutex::new(outcome),
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    /// Sets the default answer.
    pub fn set_default(&self, outcome: DeliveryOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Queues a one-shot answer for the next delivery of `resource_id`.
    pub fn push_outcome(&self, resource_id: impl Into<String>, outcome: DeliveryOutcome) {
        self.scripted
            .lock()
            .entry(resource_id.into())
            .or_default()
            .push_back(outcome);
    }

    /// Makes every delivery wait before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Every item delivered so far, in order.
    pub fn calls(&self) -> Vec<SyncQueueItem> {
        self.calls.lock().clone()
    }

    /// Number of deliveries so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of deliveries for one resource id.
    pub fn calls_for(&self, resource_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|item| item.resource_id == resource_id)
            .count()
    }
}

impl Default for MockDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteDelivery for MockDelivery {
    async fn deliver(&self, item: &SyncQueueItem) -> DeliveryOutcome {
        self.calls.lock().push(item.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(&item.resource_id)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| self.default_outcome.lock().clone())
    }
}
