//! Status fan-out.
//!
//! Refresh requests are cheap sends on an unbounded channel. A single
//! notifier task drains bursts of them, recomputes the snapshot once and
//! publishes it to a `watch` channel and to registered listeners, so the
//! operation that asked for the refresh never waits on a subscriber.

use offsync_protocol::StatusSnapshot;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tracing::warn;

type Listener = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Keeps a status listener registered.
///
/// The listener is removed by [`Subscription::unsubscribe`] or when this
/// value is dropped.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub(crate) struct StatusAggregator {
    tx: watch::Sender<StatusSnapshot>,
    registry: Arc<ListenerRegistry>,
    refresh_tx: mpsc::UnboundedSender<()>,
}

impl StatusAggregator {
    /// Returns the aggregator and the receiving end for the notifier task.
    pub(crate) fn new(initial: StatusSnapshot) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, _rx) = watch::channel(initial);
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                registry: Arc::new(ListenerRegistry::default()),
                refresh_tx,
            },
            refresh_rx,
        )
    }

    /// Asks the notifier for a fresh snapshot. Never blocks.
    pub(crate) fn request_refresh(&self) {
        // Closed only during teardown.
        let _ = self.refresh_tx.send(());
    }

    pub(crate) fn publish(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(snapshot.clone());

        let listeners: Vec<Listener> = self
            .registry
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener(&snapshot)));
            if delivered.is_err() {
                warn!("status listener panicked; snapshot skipped for it");
            }
        }
    }

    pub(crate) fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.registry.listeners.lock().len()
    }
}

/// Drains refresh requests, coalescing bursts into one recompute.
///
/// Ends when every sender is gone or `compute` returns `None`.
pub(crate) async fn run_notifier<F>(mut rx: mpsc::UnboundedReceiver<()>, mut compute: F)
where
    F: FnMut() -> Option<()>,
{
    while rx.recv().await.is_some() {
        while rx.try_recv().is_ok() {}
        if compute().is_none() {
            break;
        }
    }
}
