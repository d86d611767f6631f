//! Connectivity tracking.
//!
//! [`NetworkMonitor`] holds the current online flag in a `watch` channel and
//! publishes only real edges. The host drives it from whatever source it
//! trusts: a platform connectivity API, or a [`HeartbeatMonitor`] probing
//! the remote on an interval.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Went from offline to online.
    Online,
    /// Went from online to offline.
    Offline,
}

/// Current connectivity plus edge-triggered change notification.
///
/// Cloning is cheap; all clones share one state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Whether the remote is believed reachable.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the current connectivity.
    ///
    /// Returns true if this was a transition. Repeating the current state
    /// publishes nothing.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                info!("network: back online");
            } else {
                warn!("network: transitioning to offline mode");
            }
        }
        changed
    }

    /// A receiver that wakes on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// A stream of transitions from now on.
    pub fn events(&self) -> NetworkEvents {
        let mut rx = self.tx.subscribe();
        let last = *rx.borrow_and_update();
        NetworkEvents { rx, last }
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Transitions observed on a [`NetworkMonitor`].
///
/// Flaps faster than the consumer polls collapse: an offline-online blip
/// that ends where it started yields nothing.
#[derive(Debug)]
pub struct NetworkEvents {
    rx: watch::Receiver<bool>,
    last: bool,
}

impl NetworkEvents {
    /// Waits for the next transition. `None` once every monitor is dropped.
    pub async fn next(&mut self) -> Option<NetworkEvent> {
        loop {
            self.rx.changed().await.ok()?;
            let online = *self.rx.borrow_and_update();
            if online != self.last {
                self.last = online;
                return Some(if online {
                    NetworkEvent::Online
                } else {
                    NetworkEvent::Offline
                });
            }
        }
    }
}

/// Checks whether the remote can be reached right now.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the remote answered.
    async fn probe(&self) -> bool;
}

/// Adapts an async closure into a [`ConnectivityProbe`].
pub fn probe_fn<F, Fut>(f: F) -> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    FnProbe(f)
}

/// See [`probe_fn`].
#[derive(Debug, Clone)]
pub struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> ConnectivityProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn probe(&self) -> bool {
        (self.0)().await
    }
}

/// Drives a [`NetworkMonitor`] by probing on a fixed interval.
///
/// The probing task stops when this value is dropped.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    handle: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Starts probing. The first probe runs immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn<P>(monitor: NetworkMonitor, probe: P, interval: Duration) -> Self
    where
        P: ConnectivityProbe + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = probe.probe().await;
                debug!(online, "heartbeat probe");
                monitor.set_online(online);
            }
        });
        Self { handle }
    }

    /// Stops probing.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn set_online_reports_edges_only() {
        let monitor = NetworkMonitor::new(false);
        assert!(!monitor.is_online());

        assert!(monitor.set_online(true));
        assert!(!monitor.set_online(true));
        assert!(monitor.is_online());
        assert!(monitor.set_online(false));
    }

    #[test]
    fn clones_share_state() {
        let monitor = NetworkMonitor::new(true);
        let other = monitor.clone();
        other.set_online(false);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn events_yield_transitions() {
        let monitor = NetworkMonitor::new(false);
        let mut events = monitor.events();

        monitor.set_online(true);
        assert_eq!(events.next().await, Some(NetworkEvent::Online));

        monitor.set_online(false);
        assert_eq!(events.next().await, Some(NetworkEvent::Offline));
    }

    #[tokio::test]
    async fn events_end_when_monitor_dropped() {
        let monitor = NetworkMonitor::new(true);
        let mut events = monitor.events();
        drop(monitor);
        assert_eq!(events.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_follows_probe() {
        let reachable = Arc::new(AtomicBool::new(true));
        let monitor = NetworkMonitor::new(false);
        let mut events = monitor.events();

        let flag = Arc::clone(&reachable);
        let heartbeat = HeartbeatMonitor::spawn(
            monitor.clone(),
            probe_fn(move || {
                let flag = Arc::clone(&flag);
                async move { flag.load(Ordering::SeqCst) }
            }),
            Duration::from_secs(5),
        );

        assert_eq!(events.next().await, Some(NetworkEvent::Online));

        reachable.store(false, Ordering::SeqCst);
        assert_eq!(events.next().await, Some(NetworkEvent::Offline));

        heartbeat.stop();
    }
}
