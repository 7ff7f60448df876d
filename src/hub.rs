//! # Broadcast Hub
//! Registry of live subscriber connections plus fan-out.
//!
//! The hub only tracks membership. Connections are opened and closed by the
//! transport; a connection whose send fails is dropped from the registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use tracing::{debug, info};

/// Handle returned by [`BroadcastHub::register`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The peer is gone (or the transport refused the frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendError(pub String);

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send to subscriber failed: {}", self.0)
    }
}

impl std::error::Error for SendError {}

/// One outbound channel to a connected client.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), SendError>;
}

pub type DynSubscriber = Arc<dyn Subscriber>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

/// How long one subscriber may take to accept a frame before it is dropped.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BroadcastHub {
    next_id: AtomicU64,
    // BTreeMap keeps snapshots in registration order
    connections: Mutex<BTreeMap<ConnectionId, DynSubscriber>>,
    send_timeout: Duration,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("connections", &self.len())
            .finish()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            connections: Mutex::new(BTreeMap::new()),
            send_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ConnectionId, DynSubscriber>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, subscriber: DynSubscriber) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let total = {
            let mut conns = self.lock();
            conns.insert(id, subscriber);
            conns.len()
        };
        gauge!("ws_subscribers").set(total as f64);
        info!(target: "hub", %id, subscribers = total, "subscriber registered");
        id
    }

    /// Remove a connection. Returns `false` when it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let (removed, total) = {
            let mut conns = self.lock();
            let removed = conns.remove(&id).is_some();
            (removed, conns.len())
        };
        if removed {
            gauge!("ws_subscribers").set(total as f64);
            info!(target: "hub", %id, subscribers = total, "subscriber removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `text` to every connection registered right now.
    ///
    /// The registry lock is held only while taking the snapshot. Sends run one
    /// after another, each bounded by the send timeout; a failed or timed-out
    /// send unregisters that connection and the loop moves on to the next one.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let snapshot: Vec<(ConnectionId, DynSubscriber)> = self
            .lock()
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(sub)))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, sub) in snapshot {
            let sent = tokio::time::timeout(self.send_timeout, sub.send_text(text))
                .await
                .unwrap_or_else(|_| Err(SendError("send timed out".into())));
            match sent {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(target: "hub", %id, error = %e, "pruning dead subscriber");
                    self.unregister(id);
                    report.pruned += 1;
                }
            }
        }

        if report.pruned > 0 {
            counter!("broadcast_pruned_total").increment(report.pruned as u64);
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Records every frame; can be switched to "peer gone".
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub frames: Mutex<Vec<String>>,
        pub dead: AtomicBool,
    }

    impl Recorder {
        pub fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
        pub fn kill(&self) {
            self.dead.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Subscriber for Recorder {
        async fn send_text(&self, text: &str) -> Result<(), SendError> {
            if self.dead.load(Ordering::SeqCst) {
                return Err(SendError("closed".into()));
            }
            self.frames.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_subscriber() {
        let hub = BroadcastHub::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        hub.register(a.clone());
        hub.register(b.clone());

        let report = hub.broadcast("hello").await;
        assert_eq!(report, BroadcastReport { delivered: 2, pruned: 0 });
        assert_eq!(a.frames(), vec!["hello"]);
        assert_eq!(b.frames(), vec!["hello"]);
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_backlog() {
        let hub = BroadcastHub::new();
        let early = Arc::new(Recorder::default());
        hub.register(early.clone());
        hub.broadcast("first").await;

        let late = Arc::new(Recorder::default());
        hub.register(late.clone());
        hub.broadcast("second").await;

        assert_eq!(early.frames(), vec!["first", "second"]);
        assert_eq!(late.frames(), vec!["second"]);
    }

    #[tokio::test]
    async fn failed_send_prunes_connection_but_others_still_receive() {
        let hub = BroadcastHub::new();
        let dead = Arc::new(Recorder::default());
        let alive = Arc::new(Recorder::default());
        hub.register(dead.clone());
        hub.register(alive.clone());
        dead.kill();

        let report = hub.broadcast("m1").await;
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 1 });
        assert_eq!(hub.len(), 1);

        // the pruned connection is not tried again
        let report = hub.broadcast("m2").await;
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 0 });
        assert_eq!(alive.frames(), vec!["m1", "m2"]);
        assert!(dead.frames().is_empty());
    }

    /// Accepts the connection but never finishes a send.
    struct Stalled;

    #[async_trait]
    impl Subscriber for Stalled {
        async fn send_text(&self, _text: &str) -> Result<(), SendError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_subscriber_is_pruned_after_send_timeout() {
        let hub = BroadcastHub::with_send_timeout(Duration::from_millis(200));
        hub.register(Arc::new(Stalled));
        let healthy = Arc::new(Recorder::default());
        hub.register(healthy.clone());

        let report = tokio::time::timeout(Duration::from_secs(3), hub.broadcast("m"))
            .await
            .expect("broadcast is not held up by a stalled peer");
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 1 });
        assert_eq!(healthy.frames(), vec!["m"]);
        assert_eq!(hub.len(), 1);

        // later broadcasts skip the pruned peer entirely
        let report = hub.broadcast("n").await;
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 0 });
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = BroadcastHub::new();
        let keep = hub.register(Arc::new(Recorder::default()));
        let gone = hub.register(Arc::new(Recorder::default()));

        assert!(hub.unregister(gone));
        assert!(!hub.unregister(gone));
        assert_eq!(hub.len(), 1);

        let other = BroadcastHub::new();
        let foreign = other.register(Arc::new(Recorder::default()));
        let foreign = ConnectionId(foreign.0 + 100);
        assert!(!hub.unregister(foreign));
        assert_eq!(hub.len(), 1);
        assert!(hub.unregister(keep));
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_is_a_noop() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.broadcast("x").await, BroadcastReport::default());
    }
}
