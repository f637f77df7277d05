//! Inbound notification fan-out
//!
//! The link layer publishes each notification buffer exactly once; any
//! number of consumers subscribe and read their own copy. The buffer is
//! bounded and the producer never waits: a consumer that falls behind loses
//! its oldest unread buffers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

/// Default number of buffered notifications per subscriber
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 16;

// ----------------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------------

/// Drop-oldest broadcast of raw notification buffers
#[derive(Debug, Clone)]
pub struct NotificationSink {
    sender: broadcast::Sender<Vec<u8>>,
    capacity: usize,
    published: Arc<AtomicU64>,
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl NotificationSink {
    /// Create a sink buffering up to `capacity` notifications per subscriber
    /// (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        // The channel rounds up to a power of two; subscriptions discard
        // anything older than the newest `capacity` buffers when read.
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Per-subscriber capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish one notification buffer. Never blocks; returns how many
    /// subscribers will see it.
    pub fn publish(&self, buffer: Vec<u8>) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(buffer).unwrap_or(0)
    }

    /// Subscribe to buffers published from now on
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            capacity: self.capacity,
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total buffers published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Subscription
// ----------------------------------------------------------------------------

/// One consumer's view of a [`NotificationSink`]. Dropping it cancels the
/// subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Vec<u8>>,
    capacity: usize,
    dropped: u64,
}

impl Subscription {
    /// Next buffer in publish order, or `None` once the sink is gone and
    /// everything buffered has been read.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.receiver.recv().await {
                Ok(buffer) => {
                    if let Some(buffer) = self.within_capacity(buffer) {
                        return Some(buffer);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-waiting variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.receiver.try_recv() {
                Ok(buffer) => {
                    if let Some(buffer) = self.within_capacity(buffer) {
                        return Some(buffer);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(_) => return None,
            }
        }
    }

    /// Buffers this subscriber lost to overflow
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Keep `buffer` only if it is among the newest `capacity` unread ones
    fn within_capacity(&mut self, buffer: Vec<u8>) -> Option<Vec<u8>> {
        if self.receiver.len() < self.capacity {
            Some(buffer)
        } else {
            self.record_lag(1);
            None
        }
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        debug!(skipped, total = self.dropped, "Subscriber lagged, oldest buffers dropped");
    }
}
