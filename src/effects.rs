//! Bounded hand-off queues for side effects (sounds, log writes).
//!
//! Producers never wait: when the queue is full the oldest item is dropped
//! and counted. Each queue is drained in batches by one worker task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default number of pending items per queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Drop-oldest bounded queue with an async consumer side.
#[derive(Debug)]
pub struct EffectQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> Default for EffectQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<T> EffectQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Enqueue an item. Returns false if an older item had to be dropped.
    pub fn push(&self, item: T) -> bool {
        let mut kept_all = true;
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                kept_all = false;
            }
            items.push_back(item);
        }
        self.notify.notify_one();
        kept_all
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    /// Wait for the next non-empty batch. Returns `None` once the queue is
    /// closed and empty.
    pub async fn next_batch(&self) -> Option<Vec<T>> {
        loop {
            let notified = self.notify.notified();
            let batch = self.drain();
            if !batch.is_empty() {
                return Some(batch);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Stop accepting waits; the consumer finishes what is queued.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
