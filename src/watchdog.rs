//! Per-channel silence watchdog.
//!
//! The watchdog sleeps until `last_update + timeout`, then asks its target
//! to expire. Data that arrived in the meantime pushes the deadline out
//! (the target answers [`Expiry::NotDue`] and the loop re-reads the
//! deadline). After an expiry the task parks until [`Watchdog::rearm`] is
//! called, which the registry does when data resumes.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::channel::Expiry;

/// The channel connection a watchdog guards.
pub trait WatchdogTarget: Send + Sync + 'static {
    /// When the connection is due to time out; `None` once there is
    /// nothing left to watch.
    fn deadline(&self) -> Option<Instant>;

    /// Check the connection at `now`, moving it to Timeout when due.
    fn expire(&self, now: Instant) -> Expiry;
}

/// Handle to a running watchdog task. Dropping it stops the task.
#[derive(Debug)]
pub struct Watchdog {
    handle: JoinHandle<()>,
    rearm: Arc<Notify>,
}

impl Watchdog {
    pub fn spawn<T: WatchdogTarget>(target: T) -> Self {
        let rearm = Arc::new(Notify::new());
        let handle = tokio::spawn(run(target, rearm.clone()));
        Self { handle, rearm }
    }

    /// Resume watching after data arrived on a timed-out channel.
    pub fn rearm(&self) {
        self.rearm.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<T: WatchdogTarget>(target: T, rearm: Arc<Notify>) {
    loop {
        let Some(deadline) = target.deadline() else {
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = rearm.notified() => continue,
        }

        match target.expire(Instant::now()) {
            Expiry::NotDue => {}
            Expiry::Expired => rearm.notified().await,
            Expiry::Gone => break,
        }
    }
    trace!("watchdog finished");
}
