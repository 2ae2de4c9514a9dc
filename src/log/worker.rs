//! Background tasks writing and pruning the logs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{LogEntry, LogKind, LogStore};
use crate::effects::EffectQueue;
use crate::error::{ErrorKind, LogStoreError};
use crate::notify::Notifier;

/// A queued log write.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub kind: LogKind,
    pub entry: LogEntry,
}

/// Spawn the worker draining `queue` into `store`.
///
/// Writes run on the blocking pool so a slow disk never stalls the runtime.
pub fn spawn_log_worker(
    queue: Arc<EffectQueue<LogRecord>>,
    store: Arc<dyn LogStore>,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = queue.next_batch().await {
            let store = store.clone();
            let written = tokio::task::spawn_blocking(move || {
                let mut errors: Vec<LogStoreError> = Vec::new();
                for record in &batch {
                    if let Err(e) = store.append(record.kind, &record.entry) {
                        errors.push(e);
                    }
                }
                errors
            })
            .await;

            match written {
                Ok(errors) => {
                    for err in errors {
                        notifier.report(ErrorKind::LogStore, "log writer", &err);
                    }
                }
                Err(join) => notifier.report(ErrorKind::LogStore, "log writer", &join),
            }
        }
        debug!("log worker stopped");
    })
}

/// Spawn the task pruning both logs every `every`, keeping
/// `retention_days` of history.
pub fn spawn_retention_task(
    store: Arc<dyn LogStore>,
    retention_days: u32,
    every: Duration,
    notifier: Notifier,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let cutoff = Utc::now() - TimeDelta::days(i64::from(retention_days));
                    for kind in [LogKind::Events, LogKind::Sources] {
                        let store = store.clone();
                        match tokio::task::spawn_blocking(move || store.prune(kind, cutoff)).await {
                            Ok(Ok(0)) => {}
                            Ok(Ok(removed)) => info!("pruned {} {:?} log entries", removed, kind),
                            Ok(Err(e)) => notifier.report(ErrorKind::LogStore, "retention", &e),
                            Err(e) => notifier.report(ErrorKind::LogStore, "retention", &e),
                        }
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
