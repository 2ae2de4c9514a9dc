//! Channel registry: owns channels, their connections and watchdogs.
//!
//! ```text
//!  create/delete ──▶ index (name, address:port)      one lock
//!  connect ──▶ Transport::open ──▶ reader task ──┐
//!                                                 ├──▶ ChannelSlot.state ──▶ LevelDispatcher
//!  watchdog task ────────────────────────────────┘
//! ```
//!
//! Each channel's events are dispatched while holding that channel's state
//! lock, after the connection generation has been checked. A disconnect or
//! delete that takes the lock therefore sees no further dispatches from
//! the superseded connection. Lock order is `state` before `tasks`; the
//! index lock is never held together with either. Deleting a channel
//! drops its sources under the index lock, so a channel reusing the name
//! never shares them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use globewatch_types::SourceKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{validate_timeout, Admission, Channel, ChannelSpec, ChannelState, Expiry};
use crate::dispatch::{DispatchEvent, LevelDispatcher};
use crate::error::{ConflictError, ErrorKind, Result, TransportError};
use crate::log::EventLevel;
use crate::notify::Notification;
use crate::sources::Source;
use crate::transport::{SourceUpdate, TransportRegistry, UpdateStream};
use crate::watchdog::{Watchdog, WatchdogTarget};
use crate::Error;

/// Identifier handed out by [`ChannelRegistry::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub spec: ChannelSpec,
    pub state: ChannelState,
    pub messages_per_second: u32,
    pub sources: usize,
    /// Time since the last value; only while receiving.
    pub silent_for: Option<Duration>,
}

#[derive(Debug, Default)]
struct ChannelTasks {
    reader: Option<JoinHandle<()>>,
    watchdog: Option<Watchdog>,
}

impl ChannelTasks {
    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.watchdog = None;
    }
}

#[derive(Debug)]
struct ChannelSlot {
    id: ChannelId,
    endpoint: (String, u16),
    state: Mutex<Channel>,
    tasks: Mutex<ChannelTasks>,
}

#[derive(Debug, Default)]
struct Index {
    by_name: HashMap<String, Arc<ChannelSlot>>,
    /// (lowercased address, port) → channel name.
    endpoints: HashMap<(String, u16), String>,
}

fn endpoint_key(spec: &ChannelSpec) -> (String, u16) {
    (spec.address.to_lowercase(), spec.port)
}

#[derive(Debug)]
struct RegistryInner {
    index: Mutex<Index>,
    transports: TransportRegistry,
    dispatcher: Arc<LevelDispatcher>,
    next_id: AtomicU64,
}

/// Cloneable handle to the set of channels.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

impl ChannelRegistry {
    pub fn new(transports: TransportRegistry, dispatcher: Arc<LevelDispatcher>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                index: Mutex::new(Index::default()),
                transports,
                dispatcher,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a channel. Names and `address:port` pairs are unique;
    /// addresses compare case-insensitively.
    pub fn create(&self, spec: ChannelSpec) -> Result<ChannelId> {
        spec.validate()?;
        self.inner.transports.get(&spec.type_tag)?;

        let name = spec.name.clone();
        let id = {
            let mut index = self.inner.index.lock();
            if index.by_name.contains_key(&name) {
                return Err(ConflictError::ChannelName(name).into());
            }
            let endpoint = endpoint_key(&spec);
            if let Some(existing) = index.endpoints.get(&endpoint) {
                return Err(ConflictError::ChannelEndpoint {
                    endpoint: spec.endpoint(),
                    existing: existing.clone(),
                }
                .into());
            }

            let id = ChannelId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
            index.endpoints.insert(endpoint.clone(), name.clone());
            index.by_name.insert(
                name.clone(),
                Arc::new(ChannelSlot {
                    id,
                    endpoint,
                    state: Mutex::new(Channel::new(spec.clone(), Instant::now())),
                    tasks: Mutex::new(ChannelTasks::default()),
                }),
            );
            id
        };

        info!("channel {} created ({} {})", name, spec.type_tag, spec.endpoint());
        self.inner.state_changed(&name, ChannelState::Created);
        self.inner
            .dispatcher
            .log_event(EventLevel::Info, &name, format!("channel created ({})", spec.endpoint()));
        Ok(id)
    }

    /// Deregister a channel and drop all of its sources. Irreversible.
    pub fn delete(&self, name: &str) -> Result<()> {
        let unknown = || Error::UnknownChannel(name.to_string());
        let slot = self.inner.slot(name)?;
        {
            let mut channel = slot.state.lock();
            if channel.state() == ChannelState::Deregistered {
                return Err(unknown());
            }
            channel.deregister();
            slot.tasks.lock().stop();
        }

        let count = self.inner.unlink(&slot).ok_or_else(unknown)?;
        let notifier = self.inner.dispatcher.notifier();
        notifier.send(Notification::SourcesRemoved {
            channel: name.to_string(),
            count,
        });
        self.inner.state_changed(name, ChannelState::Deregistered);
        self.inner
            .dispatcher
            .log_event(EventLevel::Info, name, "channel deleted");
        info!("channel {} deleted, {} sources removed", name, count);
        Ok(())
    }

    /// Open the channel's transport. A failure leaves the channel
    /// Disconnected, is reported, and is returned; nothing retries.
    pub async fn connect(&self, name: &str) -> Result<()> {
        let slot = self.inner.slot(name)?;
        let (generation, spec) = {
            let mut channel = slot.state.lock();
            let generation = channel.begin_connect()?;
            (generation, channel.spec().clone())
        };
        self.inner.state_changed(name, ChannelState::Connecting);

        let opened = match self.inner.transports.get(&spec.type_tag) {
            Ok(transport) => transport.open(&spec).await.map_err(Error::from),
            Err(e) => Err(e.into()),
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                if slot.state.lock().connect_failed(generation) {
                    self.inner.state_changed(name, ChannelState::Disconnected);
                }
                self.inner.dispatcher.notifier().report_error(name, &err);
                self.inner.dispatcher.log_event(
                    EventLevel::Error,
                    name,
                    format!("connection to {} failed: {}", spec.endpoint(), err),
                );
                return Err(err);
            }
        };

        {
            let mut channel = slot.state.lock();
            if !channel.connected(generation, Instant::now()) {
                debug!("connection attempt for {} was superseded", name);
                return Ok(());
            }

            let mut tasks = slot.tasks.lock();
            tasks.stop();
            tasks.reader = Some(tokio::spawn(read_updates(
                Arc::downgrade(&self.inner),
                Arc::downgrade(&slot),
                name.to_string(),
                generation,
                stream,
            )));
            if spec.timeout().is_some() {
                tasks.watchdog = Some(self.inner.watchdog(&slot, generation));
            }
        }

        info!("channel {} connected to {}", name, spec.endpoint());
        self.inner.state_changed(name, ChannelState::Connected);
        self.inner.dispatcher.log_event(
            EventLevel::Info,
            name,
            format!("connected to {}", spec.endpoint()),
        );
        Ok(())
    }

    /// Close the connection and mark the channel's sources unavailable.
    pub fn disconnect(&self, name: &str) -> Result<()> {
        let slot = self.inner.slot(name)?;
        {
            let mut channel = slot.state.lock();
            channel.disconnect()?;
            slot.tasks.lock().stop();
            self.inner.mark_unavailable(name);
        }

        info!("channel {} disconnected", name);
        self.inner.state_changed(name, ChannelState::Disconnected);
        self.inner
            .dispatcher
            .log_event(EventLevel::Info, name, "disconnected");
        Ok(())
    }

    /// Change the silence timeout; 0 disables the watchdog. Takes effect
    /// immediately on a live connection.
    pub fn update_timeout(&self, name: &str, timeout_secs: u64) -> Result<()> {
        validate_timeout(timeout_secs)?;
        let slot = self.inner.slot(name)?;
        let mut channel = slot.state.lock();
        channel.set_timeout(timeout_secs);

        if channel.state().is_receiving() {
            let mut tasks = slot.tasks.lock();
            tasks.watchdog = None;
            if timeout_secs > 0 {
                tasks.watchdog = Some(self.inner.watchdog(&slot, channel.generation()));
            }
        }
        debug!("channel {} timeout set to {}s", name, timeout_secs);
        Ok(())
    }

    pub fn info(&self, name: &str) -> Result<ChannelInfo> {
        let slot = self.inner.slot(name)?;
        Ok(self.inner.info(&slot))
    }

    /// All channels, sorted by name.
    pub fn list(&self) -> Vec<ChannelInfo> {
        let slots: Vec<_> = self.inner.index.lock().by_name.values().cloned().collect();
        let mut infos: Vec<_> = slots.iter().map(|slot| self.inner.info(slot)).collect();
        infos.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        infos
    }

    pub fn state(&self, name: &str) -> Result<ChannelState> {
        Ok(self.inner.slot(name)?.state.lock().state())
    }

    pub fn sources(&self, name: &str) -> Result<Vec<Source>> {
        self.inner.slot(name)?;
        Ok(self.inner.dispatcher.sources().in_channel(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.index.lock().by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.index.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every reader and watchdog. Channel states are left as they are.
    pub fn shutdown(&self) {
        let slots: Vec<_> = self.inner.index.lock().by_name.values().cloned().collect();
        for slot in slots {
            let _channel = slot.state.lock();
            slot.tasks.lock().stop();
        }
    }
}

impl RegistryInner {
    fn slot(&self, name: &str) -> Result<Arc<ChannelSlot>> {
        self.index
            .lock()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownChannel(name.to_string()))
    }

    /// Drop a deregistered slot from the index together with its sources.
    /// `None` if the name now belongs to another slot.
    fn unlink(&self, slot: &Arc<ChannelSlot>) -> Option<usize> {
        let mut index = self.index.lock();
        let name = index
            .by_name
            .iter()
            .find(|(_, s)| Arc::ptr_eq(s, slot))
            .map(|(name, _)| name.clone())?;
        index.by_name.remove(&name);
        index.endpoints.remove(&slot.endpoint);
        Some(self.dispatcher.sources().remove_channel(&name))
    }

    fn info(&self, slot: &ChannelSlot) -> ChannelInfo {
        let channel = slot.state.lock();
        let now = Instant::now();
        let state = channel.state();
        ChannelInfo {
            id: slot.id,
            spec: channel.spec().clone(),
            state,
            messages_per_second: channel.messages_per_second(now),
            sources: self.dispatcher.sources().count_in_channel(channel.name()),
            silent_for: state
                .is_receiving()
                .then(|| now.saturating_duration_since(channel.last_update())),
        }
    }

    fn state_changed(&self, channel: &str, state: ChannelState) {
        self.dispatcher
            .notifier()
            .send(Notification::ChannelStateChanged {
                channel: channel.to_string(),
                state,
            });
    }

    fn watchdog(self: &Arc<Self>, slot: &Arc<ChannelSlot>, generation: u64) -> Watchdog {
        Watchdog::spawn(ChannelWatch {
            registry: Arc::downgrade(self),
            slot: Arc::downgrade(slot),
            generation,
        })
    }

    /// Push a synthetic "channel unavailable" verdict for every source.
    /// Caller holds the channel's state lock.
    fn mark_unavailable(&self, channel: &str) {
        let at = Utc::now();
        for key in self.dispatcher.sources().keys_in_channel(channel) {
            self.dispatcher.dispatch(DispatchEvent::Unavailable { key, at });
        }
    }

    /// Deliver one update from connection `generation`. Returns false when
    /// the reader should stop.
    fn deliver(&self, slot: &ChannelSlot, generation: u64, update: SourceUpdate) -> bool {
        let mut channel = slot.state.lock();
        let name = channel.name().to_string();

        match channel.accept_value(generation, Instant::now()) {
            Ok(Admission::Stale) => false,
            Ok(admission) => {
                if admission == Admission::Resumed {
                    if let Some(watchdog) = &slot.tasks.lock().watchdog {
                        watchdog.rearm();
                    }
                    info!("channel {} receiving again", name);
                    self.state_changed(&name, ChannelState::Connected);
                    self.dispatcher
                        .log_event(EventLevel::Info, &name, "data resumed");
                }

                let at = Utc::now();
                let event = match update {
                    SourceUpdate::Value {
                        type_name,
                        source,
                        value,
                    } => DispatchEvent::Update {
                        key: SourceKey::new(name, type_name, source),
                        value,
                        at,
                    },
                    SourceUpdate::Deregistered { type_name, source } => {
                        DispatchEvent::Deregistered {
                            key: SourceKey::new(name, type_name, source),
                            at,
                        }
                    }
                };
                self.dispatcher.dispatch(event);
                true
            }
            // Deleted while this update was in flight.
            Err(_) if channel.state() == ChannelState::Deregistered => {
                debug!("channel {} deleted, dropping update", name);
                false
            }
            Err(err) => {
                self.dispatcher
                    .notifier()
                    .report(ErrorKind::ChannelState, name, &err);
                false
            }
        }
    }

    /// The connection's stream ended without a disconnect.
    fn connection_lost(&self, slot: &ChannelSlot, generation: u64) {
        let (name, endpoint) = {
            let mut channel = slot.state.lock();
            if !channel.lost(generation) {
                return;
            }
            slot.tasks.lock().watchdog = None;
            self.mark_unavailable(channel.name());
            (channel.name().to_string(), channel.spec().endpoint())
        };

        warn!("channel {} lost its connection to {}", name, endpoint);
        self.state_changed(&name, ChannelState::Disconnected);
        self.dispatcher.notifier().report(
            ErrorKind::Transport,
            name.clone(),
            &TransportError::Closed(endpoint.clone()),
        );
        self.dispatcher.log_event(
            EventLevel::Warning,
            &name,
            format!("connection to {} lost", endpoint),
        );
    }

    /// Caller holds the channel's state lock.
    fn timed_out(&self, channel: &Channel) {
        let name = channel.name();
        warn!(
            "channel {} silent for {}s, marking sources unavailable",
            name, channel.spec().timeout_secs
        );
        self.mark_unavailable(name);
        self.state_changed(name, ChannelState::Timeout);
        self.dispatcher.log_event(
            EventLevel::Warning,
            name,
            format!("no data for {}s", channel.spec().timeout_secs),
        );
    }
}

async fn read_updates(
    registry: Weak<RegistryInner>,
    slot: Weak<ChannelSlot>,
    name: String,
    generation: u64,
    mut stream: UpdateStream,
) {
    while let Some(item) = stream.recv().await {
        let (Some(inner), Some(slot)) = (registry.upgrade(), slot.upgrade()) else {
            return;
        };
        match item {
            Ok(update) => {
                if !inner.deliver(&slot, generation, update) {
                    return;
                }
            }
            Err(err) => inner
                .dispatcher
                .notifier()
                .report(ErrorKind::Transport, name.clone(), &err),
        }
    }

    if let (Some(inner), Some(slot)) = (registry.upgrade(), slot.upgrade()) {
        inner.connection_lost(&slot, generation);
    }
}

/// Watchdog target for one connection of one channel.
struct ChannelWatch {
    registry: Weak<RegistryInner>,
    slot: Weak<ChannelSlot>,
    generation: u64,
}

impl WatchdogTarget for ChannelWatch {
    fn deadline(&self) -> Option<Instant> {
        let slot = self.slot.upgrade()?;
        let channel = slot.state.lock();
        if channel.generation() != self.generation || !channel.state().is_receiving() {
            return None;
        }
        // Past the clock's range there is nothing to wait for.
        let timeout = channel.spec().timeout()?;
        channel.last_update().checked_add(timeout)
    }

    fn expire(&self, now: Instant) -> Expiry {
        let (Some(inner), Some(slot)) = (self.registry.upgrade(), self.slot.upgrade()) else {
            return Expiry::Gone;
        };
        let mut channel = slot.state.lock();
        let before = channel.state();
        let expiry = channel.expire(self.generation, now);
        if expiry == Expiry::Expired && before == ChannelState::Connected {
            inner.timed_out(&channel);
        }
        expiry
    }
}
