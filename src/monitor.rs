//! The monitor context: everything the pipeline needs, built once at
//! startup from an [`AppConfig`] and torn down by [`Monitor::shutdown`].
//!
//! ```text
//!  MonitorBuilder::build
//!    ├── PropertiesEngine  ◀── PropertyStore (properties_dir)
//!    ├── SoundSuppressor   ◀── disabled_sounds_file
//!    ├── LevelDispatcher ──▶ sound queue ──▶ sound worker ──▶ AudioPlayer
//!    │                   └─▶ log queue ───▶ log worker ───▶ LogStore
//!    ├── ChannelRegistry   ◀── config channels
//!    └── sweep + retention tasks
//! ```
//!
//! Every fallible step of the build is reported on the notification bus
//! and the monitor starts degraded rather than failing. Subscribe through
//! [`MonitorBuilder::subscribe`] to see those reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use globewatch_types::{parse_relative_offset, Level, SourceKey};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{ChannelSpec, ChannelState};
use crate::config::AppConfig;
use crate::dispatch::{DispatchContext, LevelDispatcher};
use crate::effects::EffectQueue;
use crate::error::{ConfigError, ErrorKind, Result};
use crate::log::{
    spawn_log_worker, spawn_retention_task, EventLevel, JsonLinesLogStore, LogEntry, LogKind,
    LogQuery, LogRecord, LogStore, MemoryLogStore,
};
use crate::notify::{Notification, Notifier};
use crate::properties::{PropertiesEngine, PropertyDefinition, PropertyStore, Scope};
use crate::registry::{ChannelId, ChannelInfo, ChannelRegistry};
use crate::sounds::{
    spawn_sound_worker, AudioPlayer, DisabledSound, LogPlayer, PlayedSound, PlayedSounds,
    SoundDeadline, SoundRequest, SoundSuppressor,
};
use crate::sources::Source;
use crate::transport::{MemoryTransport, Transport, TransportRegistry};

/// How often the logs are pruned.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Assembles a [`Monitor`].
#[derive(Debug)]
pub struct MonitorBuilder {
    config: AppConfig,
    config_error: Option<ConfigError>,
    notifier: Notifier,
    player: Arc<dyn AudioPlayer>,
    log_store: Option<Arc<dyn LogStore>>,
    transports: TransportRegistry,
}

impl MonitorBuilder {
    pub fn new(config: AppConfig) -> Self {
        let notifier = Notifier::new(config.dispatch.notification_capacity);
        Self {
            config,
            config_error: None,
            notifier,
            player: Arc::new(LogPlayer),
            log_store: None,
            transports: TransportRegistry::with_builtins(MemoryTransport::new()),
        }
    }

    /// Report a config load failure once the monitor is built.
    pub fn config_error(mut self, error: Option<ConfigError>) -> Self {
        self.config_error = error;
        self
    }

    pub fn with_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.player = player;
        self
    }

    /// Use this store instead of the one `log.directory` selects.
    pub fn with_log_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.log_store = Some(store);
        self
    }

    pub fn with_transport(mut self, tag: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.transports.register(tag, transport);
        self
    }

    /// Notifications published while building and afterwards.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Start the monitor. Must be called inside a tokio runtime.
    pub fn build(self) -> Monitor {
        let MonitorBuilder {
            config,
            config_error,
            notifier,
            player,
            log_store,
            transports,
        } = self;

        if let Some(err) = &config_error {
            notifier.report(ErrorKind::Config, "configuration", err);
        }

        let engine = Arc::new(PropertiesEngine::new(notifier.clone()));
        let store = config.properties_dir.clone().map(PropertyStore::new);
        if let Some(store) = &store {
            load_properties(store, &engine, &notifier);
        }

        let suppressor = Arc::new(load_disabled_sounds(
            config.disabled_sounds_file.as_deref(),
            &notifier,
        ));

        let log_store = log_store.unwrap_or_else(|| open_log_store(&config, &notifier));
        let capacity = config.dispatch.queue_capacity;
        let sound_queue = Arc::new(EffectQueue::<SoundRequest>::new(capacity));
        let log_queue = Arc::new(EffectQueue::<LogRecord>::new(capacity));
        let played = Arc::new(Mutex::new(PlayedSounds::new(config.dispatch.played_history)));

        let dispatcher = Arc::new(LevelDispatcher::new(
            DispatchContext {
                engine: engine.clone(),
                sources: Default::default(),
                suppressor: suppressor.clone(),
                sound_queue: sound_queue.clone(),
                log_queue: log_queue.clone(),
                notifier: notifier.clone(),
            },
            config.colors.clone(),
            config.sounds.clone(),
            config.log.clone(),
        ));
        let registry = ChannelRegistry::new(transports, dispatcher.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers = vec![
            spawn_sound_worker(
                sound_queue.clone(),
                player,
                config.sounds.clone(),
                played.clone(),
                notifier.clone(),
            ),
            spawn_log_worker(log_queue.clone(), log_store.clone(), notifier.clone()),
            spawn_sweep_task(
                suppressor.clone(),
                config.sweep_interval(),
                notifier.clone(),
                stop_rx.clone(),
            ),
        ];
        if config.log.retention_days > 0 {
            workers.push(spawn_retention_task(
                log_store.clone(),
                config.log.retention_days,
                RETENTION_INTERVAL,
                notifier.clone(),
                stop_rx,
            ));
        }

        for spec in &config.channels {
            let name = spec.name.clone();
            if let Err(err) = registry.create(spec.clone()) {
                notifier.report_error(name, &err);
            }
        }

        dispatcher.log_event(
            match config_error {
                Some(_) => EventLevel::Warning,
                None => EventLevel::Info,
            },
            "",
            format!(
                "monitor started: {} channels, {} properties",
                registry.len(),
                engine.len()
            ),
        );
        info!(
            "monitor started with {} channels and {} properties",
            registry.len(),
            engine.len()
        );

        Monitor {
            config,
            notifier,
            engine,
            store,
            suppressor,
            played,
            dispatcher,
            registry,
            log_store,
            sound_queue,
            log_queue,
            workers: Mutex::new(workers),
            stop_tx,
        }
    }
}

fn load_properties(store: &PropertyStore, engine: &PropertiesEngine, notifier: &Notifier) {
    let (definitions, errors) = store.load();
    for err in errors {
        notifier.report(ErrorKind::Config, store.dir().display().to_string(), &err);
    }
    for definition in definitions {
        let scope = definition.scope.clone();
        if let Err(err) = engine.add(definition) {
            notifier.report_error(scope.to_string(), &err);
        }
    }
    debug!("loaded {} properties from {}", engine.len(), store.dir().display());
}

fn load_disabled_sounds(path: Option<&Path>, notifier: &Notifier) -> SoundSuppressor {
    let Some(path) = path else {
        return SoundSuppressor::new();
    };
    match SoundSuppressor::load(path, Utc::now()) {
        Ok(suppressor) => suppressor,
        Err(err) => {
            notifier.report(ErrorKind::Config, path.display().to_string(), &err);
            SoundSuppressor::new()
        }
    }
}

fn open_log_store(config: &AppConfig, notifier: &Notifier) -> Arc<dyn LogStore> {
    if let Some(dir) = &config.log.directory {
        match JsonLinesLogStore::open(dir) {
            Ok(store) => return Arc::new(store),
            Err(err) => notifier.report(ErrorKind::LogStore, dir.display().to_string(), &err),
        }
    }
    Arc::new(MemoryLogStore::new())
}

/// Periodically re-enable sounds whose deadline passed.
fn spawn_sweep_task(
    suppressor: Arc<SoundSuppressor>,
    every: Duration,
    notifier: Notifier,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let keys = suppressor.sweep(Utc::now());
                    if !keys.is_empty() {
                        debug!("{} disabled sounds expired", keys.len());
                        notifier.send(Notification::SoundsEnabled { keys });
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }
    })
}

/// Running monitor. All methods take `&self`; share it behind an `Arc`.
#[derive(Debug)]
pub struct Monitor {
    config: AppConfig,
    notifier: Notifier,
    engine: Arc<PropertiesEngine>,
    store: Option<PropertyStore>,
    suppressor: Arc<SoundSuppressor>,
    played: Arc<Mutex<PlayedSounds>>,
    dispatcher: Arc<LevelDispatcher>,
    registry: ChannelRegistry,
    log_store: Arc<dyn LogStore>,
    sound_queue: Arc<EffectQueue<SoundRequest>>,
    log_queue: Arc<EffectQueue<LogRecord>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
}

impl Monitor {
    pub fn builder(config: AppConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    // Channels

    pub fn create_channel(&self, spec: ChannelSpec) -> Result<ChannelId> {
        self.registry.create(spec)
    }

    pub fn delete_channel(&self, name: &str) -> Result<()> {
        self.registry.delete(name)
    }

    pub async fn connect(&self, name: &str) -> Result<()> {
        self.registry.connect(name).await
    }

    /// Connect every channel that is not already connected. Returns the
    /// number of channels now receiving; failures are reported.
    pub async fn connect_all(&self) -> usize {
        let mut connected = 0;
        for info in self.registry.list() {
            match info.state {
                ChannelState::Created | ChannelState::Disconnected => {
                    if self.registry.connect(&info.spec.name).await.is_ok() {
                        connected += 1;
                    }
                }
                ChannelState::Connected | ChannelState::Timeout => connected += 1,
                _ => {}
            }
        }
        connected
    }

    pub fn disconnect(&self, name: &str) -> Result<()> {
        self.registry.disconnect(name)
    }

    pub fn update_timeout(&self, name: &str, timeout_secs: u64) -> Result<()> {
        self.registry.update_timeout(name, timeout_secs)
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.registry.list()
    }

    pub fn channel_info(&self, name: &str) -> Result<ChannelInfo> {
        self.registry.info(name)
    }

    pub fn sources(&self, channel: &str) -> Result<Vec<Source>> {
        self.registry.sources(channel)
    }

    /// `Level::None` for unknown keys.
    pub fn current_level(&self, key: &SourceKey) -> Level {
        self.dispatcher.sources().current_level(key)
    }

    // Properties

    /// Add a definition and persist it. A duplicate scope is a
    /// [`ConflictError`](crate::error::ConflictError); use
    /// [`edit_property`](Self::edit_property) to replace it.
    pub fn add_property(&self, definition: PropertyDefinition) -> Result<()> {
        let scope = definition.scope.clone();
        self.engine.add(definition)?;
        self.persist_property(&scope);
        Ok(())
    }

    pub fn remove_property(&self, scope: &Scope) -> Result<Arc<PropertyDefinition>> {
        let removed = self.engine.remove(scope)?;
        if let Some(store) = &self.store {
            if let Err(err) = store.remove(scope) {
                self.notifier.report(ErrorKind::Config, scope.to_string(), &err);
            }
        }
        Ok(removed)
    }

    /// Replace the definition at `old`; the new one may have another scope.
    pub fn edit_property(&self, old: &Scope, definition: PropertyDefinition) -> Result<()> {
        let scope = definition.scope.clone();
        self.engine.edit(old, definition)?;
        if let Some(store) = &self.store {
            if *old != scope {
                if let Err(err) = store.remove(old) {
                    self.notifier.report(ErrorKind::Config, old.to_string(), &err);
                }
            }
        }
        self.persist_property(&scope);
        Ok(())
    }

    pub fn properties(&self) -> Vec<Arc<PropertyDefinition>> {
        self.engine.definitions()
    }

    fn persist_property(&self, scope: &Scope) {
        let (Some(store), Some(definition)) = (&self.store, self.engine.get(scope)) else {
            return;
        };
        match store.save(&definition) {
            Ok(Some(path)) => debug!("saved property {} to {}", scope, path.display()),
            Ok(None) => debug!("property {} has custom predicates, not saved", scope),
            Err(err) => self.notifier.report(ErrorKind::Config, scope.to_string(), &err),
        }
    }

    // Sounds

    pub fn disable_sound(&self, key: SourceKey, deadline: SoundDeadline) -> Result<DateTime<Utc>> {
        let until = self.suppressor.disable(key.clone(), deadline, Utc::now())?;
        self.notifier.send(Notification::SoundsDisabled { key, until });
        self.persist_disabled_sounds();
        Ok(until)
    }

    /// Disable for a relative offset such as `2h` or `1d12h30m`.
    pub fn disable_sound_for(&self, key: SourceKey, offset: &str) -> Result<DateTime<Utc>> {
        let offset = parse_relative_offset(offset)?;
        self.disable_sound(key, SoundDeadline::For(offset))
    }

    /// Returns false if the key was not disabled.
    pub fn enable_sound(&self, key: &SourceKey) -> bool {
        let enabled = self.suppressor.enable(key);
        if enabled {
            self.notifier.send(Notification::SoundsEnabled {
                keys: vec![key.clone()],
            });
            self.persist_disabled_sounds();
        }
        enabled
    }

    pub fn disabled_sounds(&self) -> Vec<DisabledSound> {
        self.suppressor.entries()
    }

    /// Oldest first.
    pub fn played_sounds(&self) -> Vec<PlayedSound> {
        self.played.lock().entries()
    }

    fn persist_disabled_sounds(&self) {
        if let Some(path) = &self.config.disabled_sounds_file {
            if let Err(err) = self.suppressor.save(path) {
                self.notifier
                    .report(ErrorKind::Config, path.display().to_string(), &err);
            }
        }
    }

    // Logs

    pub fn query_log(&self, kind: LogKind, query: &LogQuery) -> Result<Vec<LogEntry>> {
        Ok(self.log_store.query(kind, query)?)
    }

    /// Side effects dropped because a queue was full: (sounds, log writes).
    pub fn dropped_effects(&self) -> (u64, u64) {
        (self.sound_queue.dropped(), self.log_queue.dropped())
    }

    pub fn properties_dir(&self) -> Option<PathBuf> {
        self.store.as_ref().map(|s| s.dir().to_path_buf())
    }

    /// Stop channels and background tasks, flush queued side effects and
    /// persist disabled sounds.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.registry.shutdown();
        self.dispatcher
            .log_event(EventLevel::Info, "", "monitor stopped");

        let _ = self.stop_tx.send(true);
        self.sound_queue.close();
        self.log_queue.close();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
        self.persist_disabled_sounds();
    }
}
