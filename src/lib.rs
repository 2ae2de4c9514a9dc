//! # globewatch
//!
//! A real-time monitoring client. Channels stream typed values for named
//! sources; property rules classify each value into a severity [`Level`],
//! and level changes drive colours, alert sounds and logs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Monitor                              │
//! │                                                                  │
//! │  ┌───────────┐   ┌──────────────┐   ┌────────────────────────┐  │
//! │  │ transport │──▶│   registry   │──▶│       dispatch         │  │
//! │  │ (streams) │   │  (channels)  │   │ properties ▶ sources   │  │
//! │  └───────────┘   └──────┬───────┘   └───┬──────────┬─────────┘  │
//! │                         │               │          │            │
//! │                  ┌──────┴──────┐   ┌────▼───┐ ┌────▼────┐       │
//! │                  │  watchdog   │   │ sounds │ │   log   │       │
//! │                  │ (timeouts)  │   │ worker │ │ worker  │       │
//! │                  └─────────────┘   └────────┘ └─────────┘       │
//! │                                                                  │
//! │  notify ◀── level, channel-state, sound and error notifications │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`channel`]**: the channel state machine ([`Channel`], [`ChannelState`])
//! - **[`transport`]**: how a channel type tag becomes a stream of
//!   [`SourceUpdate`]s (`tcp-json`, `memory`)
//! - **[`registry`]**: owns channels, enforces unique names and endpoints,
//!   runs readers and watchdogs
//! - **[`properties`]**: scoped rule sets and the matching engine
//! - **[`dispatch`]**: turns values into levels, notifications, sound
//!   requests and log records
//! - **[`sounds`]**: sound settings, suppression and playback
//! - **[`log`]**: the event log and the sources log
//! - **[`monitor`]**: the context object tying it all together
//!
//! ## Usage
//!
//! ```no_run
//! use globewatch::{AppConfig, ChannelSpec, Condition, Level, Monitor, PropertyDefinition, Scope};
//! use globewatch::types::CompareOp;
//!
//! # tokio_test::block_on(async {
//! let monitor = Monitor::builder(AppConfig::default()).build();
//!
//! monitor.add_property(
//!     PropertyDefinition::new(Scope::for_type("temperature"))
//!         .condition(Condition::when(CompareOp::Greater, 90.0, Level::Critical, "{source} is {value}"))
//!         .condition(Condition::when(CompareOp::Greater, 70.0, Level::Warning, "warm"))
//!         .otherwise(Level::None, ""),
//! )?;
//!
//! monitor.create_channel(ChannelSpec::new("plant", "10.0.0.5", 9000, "tcp-json").with_timeout(30))?;
//! monitor.connect("plant").await?;
//!
//! let mut notifications = monitor.subscribe();
//! while let Ok(notification) = notifications.recv().await {
//!     println!("{:?}", notification);
//! }
//! # Ok::<_, globewatch::Error>(())
//! # });
//! ```

pub mod channel;
pub mod colors;
pub mod condition;
pub mod config;
pub mod dispatch;
pub mod effects;
pub mod error;
pub mod log;
pub mod monitor;
pub mod notify;
pub mod properties;
pub mod registry;
pub mod sounds;
pub mod sources;
pub mod transport;
pub mod watchdog;

/// The shared value model.
pub use globewatch_types as types;

// Re-export main types for convenience
pub use channel::{Channel, ChannelSpec, ChannelState};
pub use colors::{ColorRole, ColorScheme};
pub use condition::{Condition, Outcome, Predicate};
pub use config::AppConfig;
pub use dispatch::{DispatchEvent, LevelDispatcher};
pub use error::{Error, ErrorKind, Result};
pub use globewatch_types::{Level, SourceKey, ValueType};
pub use log::{LogEntry, LogKind, LogQuery, LogStore};
pub use monitor::{Monitor, MonitorBuilder};
pub use notify::{Notification, Notifier};
pub use properties::{PropertiesEngine, PropertyDefinition, Scope};
pub use registry::{ChannelId, ChannelInfo, ChannelRegistry};
pub use sounds::{AudioPlayer, SoundDeadline, SoundSuppressor};
pub use sources::Source;
pub use transport::{SourceUpdate, Transport, TransportRegistry};
