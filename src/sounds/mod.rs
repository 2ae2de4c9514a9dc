//! Audible alerts: per-level settings, suppression, playback history.
//!
//! ## Submodules
//!
//! - [`suppressor`]: temporarily disabled sources ([`SoundSuppressor`])
//! - [`history`]: bounded record of played alerts ([`PlayedSounds`])
//! - [`worker`]: background task draining the sound queue

pub mod history;
pub mod suppressor;
pub mod worker;

pub use history::{PlayedSound, PlayedSounds};
pub use suppressor::{DisabledSound, SoundDeadline, SoundSuppressor};
pub use worker::{spawn_sound_worker, SoundRequest};

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globewatch_types::Level;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PlaybackError;

/// Whether a level plays a sound, and which file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundSetting {
    pub enabled: bool,
    pub file: Option<PathBuf>,
}

impl SoundSetting {
    fn on(file: &str) -> Self {
        Self {
            enabled: true,
            file: Some(PathBuf::from(file)),
        }
    }
}

/// Sounds configuration. `Level::None` never plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundsConfig {
    /// Base directory for relative sound files.
    pub directory: Option<PathBuf>,
    pub debug: SoundSetting,
    pub info: SoundSetting,
    pub warning: SoundSetting,
    pub error: SoundSetting,
    pub critical: SoundSetting,
}

impl Default for SoundsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            debug: SoundSetting::default(),
            info: SoundSetting::default(),
            warning: SoundSetting::on("warning.wav"),
            error: SoundSetting::on("error.wav"),
            critical: SoundSetting::on("critical.wav"),
        }
    }
}

impl SoundsConfig {
    pub fn setting(&self, level: Level) -> Option<&SoundSetting> {
        match level {
            Level::None => None,
            Level::Debug => Some(&self.debug),
            Level::Info => Some(&self.info),
            Level::Warning => Some(&self.warning),
            Level::Error => Some(&self.error),
            Level::Critical => Some(&self.critical),
        }
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.setting(level).is_some_and(|s| s.enabled)
    }

    /// Sound file for a level, joined onto `directory` when relative.
    pub fn file_for(&self, level: Level) -> Option<PathBuf> {
        let file = self.setting(level)?.file.as_ref()?;
        match &self.directory {
            Some(dir) if file.is_relative() => Some(dir.join(file)),
            _ => Some(file.clone()),
        }
    }
}

/// Audio backend.
#[async_trait]
pub trait AudioPlayer: Send + Sync + Debug {
    async fn play(&self, level: Level, file: Option<&Path>) -> Result<(), PlaybackError>;
}

/// Backend that only records playback in the operational log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlayer;

#[async_trait]
impl AudioPlayer for LogPlayer {
    async fn play(&self, level: Level, file: Option<&Path>) -> Result<(), PlaybackError> {
        match file {
            Some(path) => info!("alert sound ({}): {}", level, path.display()),
            None => info!("alert sound ({})", level),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_plays() {
        let mut config = SoundsConfig::default();
        assert!(!config.is_enabled(Level::None));
        assert!(config.file_for(Level::None).is_none());

        config.info.enabled = true;
        assert!(config.is_enabled(Level::Info));
    }

    #[test]
    fn relative_files_resolve_against_directory() {
        let config = SoundsConfig {
            directory: Some(PathBuf::from("/usr/share/globewatch")),
            ..Default::default()
        };
        assert_eq!(
            config.file_for(Level::Critical),
            Some(PathBuf::from("/usr/share/globewatch/critical.wav"))
        );
    }

    #[test]
    fn default_enables_alert_levels_only() {
        let config = SoundsConfig::default();
        assert!(!config.is_enabled(Level::Debug));
        assert!(config.is_enabled(Level::Warning));
        assert!(config.is_enabled(Level::Critical));
    }
}
