//! Application configuration.
//!
//! Loaded with the `config` crate from a file (TOML, JSON or YAML, chosen
//! by extension) overlaid with `GLOBEWATCH_*` environment variables.
//! Nested keys use a double underscore, e.g.
//! `GLOBEWATCH_LOG__RETENTION_DAYS=7`.
//!
//! ```toml
//! properties_dir = "properties"
//! disabled_sounds_file = "disabled-sounds.json"
//!
//! [[channels]]
//! name = "north"
//! address = "10.0.0.1"
//! port = 9000
//! type = "tcp-json"
//! timeout_secs = 30
//!
//! [sounds.critical]
//! enabled = true
//! file = "siren.wav"
//!
//! [log]
//! sources_enabled = true
//! retention_days = 14
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use globewatch_types::SchemaVersion;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::channel::ChannelSpec;
use crate::colors::ColorScheme;
use crate::effects::DEFAULT_QUEUE_CAPACITY;
use crate::error::ConfigError;
use crate::log::LogSettings;
use crate::notify::DEFAULT_CAPACITY;
use crate::sounds::history::DEFAULT_HISTORY;
use crate::sounds::SoundsConfig;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GLOBEWATCH";

/// Sizes of the pipeline's buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Pending items per side-effect queue (sounds, log writes).
    pub queue_capacity: usize,
    /// Played sounds kept in memory.
    pub played_history: usize,
    /// Notifications buffered per subscriber before it lags.
    pub notification_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            played_history: DEFAULT_HISTORY,
            notification_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub channels: Vec<ChannelSpec>,
    pub colors: ColorScheme,
    pub sounds: SoundsConfig,
    pub log: LogSettings,
    /// Directory of property definition files; nothing is persisted when unset.
    pub properties_dir: Option<PathBuf>,
    /// Where disabled sounds survive restarts; kept in memory when unset.
    pub disabled_sounds_file: Option<PathBuf>,
    pub dispatch: DispatchSettings,
    /// How often expired disabled sounds are swept.
    pub sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            colors: ColorScheme::default(),
            sounds: SoundsConfig::default(),
            log: LogSettings::default(),
            properties_dir: None,
            disabled_sounds_file: None,
            dispatch: DispatchSettings::default(),
            sweep_interval_secs: 60,
        }
    }
}

/// Gate a persisted document on its version stamp.
pub(crate) fn check_schema(path: &Path, version: SchemaVersion) -> Result<(), ConfigError> {
    version.check().map_err(|source| ConfigError::Version {
        path: path.to_path_buf(),
        source,
    })?;
    if version.is_newer_minor() {
        warn!(
            "{} was written with schema {}, newer than {}; unknown fields are ignored",
            path.display(),
            version,
            SchemaVersion::CURRENT
        );
    }
    Ok(())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    /// Load from `path` plus environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder().add_source(environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load, falling back to defaults. The error, if any, is returned so
    /// the caller can report it once the notification bus exists.
    pub fn load_or_default(path: Option<&Path>) -> (Self, Option<ConfigError>) {
        let loaded = match path {
            Some(path) => Self::load(path),
            None => Self::from_env(),
        };
        match loaded {
            Ok(config) => (config, None),
            Err(err) => (Self::default(), Some(err)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VersionError;
    use globewatch_types::Level;
    use std::io::Write;

    fn write_config(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(ext).tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_toml_with_partial_sections() {
        let file = write_config(
            ".toml",
            r##"
properties_dir = "props"
sweep_interval_secs = 30

[[channels]]
name = "north"
address = "10.0.0.1"
port = 9000
type = "tcp-json"
timeout_secs = 30

[colors]
critical = "#aa0000"

[sounds.critical]
enabled = false

[log]
sources_enabled = true
retention_days = 7

[dispatch]
queue_capacity = 16
"##,
        );

        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].type_tag, "tcp-json");
        assert_eq!(config.channels[0].timeout_secs, 30);
        assert_eq!(config.colors.critical, "#aa0000");
        assert_eq!(config.colors.warning, ColorScheme::default().warning);
        assert!(!config.sounds.is_enabled(Level::Critical));
        assert!(config.sounds.is_enabled(Level::Warning));
        assert!(config.log.sources_enabled);
        assert!(config.log.events_enabled);
        assert_eq!(config.log.retention_days, 7);
        assert_eq!(config.dispatch.queue_capacity, 16);
        assert_eq!(config.dispatch.played_history, DEFAULT_HISTORY);
        assert_eq!(config.properties_dir, Some(PathBuf::from("props")));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn loads_json() {
        let file = write_config(
            ".json",
            r#"{"channels":[{"name":"a","address":"h","port":1,"type":"memory"}]}"#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.channels[0].timeout(), None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, err) = AppConfig::load_or_default(Some(&dir.path().join("absent.toml")));
        assert!(matches!(err, Some(ConfigError::Load(_))));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn schema_check_accepts_newer_minor_only() {
        let path = Path::new("doc.json");
        assert!(check_schema(path, SchemaVersion::CURRENT).is_ok());
        let later_minor = SchemaVersion::new(SchemaVersion::CURRENT.major, 5);
        assert!(check_schema(path, later_minor).is_ok());

        let err = check_schema(path, SchemaVersion::new(99, 0)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Version {
                source: VersionError::Unsupported { .. },
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            format!(
                "doc.json: schema version 99.0 cannot be read (supported: {})",
                SchemaVersion::CURRENT
            )
        );
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let file = write_config(".toml", "[[channels]]\nname = \n");
        assert!(AppConfig::load(file.path()).is_err());
    }
}
