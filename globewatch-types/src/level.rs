//! Severity levels.

use core::fmt;
use core::str::FromStr;

/// Severity classification of a source value.
///
/// Levels are totally ordered from `None` (healthy, or nothing matched) to
/// `Critical`. `None` is also the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Level {
    #[default]
    None,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    /// All levels in ascending severity.
    pub const ALL: [Level; 6] = [
        Level::None,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// Levels that may have an alert sound attached.
    pub const AUDIBLE: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// Returns true for Warning, Error and Critical.
    pub fn is_alert(&self) -> bool {
        *self >= Level::Warning
    }

    /// Lowercase name, as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::None => "none",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }

    /// Short symbol for compact display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Level::None => "-",
            Level::Debug => "DBG",
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERR",
            Level::Critical => "CRIT",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_ascending_severity() {
        for pair in Level::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Level::default(), Level::None);
    }

    #[test]
    fn alert_threshold_starts_at_warning() {
        assert!(!Level::Info.is_alert());
        assert!(Level::Warning.is_alert());
        assert!(Level::Critical.is_alert());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Critical".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!(" warning ".parse::<Level>().unwrap(), Level::Warning);
        assert!("fatal".parse::<Level>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Level::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }
}
