//! Colour mapping for source states.

use globewatch_types::Level;
use serde::{Deserialize, Serialize};

/// What a source's colour represents.
///
/// `Level(Level::None)` is a healthy source (or one that matched nothing);
/// `Disconnected` means its channel stopped delivering data. The two must
/// never share a colour slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    Level(Level),
    Disconnected,
    Deregistered,
}

impl Default for ColorRole {
    fn default() -> Self {
        ColorRole::Level(Level::None)
    }
}

/// Level to colour mapping, plus the two pseudo-levels.
///
/// Colours are stored as strings (typically `#rrggbb`) and handed to the
/// renderer untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorScheme {
    pub none: String,
    pub debug: String,
    pub info: String,
    pub warning: String,
    pub error: String,
    pub critical: String,
    pub disconnected: String,
    pub deregistered: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            none: "#ffffff".to_string(),
            debug: "#00ffff".to_string(),
            info: "#00ff00".to_string(),
            warning: "#ffff00".to_string(),
            error: "#ff00ff".to_string(),
            critical: "#ff0000".to_string(),
            disconnected: "#808080".to_string(),
            deregistered: "#c0c0c0".to_string(),
        }
    }
}

impl ColorScheme {
    /// Colour for a role.
    pub fn color(&self, role: ColorRole) -> &str {
        match role {
            ColorRole::Level(Level::None) => &self.none,
            ColorRole::Level(Level::Debug) => &self.debug,
            ColorRole::Level(Level::Info) => &self.info,
            ColorRole::Level(Level::Warning) => &self.warning,
            ColorRole::Level(Level::Error) => &self.error,
            ColorRole::Level(Level::Critical) => &self.critical,
            ColorRole::Disconnected => &self.disconnected,
            ColorRole::Deregistered => &self.deregistered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_differs_from_healthy() {
        let scheme = ColorScheme::default();
        assert_ne!(
            scheme.color(ColorRole::Disconnected),
            scheme.color(ColorRole::Level(Level::None))
        );
        assert_ne!(
            scheme.color(ColorRole::Disconnected),
            scheme.color(ColorRole::Deregistered)
        );
        assert_eq!(scheme.color(ColorRole::Level(Level::Critical)), "#ff0000");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let scheme: ColorScheme = serde_json::from_str(r##"{"critical":"#aa0000"}"##).unwrap();
        assert_eq!(scheme.critical, "#aa0000");
        assert_eq!(scheme.warning, ColorScheme::default().warning);
    }
}
