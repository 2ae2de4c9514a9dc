//! Source identity.

use core::fmt;

/// Identity of a source: `{channel, type, source}`.
///
/// A key is unique within a channel; the `(type_name, source)` pair may
/// repeat across channels.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceKey {
    /// Name of the channel delivering the source.
    pub channel: String,
    /// Type name of the source (e.g. "temperature").
    pub type_name: String,
    /// Name of the source within its type.
    pub source: String,
}

impl SourceKey {
    /// Create a new key.
    pub fn new(
        channel: impl Into<String>,
        type_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// Returns true if this key belongs to the given channel.
    pub fn in_channel(&self, channel: &str) -> bool {
        self.channel == channel
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.type_name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_pair_in_different_channels_is_distinct() {
        let a = SourceKey::new("north", "pressure", "p1");
        let b = SourceKey::new("south", "pressure", "p1");
        assert_ne!(a, b);

        let set: HashSet<_> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn display_joins_with_slashes() {
        let key = SourceKey::new("north", "pressure", "p1");
        assert_eq!(key.to_string(), "north/pressure/p1");
        assert!(key.in_channel("north"));
        assert!(!key.in_channel("south"));
    }
}
