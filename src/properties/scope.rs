//! Scope patterns selecting which sources a property applies to.

use std::fmt;

use globewatch_types::SourceKey;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Match pattern for one key field. Serialised as `null` (any) or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Pattern {
    #[default]
    Any,
    Exact(String),
}

impl Pattern {
    pub fn exact(value: impl Into<String>) -> Self {
        Pattern::Exact(value.into())
    }

    pub fn matches(&self, field: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(value) => value == field,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Pattern::Exact(_))
    }
}

impl From<Option<String>> for Pattern {
    fn from(value: Option<String>) -> Self {
        value.map_or(Pattern::Any, Pattern::Exact)
    }
}

impl From<Pattern> for Option<String> {
    fn from(pattern: Pattern) -> Self {
        match pattern {
            Pattern::Any => None,
            Pattern::Exact(value) => Some(value),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Any => f.write_str("*"),
            Pattern::Exact(value) => f.write_str(value),
        }
    }
}

/// Scope triple of a property definition.
///
/// At most one definition may exist per scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub channel: Pattern,
    #[serde(default, rename = "type")]
    pub type_name: Pattern,
    #[serde(default)]
    pub source: Pattern,
}

// Rank weights: an exact source outranks an exact channel, which outranks
// an exact type.
const SOURCE_WEIGHT: u8 = 4;
const CHANNEL_WEIGHT: u8 = 2;
const TYPE_WEIGHT: u8 = 1;

impl Scope {
    /// Scope matching every source.
    pub fn any() -> Self {
        Self::default()
    }

    /// Every source of a type, in any channel.
    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self::any().type_name(type_name)
    }

    /// One source of a type, in any channel.
    pub fn for_source(type_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::for_type(type_name).source(source)
    }

    /// Exactly one key.
    pub fn exact(key: &SourceKey) -> Self {
        Self::for_source(key.type_name.clone(), key.source.clone()).channel(key.channel.clone())
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Pattern::exact(channel);
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Pattern::exact(type_name);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Pattern::exact(source);
        self
    }

    pub fn matches(&self, key: &SourceKey) -> bool {
        self.channel.matches(&key.channel)
            && self.type_name.matches(&key.type_name)
            && self.source.matches(&key.source)
    }

    /// Specificity rank; higher wins.
    pub fn rank(&self) -> u8 {
        let mut rank = 0;
        if self.source.is_exact() {
            rank += SOURCE_WEIGHT;
        }
        if self.channel.is_exact() {
            rank += CHANNEL_WEIGHT;
        }
        if self.type_name.is_exact() {
            rank += TYPE_WEIGHT;
        }
        rank
    }

    /// Exact patterns must name something.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, pattern) in [
            ("channel", &self.channel),
            ("type", &self.type_name),
            ("source", &self.source),
        ] {
            if let Pattern::Exact(value) = pattern {
                if value.trim().is_empty() {
                    return Err(ValidationError::Scope(format!("empty {} pattern", field)));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.type_name, self.source)
    }
}
