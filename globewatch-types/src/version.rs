//! Version stamp of persisted documents, written as `"MAJOR.MINOR"`.

use std::fmt;
use std::str::FromStr;

use crate::SCHEMA_VERSION;

/// Version of a property file or disabled-sound list.
///
/// Readers accept every minor of their own major. A newer minor may carry
/// fields an older reader ignores; a different major is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

/// A document's version stamp could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("malformed schema version {0:?}, expected MAJOR.MINOR")]
    Malformed(String),
    #[error("schema version {found} cannot be read (supported: {supported})")]
    Unsupported {
        found: SchemaVersion,
        supported: SchemaVersion,
    },
}

impl SchemaVersion {
    /// What this build writes.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(SCHEMA_VERSION, 0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn current() -> Self {
        Self::CURRENT
    }

    /// Accept the version or say why not.
    pub fn check(self) -> Result<Self, VersionError> {
        if self.major == Self::CURRENT.major {
            Ok(self)
        } else {
            Err(VersionError::Unsupported {
                found: self,
                supported: Self::CURRENT,
            })
        }
    }

    /// Written by a later minor of the same major.
    pub fn is_newer_minor(&self) -> bool {
        self.major == Self::CURRENT.major && self.minor > Self::CURRENT.minor
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A bare major (`"1"`) reads as minor 0.
impl FromStr for SchemaVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionError::Malformed(s.to_string());
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        Ok(Self {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}
