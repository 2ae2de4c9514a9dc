//! # globewatch-types
//!
//! Core value model for globewatch. This crate defines the types shared by
//! every layer of the monitoring pipeline: the typed values a channel
//! delivers, the identity of a source, and the severity levels values are
//! classified into.
//!
//! ## Design Goals
//!
//! - **Explicit typing**: values are a tagged union ([`ValueType`]) and
//!   comparing two values of different variants is an error, never a silent
//!   coercion
//! - **Optional serialization**: enable the `serde` feature for JSON/TOML
//!   configuration files and wire formats
//! - **Versioned files**: persisted documents carry a [`SchemaVersion`]
//!
//! ## Features
//!
//! - `serde`: serialization via serde (also enables `chrono/serde`)
//!
//! ## Example
//!
//! ```rust
//! use globewatch_types::{CompareOp, Level, SourceKey, ValueType};
//!
//! let key = SourceKey::new("plant-1", "temperature", "boiler");
//! let value = ValueType::Double(95.0);
//!
//! let hot = CompareOp::Greater.evaluate(&value, &ValueType::Double(90.0)).unwrap();
//! assert!(hot);
//! assert!(Level::Critical > Level::Warning);
//! assert_eq!(key.to_string(), "plant-1/temperature/boiler");
//! ```

mod key;
mod level;
mod offset;
mod value;
mod version;

pub use key::*;
pub use level::*;
pub use offset::*;
pub use value::*;
pub use version::*;

/// Current schema version of persisted documents (property files,
/// disabled-sound lists).
///
/// Increment this when making breaking changes to a file format.
pub const SCHEMA_VERSION: u32 = 1;
