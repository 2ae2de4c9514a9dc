//! Directory-backed persistence for property definitions.
//!
//! Each definition lives in its own JSON file:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "scope": { "channel": null, "type": "temperature", "source": "boiler" },
//!   "conditions": [
//!     { "op": ">", "operand": { "type": "double", "value": 90.0 },
//!       "level": "critical", "message": "{source} at {value}" }
//!   ],
//!   "otherwise": { "level": "none", "message": "" }
//! }
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use globewatch_types::{CompareOp, Level, SchemaVersion, ValueType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Pattern, PropertyDefinition, Scope};
use crate::condition::{Condition, Outcome, Predicate};
use crate::config::check_schema;
use crate::error::ConfigError;

#[derive(Debug, Serialize, Deserialize)]
struct ConditionRecord {
    op: CompareOp,
    operand: ValueType,
    level: Level,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PropertyFile {
    #[serde(default)]
    version: SchemaVersion,
    scope: Scope,
    #[serde(default)]
    conditions: Vec<ConditionRecord>,
    #[serde(default)]
    otherwise: Option<Outcome>,
}

impl PropertyFile {
    /// `None` when a condition uses an injected predicate.
    fn from_definition(definition: &PropertyDefinition) -> Option<Self> {
        let conditions = definition
            .conditions
            .iter()
            .map(|c| match &c.predicate {
                Predicate::Compare { op, operand } => Some(ConditionRecord {
                    op: *op,
                    operand: operand.clone(),
                    level: c.level,
                    message: c.message.clone(),
                }),
                Predicate::Custom { .. } => None,
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            version: SchemaVersion::current(),
            scope: definition.scope.clone(),
            conditions,
            otherwise: definition.otherwise.clone(),
        })
    }

    fn into_definition(self) -> PropertyDefinition {
        PropertyDefinition {
            scope: self.scope,
            conditions: self
                .conditions
                .into_iter()
                .map(|r| Condition::when(r.op, r.operand, r.level, r.message))
                .collect(),
            otherwise: self.otherwise,
        }
    }
}

/// A directory of `*.json` property files.
#[derive(Debug, Clone)]
pub struct PropertyStore {
    dir: PathBuf,
}

impl PropertyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every definition in the directory, in file-name order.
    ///
    /// Unreadable or malformed files are skipped and returned as errors. A
    /// missing directory is an empty store.
    pub fn load(&self) -> (Vec<PropertyDefinition>, Vec<ConfigError>) {
        let mut definitions = Vec::new();
        let mut errors = Vec::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("property directory {} does not exist", self.dir.display());
                return (definitions, errors);
            }
            Err(source) => {
                errors.push(ConfigError::Io {
                    path: self.dir.clone(),
                    source,
                });
                return (definitions, errors);
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match read_file(&path) {
                Ok(file) => definitions.push(file.into_definition()),
                Err(err) => errors.push(err),
            }
        }

        info!(
            "loaded {} properties from {}",
            definitions.len(),
            self.dir.display()
        );
        (definitions, errors)
    }

    /// Write a definition to its file. Returns `Ok(None)` for definitions
    /// that cannot be persisted (injected predicates).
    pub fn save(&self, definition: &PropertyDefinition) -> Result<Option<PathBuf>, ConfigError> {
        let Some(file) = PropertyFile::from_definition(definition) else {
            debug!("property {} has custom predicates, not persisted", definition.scope);
            return Ok(None);
        };

        fs::create_dir_all(&self.dir).map_err(|source| ConfigError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(&definition.scope);
        let json = serde_json::to_string_pretty(&file).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(path))
    }

    /// Delete the file of a scope, if present.
    pub fn remove(&self, scope: &Scope) -> Result<(), ConfigError> {
        let path = self.path_for(scope);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    /// `channel.type.source.json`, with `_` standing for any. Exact
    /// patterns are percent-encoded byte-wise outside `[A-Za-z0-9-]`, so
    /// the name is a pure function of the scope.
    pub fn path_for(&self, scope: &Scope) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}.json",
            file_part(&scope.channel),
            file_part(&scope.type_name),
            file_part(&scope.source)
        ))
    }
}

fn file_part(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Any => "_".to_string(),
        Pattern::Exact(value) => {
            let mut out = String::with_capacity(value.len());
            for byte in value.bytes() {
                if byte.is_ascii_alphanumeric() || byte == b'-' {
                    out.push(byte as char);
                } else {
                    let _ = write!(out, "%{:02X}", byte);
                }
            }
            out
        }
    }
}

fn read_file(path: &Path) -> Result<PropertyFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: PropertyFile =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    check_schema(path, file.version)?;
    Ok(file)
}
