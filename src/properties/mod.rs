//! Property definitions and the matching engine.
//!
//! A [`PropertyDefinition`] maps values of the sources selected by its
//! [`Scope`] to a level. For a given key the engine picks the satisfied
//! definition with the highest [`Scope::rank`], then evaluates its
//! conditions in order.
//!
//! The rule table is read-copy-update: matching clones an `Arc` to the
//! current table under a short read lock and evaluates without holding any
//! lock, while mutations build a new table and swap it in.

mod scope;
mod store;

pub use scope::{Pattern, Scope};
pub use store::PropertyStore;

use std::sync::Arc;

use globewatch_types::{Level, SourceKey, TypeMismatchError, ValueType};
use parking_lot::RwLock;
use tracing::debug;

use crate::condition::{render_message, Condition, Outcome};
use crate::error::{ConflictError, Error, ErrorKind, Result, ValidationError};
use crate::notify::Notifier;

/// Level and rendered message for one value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    pub level: Level,
    pub message: String,
}

/// A scoped rule set.
#[derive(Debug, Clone, Default)]
pub struct PropertyDefinition {
    pub scope: Scope,
    /// Evaluated in order; the first true predicate wins.
    pub conditions: Vec<Condition>,
    /// Used when no condition matched.
    pub otherwise: Option<Outcome>,
}

impl PropertyDefinition {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn otherwise(mut self, level: Level, message: impl Into<String>) -> Self {
        self.otherwise = Some(Outcome::new(level, message));
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scope.validate()?;
        for (index, condition) in self.conditions.iter().enumerate() {
            if !condition.is_valid() {
                return Err(ValidationError::Condition {
                    index,
                    reason: "needs a level above none or a message".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Evaluate against a value. Mismatched predicates count as non-matches
    /// and are passed to `on_mismatch` with their condition index.
    pub fn evaluate(
        &self,
        key: &SourceKey,
        value: &ValueType,
        mut on_mismatch: impl FnMut(usize, TypeMismatchError),
    ) -> Verdict {
        for (index, condition) in self.conditions.iter().enumerate() {
            match condition.predicate.evaluate(value) {
                Ok(true) => {
                    return Verdict {
                        level: condition.level,
                        message: render_message(&condition.message, key, value),
                    }
                }
                Ok(false) => {}
                Err(err) => on_mismatch(index, err),
            }
        }

        match &self.otherwise {
            Some(outcome) => Verdict {
                level: outcome.level,
                message: render_message(&outcome.message, key, value),
            },
            None => Verdict::default(),
        }
    }
}

#[derive(Debug)]
struct Rule {
    seq: u64,
    definition: Arc<PropertyDefinition>,
}

#[derive(Debug, Default)]
struct RuleTable {
    rules: Vec<Rule>,
    next_seq: u64,
}

impl RuleTable {
    fn position(&self, scope: &Scope) -> Option<usize> {
        self.rules.iter().position(|r| &r.definition.scope == scope)
    }

    /// Highest rank wins; equal ranks go to the oldest rule.
    fn select(&self, key: &SourceKey) -> Option<&Arc<PropertyDefinition>> {
        let mut best: Option<&Rule> = None;
        for rule in &self.rules {
            if !rule.definition.scope.matches(key) {
                continue;
            }
            let better = match best {
                None => true,
                Some(current) => {
                    let (rank, current_rank) =
                        (rule.definition.scope.rank(), current.definition.scope.rank());
                    rank > current_rank || (rank == current_rank && rule.seq < current.seq)
                }
            };
            if better {
                best = Some(rule);
            }
        }
        best.map(|r| &r.definition)
    }

    fn cloned(&self) -> Self {
        Self {
            rules: self
                .rules
                .iter()
                .map(|r| Rule {
                    seq: r.seq,
                    definition: r.definition.clone(),
                })
                .collect(),
            next_seq: self.next_seq,
        }
    }
}

/// Thread-safe store and matcher for property definitions.
#[derive(Debug)]
pub struct PropertiesEngine {
    table: RwLock<Arc<RuleTable>>,
    notifier: Notifier,
}

impl PropertiesEngine {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            table: RwLock::new(Arc::new(RuleTable::default())),
            notifier,
        }
    }

    /// Classify a value. Always returns a verdict; `Level::None` with an
    /// empty message when nothing applies.
    pub fn match_value(&self, key: &SourceKey, value: &ValueType) -> Verdict {
        let table = self.table.read().clone();
        let Some(definition) = table.select(key) else {
            return Verdict::default();
        };

        definition.evaluate(key, value, |index, err| {
            self.notifier.report(
                ErrorKind::TypeMismatch,
                format!("{} condition {}", key, index),
                &err,
            );
        })
    }

    /// Add a definition. A definition with the same scope must be edited
    /// instead.
    pub fn add(&self, definition: PropertyDefinition) -> Result<()> {
        definition.validate()?;
        self.mutate(|table| {
            if table.position(&definition.scope).is_some() {
                return Err(ConflictError::PropertyScope(definition.scope.clone()).into());
            }
            debug!("adding property {}", definition.scope);
            let seq = table.next_seq;
            table.next_seq += 1;
            table.rules.push(Rule {
                seq,
                definition: Arc::new(definition),
            });
            Ok(())
        })
    }

    pub fn remove(&self, scope: &Scope) -> Result<Arc<PropertyDefinition>> {
        self.mutate(|table| {
            let index = table
                .position(scope)
                .ok_or_else(|| Error::UnknownProperty(scope.clone()))?;
            debug!("removing property {}", scope);
            Ok(table.rules.remove(index).definition)
        })
    }

    /// Replace the definition at `old`. The replacement keeps the original's
    /// insertion order; its scope may change but must not collide.
    pub fn edit(&self, old: &Scope, definition: PropertyDefinition) -> Result<()> {
        definition.validate()?;
        self.mutate(|table| {
            let index = table
                .position(old)
                .ok_or_else(|| Error::UnknownProperty(old.clone()))?;
            if &definition.scope != old && table.position(&definition.scope).is_some() {
                return Err(ConflictError::PropertyScope(definition.scope.clone()).into());
            }
            debug!("editing property {} -> {}", old, definition.scope);
            table.rules[index].definition = Arc::new(definition);
            Ok(())
        })
    }

    pub fn get(&self, scope: &Scope) -> Option<Arc<PropertyDefinition>> {
        let table = self.table.read().clone();
        table.position(scope).map(|i| table.rules[i].definition.clone())
    }

    /// All definitions in insertion order.
    pub fn definitions(&self) -> Vec<Arc<PropertyDefinition>> {
        let table = self.table.read().clone();
        table.rules.iter().map(|r| r.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut RuleTable) -> Result<T>) -> Result<T> {
        let mut guard = self.table.write();
        let mut next = guard.cloned();
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Predicate;
    use crate::notify::Notification;
    use globewatch_types::CompareOp;

    fn engine() -> PropertiesEngine {
        PropertiesEngine::new(Notifier::new(16))
    }

    fn boiler() -> SourceKey {
        SourceKey::new("plant", "temperature", "boiler")
    }

    fn thresholds(scope: Scope) -> PropertyDefinition {
        PropertyDefinition::new(scope)
            .condition(Condition::when(
                CompareOp::Greater,
                90.0,
                Level::Critical,
                "{source} overheating at {value}",
            ))
            .condition(Condition::when(
                CompareOp::Greater,
                70.0,
                Level::Warning,
                "{source} warm",
            ))
            .otherwise(Level::None, "")
    }

    #[test]
    fn first_matching_condition_wins() {
        let engine = engine();
        engine.add(thresholds(Scope::for_type("temperature"))).unwrap();

        let v = engine.match_value(&boiler(), &ValueType::Double(95.0));
        assert_eq!(v.level, Level::Critical);
        assert_eq!(v.message, "boiler overheating at 95");

        assert_eq!(
            engine.match_value(&boiler(), &ValueType::Double(80.0)).level,
            Level::Warning
        );
        assert_eq!(
            engine.match_value(&boiler(), &ValueType::Double(10.0)).level,
            Level::None
        );
    }

    #[test]
    fn no_rule_means_none() {
        let engine = engine();
        let v = engine.match_value(&boiler(), &ValueType::Int(1));
        assert_eq!(v, Verdict::default());
    }

    #[test]
    fn otherwise_applies_when_nothing_matches() {
        let engine = engine();
        engine
            .add(
                PropertyDefinition::new(Scope::for_type("temperature"))
                    .condition(Condition::when(CompareOp::Less, 0.0, Level::Error, "frozen"))
                    .otherwise(Level::Info, "{value} ok"),
            )
            .unwrap();

        let v = engine.match_value(&boiler(), &ValueType::Double(20.0));
        assert_eq!(v.level, Level::Info);
        assert_eq!(v.message, "20 ok");
    }

    #[test]
    fn more_specific_scope_wins_regardless_of_order() {
        for specific_first in [true, false] {
            let engine = engine();
            let general = PropertyDefinition::new(Scope::for_type("temperature"))
                .otherwise(Level::Info, "general");
            let specific = PropertyDefinition::new(Scope::for_source("temperature", "boiler"))
                .otherwise(Level::Error, "specific");

            if specific_first {
                engine.add(specific).unwrap();
                engine.add(general).unwrap();
            } else {
                engine.add(general).unwrap();
                engine.add(specific).unwrap();
            }

            let v = engine.match_value(&boiler(), &ValueType::Double(1.0));
            assert_eq!(v.message, "specific");

            let other = SourceKey::new("plant", "temperature", "pump");
            assert_eq!(engine.match_value(&other, &ValueType::Double(1.0)).message, "general");
        }
    }

    #[test]
    fn exact_source_beats_type_in_channel() {
        let engine = engine();
        engine
            .add(
                PropertyDefinition::new(Scope::for_type("temperature").channel("plant"))
                    .otherwise(Level::Info, "channel"),
            )
            .unwrap();
        engine
            .add(
                PropertyDefinition::new(Scope::for_source("temperature", "boiler"))
                    .otherwise(Level::Info, "source"),
            )
            .unwrap();

        assert_eq!(
            engine.match_value(&boiler(), &ValueType::Double(1.0)).message,
            "source"
        );
    }

    #[test]
    fn equal_rank_goes_to_oldest() {
        // Unique scopes make this unreachable through `add`, so build the
        // table directly.
        let rule = |seq, message: &str| Rule {
            seq,
            definition: Arc::new(
                PropertyDefinition::new(Scope::for_type("temperature"))
                    .otherwise(Level::Info, message),
            ),
        };
        let tied = RuleTable {
            rules: vec![rule(7, "newer"), rule(3, "older")],
            next_seq: 8,
        };

        let selected = tied.select(&boiler()).unwrap();
        assert_eq!(selected.otherwise.as_ref().unwrap().message, "older");
    }

    #[test]
    fn duplicate_scope_is_a_conflict() {
        let engine = engine();
        engine.add(thresholds(Scope::for_type("temperature"))).unwrap();
        let err = engine
            .add(thresholds(Scope::for_type("temperature")))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(ConflictError::PropertyScope(_))));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn edit_replaces_in_place() {
        let engine = engine();
        let scope = Scope::for_type("temperature");
        engine.add(thresholds(scope.clone())).unwrap();
        engine.add(PropertyDefinition::new(Scope::for_type("pressure")).otherwise(Level::Info, "p")).unwrap();

        engine
            .edit(&scope, PropertyDefinition::new(scope.clone()).otherwise(Level::Error, "edited"))
            .unwrap();

        let defs = engine.definitions();
        assert_eq!(defs[0].scope, scope);
        assert_eq!(
            engine.match_value(&boiler(), &ValueType::Double(1.0)).message,
            "edited"
        );

        let clash = engine.edit(&scope, PropertyDefinition::new(Scope::for_type("pressure")));
        assert!(matches!(clash, Err(Error::Conflict(_))));

        let missing = engine.edit(&Scope::for_type("flow"), PropertyDefinition::new(Scope::for_type("flow")));
        assert!(matches!(missing, Err(Error::UnknownProperty(_))));
    }

    #[test]
    fn remove_drops_definition() {
        let engine = engine();
        let scope = Scope::for_type("temperature");
        engine.add(thresholds(scope.clone())).unwrap();
        engine.remove(&scope).unwrap();
        assert!(engine.is_empty());
        assert!(matches!(engine.remove(&scope), Err(Error::UnknownProperty(_))));
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let engine = engine();
        let bad = PropertyDefinition::new(Scope::for_type("temperature"))
            .condition(Condition::when(CompareOp::Greater, 1.0, Level::None, ""));
        assert!(matches!(
            engine.add(bad),
            Err(Error::Validation(ValidationError::Condition { index: 0, .. }))
        ));
    }

    #[tokio::test]
    async fn type_mismatch_is_reported_and_skipped() {
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();
        let engine = PropertiesEngine::new(notifier);
        engine
            .add(
                PropertyDefinition::new(Scope::for_type("temperature"))
                    .condition(Condition::when(CompareOp::Greater, 90i64, Level::Critical, "int"))
                    .condition(Condition::when(CompareOp::Greater, 90.0, Level::Warning, "double")),
            )
            .unwrap();

        let v = engine.match_value(&boiler(), &ValueType::Double(95.0));
        assert_eq!(v.level, Level::Warning);

        match rx.recv().await.unwrap() {
            Notification::Error(report) => assert_eq!(report.kind, ErrorKind::TypeMismatch),
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[test]
    fn custom_predicates_participate() {
        let engine = engine();
        engine
            .add(
                PropertyDefinition::new(Scope::for_type("status")).condition(Condition::new(
                    Predicate::custom("contains fault", |v| {
                        Ok(matches!(v, ValueType::String(s) if s.contains("fault")))
                    }),
                    Level::Error,
                    "{value}",
                )),
            )
            .unwrap();

        let key = SourceKey::new("plant", "status", "line-1");
        let v = engine.match_value(&key, &ValueType::from("motor fault"));
        assert_eq!(v.level, Level::Error);
        assert_eq!(v.message, "motor fault");
    }

    #[test]
    fn concurrent_matching_during_edits() {
        let engine = Arc::new(engine());
        let scope = Scope::for_type("temperature");
        engine.add(thresholds(scope.clone())).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let level = engine.match_value(&boiler(), &ValueType::Double(95.0)).level;
                        assert!(level == Level::Critical || level == Level::Error);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            let level = if i % 2 == 0 { Level::Error } else { Level::Critical };
            engine
                .edit(
                    &scope,
                    PropertyDefinition::new(scope.clone()).otherwise(level, "edited"),
                )
                .unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
