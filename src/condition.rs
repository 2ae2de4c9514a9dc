//! Conditions: ordered predicate-to-level rules inside a property.

use std::fmt;
use std::sync::Arc;

use globewatch_types::{CompareOp, Level, SourceKey, TypeMismatchError, ValueType};
use serde::{Deserialize, Serialize};

/// Signature of an injected predicate.
pub type PredicateFn = dyn Fn(&ValueType) -> Result<bool, TypeMismatchError> + Send + Sync;

/// Test applied to an incoming value.
#[derive(Clone)]
pub enum Predicate {
    /// `value <op> operand`, using typed per-variant comparison.
    Compare { op: CompareOp, operand: ValueType },
    /// An injected closure. Cannot be written to a property file.
    Custom { label: String, test: Arc<PredicateFn> },
}

impl Predicate {
    pub fn compare(op: CompareOp, operand: impl Into<ValueType>) -> Self {
        Predicate::Compare {
            op,
            operand: operand.into(),
        }
    }

    pub fn custom<F>(label: impl Into<String>, test: F) -> Self
    where
        F: Fn(&ValueType) -> Result<bool, TypeMismatchError> + Send + Sync + 'static,
    {
        Predicate::Custom {
            label: label.into(),
            test: Arc::new(test),
        }
    }

    pub fn evaluate(&self, value: &ValueType) -> Result<bool, TypeMismatchError> {
        match self {
            Predicate::Compare { op, operand } => op.evaluate(value, operand),
            Predicate::Custom { test, .. } => test(value),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { op, operand } => write!(f, "value {} {:?}", op, operand),
            Predicate::Custom { label, .. } => write!(f, "custom({})", label),
        }
    }
}

/// One predicate-to-level rule.
#[derive(Debug, Clone)]
pub struct Condition {
    pub predicate: Predicate,
    pub level: Level,
    /// Message template; see [`render_message`].
    pub message: String,
}

impl Condition {
    pub fn new(predicate: Predicate, level: Level, message: impl Into<String>) -> Self {
        Self {
            predicate,
            level,
            message: message.into(),
        }
    }

    /// Shorthand for a comparison condition.
    pub fn when(
        op: CompareOp,
        operand: impl Into<ValueType>,
        level: Level,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Predicate::compare(op, operand), level, message)
    }

    /// A condition must either raise a level or say something.
    pub fn is_valid(&self) -> bool {
        self.level != Level::None || !self.message.is_empty()
    }
}

/// Level and message used when no condition matched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub level: Level,
    #[serde(default)]
    pub message: String,
}

impl Outcome {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Substitute `{value}`, `{source}`, `{type}` and `{channel}` in a template.
///
/// Unknown placeholders are kept verbatim. Substituted text is never
/// rescanned.
pub fn render_message(template: &str, key: &SourceKey, value: &ValueType) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        match &after[..close] {
            "value" => out.push_str(&value.to_string()),
            "source" => out.push_str(&key.source),
            "type" => out.push_str(&key.type_name),
            "channel" => out.push_str(&key.channel),
            other => {
                out.push('{');
                out.push_str(other);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use globewatch_types::ValueKind;

    fn key() -> SourceKey {
        SourceKey::new("plant", "temperature", "boiler")
    }

    #[test]
    fn renders_known_placeholders() {
        let msg = render_message(
            "{type} {source} on {channel} is {value}",
            &key(),
            &ValueType::Double(95.5),
        );
        assert_eq!(msg, "temperature boiler on plant is 95.5");
    }

    #[test]
    fn keeps_unknown_and_unclosed_placeholders() {
        let msg = render_message("{unit} {value", &key(), &ValueType::Int(1));
        assert_eq!(msg, "{unit} {value");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let msg = render_message("got {value}", &key(), &ValueType::from("{source}"));
        assert_eq!(msg, "got {source}");
    }

    #[test]
    fn validity_requires_level_or_message() {
        let op = CompareOp::Greater;
        assert!(!Condition::when(op, 1i64, Level::None, "").is_valid());
        assert!(Condition::when(op, 1i64, Level::None, "note").is_valid());
        assert!(Condition::when(op, 1i64, Level::Warning, "").is_valid());
    }

    #[test]
    fn custom_predicate_reports_mismatch() {
        let even = Predicate::custom("even", |v| match v {
            ValueType::Int(i) => Ok(i % 2 == 0),
            other => Err(TypeMismatchError {
                value: other.kind(),
                operand: ValueKind::Int,
            }),
        });
        assert!(even.evaluate(&ValueType::Int(4)).unwrap());
        assert!(even.evaluate(&ValueType::from("4")).is_err());
        assert_eq!(format!("{:?}", even), "custom(even)");
    }
}
