//! Typed source values and their comparison semantics.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};

/// The variant tag of a [`ValueType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueKind {
    Int,
    UInt,
    Double,
    DateTime,
    Time,
    String,
}

impl ValueKind {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Double => "double",
            ValueKind::DateTime => "date_time",
            ValueKind::Time => "time",
            ValueKind::String => "string",
        }
    }

    /// Resolve a wire type name to a kind.
    ///
    /// Narrow and wide integer names map to the same 64-bit variant.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "int64" | "longlong" => Some(ValueKind::Int),
            "uint" | "uint64" | "ulonglong" => Some(ValueKind::UInt),
            "double" | "float" => Some(ValueKind::Double),
            "datetime" | "date_time" => Some(ValueKind::DateTime),
            "time" => Some(ValueKind::Time),
            "string" => Some(ValueKind::String),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed value delivered by a source.
///
/// Equality and ordering are defined per variant. Comparing values of
/// different variants is a [`TypeMismatchError`], not a silent `false`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "type", content = "value", rename_all = "snake_case")
)]
pub enum ValueType {
    Int(i64),
    UInt(u64),
    Double(f64),
    DateTime(DateTime<Utc>),
    Time(NaiveTime),
    String(String),
}

impl ValueType {
    /// The variant tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueType::Int(_) => ValueKind::Int,
            ValueType::UInt(_) => ValueKind::UInt,
            ValueType::Double(_) => ValueKind::Double,
            ValueType::DateTime(_) => ValueKind::DateTime,
            ValueType::Time(_) => ValueKind::Time,
            ValueType::String(_) => ValueKind::String,
        }
    }

    /// Compare two values of the same variant.
    ///
    /// Returns `Ok(None)` for unordered doubles (NaN) and an error when the
    /// variants differ.
    pub fn compare(&self, other: &ValueType) -> Result<Option<Ordering>, TypeMismatchError> {
        match (self, other) {
            (ValueType::Int(a), ValueType::Int(b)) => Ok(Some(a.cmp(b))),
            (ValueType::UInt(a), ValueType::UInt(b)) => Ok(Some(a.cmp(b))),
            (ValueType::Double(a), ValueType::Double(b)) => Ok(a.partial_cmp(b)),
            (ValueType::DateTime(a), ValueType::DateTime(b)) => Ok(Some(a.cmp(b))),
            (ValueType::Time(a), ValueType::Time(b)) => Ok(Some(a.cmp(b))),
            (ValueType::String(a), ValueType::String(b)) => Ok(Some(a.cmp(b))),
            _ => Err(TypeMismatchError {
                value: self.kind(),
                operand: other.kind(),
            }),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int(v) => write!(f, "{}", v),
            ValueType::UInt(v) => write!(f, "{}", v),
            ValueType::Double(v) => write!(f, "{}", v),
            ValueType::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            ValueType::Time(v) => write!(f, "{}", v),
            ValueType::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ValueType {
    fn from(v: i64) -> Self {
        ValueType::Int(v)
    }
}

impl From<u64> for ValueType {
    fn from(v: u64) -> Self {
        ValueType::UInt(v)
    }
}

impl From<f64> for ValueType {
    fn from(v: f64) -> Self {
        ValueType::Double(v)
    }
}

impl From<&str> for ValueType {
    fn from(v: &str) -> Self {
        ValueType::String(v.to_string())
    }
}

impl From<String> for ValueType {
    fn from(v: String) -> Self {
        ValueType::String(v)
    }
}

impl From<DateTime<Utc>> for ValueType {
    fn from(v: DateTime<Utc>) -> Self {
        ValueType::DateTime(v)
    }
}

impl From<NaiveTime> for ValueType {
    fn from(v: NaiveTime) -> Self {
        ValueType::Time(v)
    }
}

/// A comparison applied across incompatible value variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot compare a {value} value with a {operand} operand")]
pub struct TypeMismatchError {
    /// Variant of the incoming value.
    pub value: ValueKind,
    /// Variant of the operand it was compared with.
    pub operand: ValueKind,
}

/// Comparison operator of a condition: `value <op> operand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    #[cfg_attr(feature = "serde", serde(rename = "<="))]
    LessOrEqual,
    #[cfg_attr(feature = "serde", serde(rename = "<"))]
    Less,
    #[cfg_attr(feature = "serde", serde(rename = "=="))]
    Equal,
    #[cfg_attr(feature = "serde", serde(rename = ">"))]
    Greater,
    #[cfg_attr(feature = "serde", serde(rename = ">="))]
    GreaterOrEqual,
}

impl CompareOp {
    /// Evaluate `value <op> operand`.
    ///
    /// Unordered doubles never satisfy any operator.
    pub fn evaluate(&self, value: &ValueType, operand: &ValueType) -> Result<bool, TypeMismatchError> {
        let Some(ord) = value.compare(operand)? else {
            return Ok(false);
        };

        Ok(match self {
            CompareOp::LessOrEqual => ord != Ordering::Greater,
            CompareOp::Less => ord == Ordering::Less,
            CompareOp::Equal => ord == Ordering::Equal,
            CompareOp::Greater => ord == Ordering::Greater,
            CompareOp::GreaterOrEqual => ord != Ordering::Less,
        })
    }

    /// Operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::LessOrEqual => "<=",
            CompareOp::Less => "<",
            CompareOp::Equal => "==",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Error returned when an operator symbol is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown comparison operator: {0}")]
pub struct UnknownOperator(pub String);

impl FromStr for CompareOp {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<=" => Ok(CompareOp::LessOrEqual),
            "<" => Ok(CompareOp::Less),
            "==" | "=" => Ok(CompareOp::Equal),
            ">" => Ok(CompareOp::Greater),
            ">=" => Ok(CompareOp::GreaterOrEqual),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}
