//! Cell values and column types.

use std::fmt;

use serde::{Serialize, Serializer};

/// A single cell of a loaded table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing cell.
    Null,
    /// Integer cell (`int64` columns).
    Int(i64),
    /// Floating-point cell (`float64` columns).
    Float(f64),
    /// Boolean cell.
    Bool(bool),
    /// Text cell (`object` columns).
    Str(String),
}

impl Value {
    /// Returns `true` for missing cells, including NaN floats.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Booleans count as 0/1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Null | Self::Str(_) => None,
        }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NoneType",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_str("NaN"),
            Self::Int(i) => serializer.serialize_i64(*i),
            // JSON has no NaN or infinity; fall back to their string form
            Self::Float(f) if f.is_nan() => serializer.serialize_str("NaN"),
            Self::Float(f) if f.is_infinite() => {
                serializer.serialize_str(if *f > 0.0 { "inf" } else { "-inf" })
            }
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NaN"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Inferred column type, named after the data-analysis convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 64-bit signed integers with no missing cells.
    Int64,
    /// 64-bit floats; missing cells are allowed.
    Float64,
    /// Booleans with no missing cells.
    Bool,
    /// Anything else: text, or booleans mixed with missing cells.
    Object,
}

impl DType {
    /// The dtype name as reported in `dtypes` maps.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Object => "object",
        }
    }

    /// Whether the column participates in numeric statistics.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_floats_serialise_as_strings() {
        let json = serde_json::to_string(&Value::Float(f64::NAN)).unwrap();
        assert_eq!(json, r#""NaN""#);
        let json = serde_json::to_string(&Value::Float(f64::INFINITY)).unwrap();
        assert_eq!(json, r#""inf""#);
        let json = serde_json::to_string(&Value::Float(f64::NEG_INFINITY)).unwrap();
        assert_eq!(json, r#""-inf""#);
    }

    #[test]
    fn values_serialise_natively() {
        let json = serde_json::to_string(&vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::Bool(true),
            Value::Str("x".to_string()),
            Value::Null,
        ])
        .unwrap();
        assert_eq!(json, r#"[1,2.5,true,"x","NaN"]"#);
    }

    #[test]
    fn dtype_names() {
        assert_eq!(DType::Int64.name(), "int64");
        assert_eq!(DType::Object.to_string(), "object");
        assert!(DType::Float64.is_numeric());
        assert!(!DType::Bool.is_numeric());
    }

    #[test]
    fn nan_float_is_null() {
        assert!(Value::Float(f64::NAN).is_null());
        assert!(!Value::Float(0.0).is_null());
        assert!(Value::Null.is_null());
    }
}
