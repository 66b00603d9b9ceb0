//! Scalar attribute values carried by spans, and their canonical forms.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar value attached to a span's attribute map.
///
/// `spec.md` §3 restricts span attributes to string, integer,
/// floating-point, or boolean scalars.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A UTF-8 string value.
    String(String),
    /// A signed 64-bit integer value.
    Int(i64),
    /// A 64-bit floating point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl AttributeValue {
    /// Returns the canonical string form of this value, used for
    /// string-equality, string-order, and `contains` comparisons.
    ///
    /// `spec.md` §3/§4.3: "string-compare after converting the attribute
    /// value to its canonical string form".
    #[must_use]
    pub fn canonical_string(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Int(n) => n.to_string(),
            AttributeValue::Float(n) => format_canonical_float(*n),
            AttributeValue::Bool(b) => b.to_string(),
        }
    }

    /// Attempts to parse this value as a canonical `f64`, for numeric
    /// comparisons.
    ///
    /// `spec.md` §4.3: "if both operands parse as numbers under a
    /// canonical numeric parse, comparison is numeric".
    #[must_use]
    pub fn as_canonical_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(n) => Some(*n as f64),
            AttributeValue::Float(n) => Some(*n),
            AttributeValue::Bool(_) => None,
            AttributeValue::String(s) => parse_canonical_number(s),
        }
    }
}

/// Parses a string as a canonical number, the same parse both sides of a
/// comparison must agree on before numeric comparison is used.
#[must_use]
pub fn parse_canonical_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

fn format_canonical_float(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Int(n)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Float(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn canonical_string_formats_integral_floats_without_trailing_zero() {
        assert_eq!(AttributeValue::Float(5000.0).canonical_string(), "5000");
        assert_eq!(AttributeValue::Float(5000.5).canonical_string(), "5000.5");
    }

    #[test]
    fn numeric_parse_agrees_across_representations() {
        let int_val = AttributeValue::Int(1000);
        let str_val = AttributeValue::String("1000".to_owned());
        assert_eq!(int_val.as_canonical_number(), str_val.as_canonical_number());
    }

    #[test]
    fn bool_is_not_numeric() {
        assert_eq!(AttributeValue::Bool(true).as_canonical_number(), None);
    }

    #[test]
    fn non_numeric_string_has_no_canonical_number() {
        assert_eq!(AttributeValue::String("USD".to_owned()).as_canonical_number(), None);
    }
}
