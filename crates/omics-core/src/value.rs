//! Cell values stored in omics tables

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Separator used when a list value is flattened to text
pub const LIST_SEPARATOR: &str = "|";

/// A cell value with type detection
///
/// `Empty` is the missing-value marker. List values come from list-valued
/// columns (e.g. several gene aliases in one cell) and from aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// List of values
    List(Vec<Value>),
    /// Empty/null cell
    Empty,
}

impl Value {
    /// Parse a string into a Value, detecting the type
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Value::Empty;
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Integer(i);
        }

        // NaN marks a missing value
        if let Ok(f) = trimmed.parse::<f64>() {
            return if f.is_nan() { Value::Empty } else { Value::Float(f) };
        }

        Value::String(trimmed.to_string())
    }

    /// Parse a separated string into a List value
    pub fn parse_list(s: &str, sep: &str) -> Self {
        let items: Vec<Value> = s
            .split(sep)
            .map(Value::parse)
            .filter(|v| !v.is_empty())
            .collect();

        if items.is_empty() {
            Value::Empty
        } else {
            Value::List(items)
        }
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Check if the cell holds a list
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Numeric view of a scalar
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String view of a scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Length used by the longest/shortest aggregators
    pub fn len_hint(&self) -> usize {
        match self {
            Value::String(s) => s.chars().count(),
            Value::List(items) => items.len(),
            Value::Empty => 0,
            other => other.to_string_value().len(),
        }
    }

    /// Scalars held by this value; lists are flattened
    pub fn iter_scalars(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Value::List(items) => Box::new(items.iter().flat_map(|v| v.iter_scalars())),
            Value::Empty => Box::new(std::iter::empty()),
            scalar => Box::new(std::iter::once(scalar)),
        }
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(|v| v.to_string_value())
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
            Value::Empty => String::new(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Empty, Value::Empty) => true,
            _ => false,
        }
    }
}

// Floats compare by bit pattern, so equality is total.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Empty => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_value_parse_scalars() {
        assert_eq!(Value::parse("42"), Value::Integer(42));
        assert_eq!(Value::parse("-2.5"), Value::Float(-2.5));
        assert_eq!(Value::parse(" TP53 "), Value::from("TP53"));
        assert_eq!(Value::parse("   "), Value::Empty);
    }

    #[test]
    fn test_nan_parses_as_empty() {
        assert_eq!(Value::parse("NaN"), Value::Empty);
        assert_eq!(Value::parse("nan"), Value::Empty);
        assert!(Value::parse("NaN").is_empty());
        assert_eq!(Value::parse("inf"), Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_value_parse_list() {
        assert_eq!(
            Value::parse_list("GO:1|GO:2||", "|"),
            Value::from(vec!["GO:1", "GO:2"])
        );
        assert_eq!(Value::parse_list("", "|"), Value::Empty);
    }

    #[test]
    fn test_iter_scalars_flattens() {
        let v = Value::List(vec![
            Value::from("a"),
            Value::List(vec![Value::from("b"), Value::Empty]),
        ]);
        let flat: Vec<&Value> = v.iter_scalars().collect();
        assert_eq!(flat, vec![&Value::from("a"), &Value::from("b")]);
        assert_eq!(Value::Empty.iter_scalars().count(), 0);
    }

    #[test]
    fn test_hash_usable_as_key() {
        let mut keys = HashSet::new();
        keys.insert(Value::Float(1.5));
        keys.insert(Value::Float(1.5));
        keys.insert(Value::Integer(1));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_untagged_json() {
        let v = Value::List(vec![Value::Integer(1), Value::from("x"), Value::Empty]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"[1,"x",null]"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_list_display() {
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "a|b");
    }
}
