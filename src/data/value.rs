use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single cell of a query result row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Timestamp(i64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            Value::Timestamp(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret the value as a metric.
    ///
    /// Integers, floats and strings holding a number qualify. Booleans and
    /// timestamps do not: neither is a measurement worth trending.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) if v.is_finite() => Some(*v),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Interpret the value as a warning flag.
    ///
    /// Fails closed: anything that is not a recognizable boolean or number
    /// reads as `false`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int64(v) => *v != 0,
            Value::Float64(v) => *v != 0.0 && !v.is_nan(),
            Value::String(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    true
                } else if s.eq_ignore_ascii_case("false") {
                    false
                } else {
                    s.parse::<f64>().map(|v| v != 0.0 && !v.is_nan()).unwrap_or(false)
                }
            }
            Value::Null | Value::Timestamp(_) => false,
        }
    }

    /// Render the value as free text; nulls become the empty string
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Infer a value from a JSON cell
    pub fn from_json(json: &serde_json::Value, column_name: &str) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if column_name.eq_ignore_ascii_case("timestamp") {
                        Value::Timestamp(i)
                    } else {
                        Value::Int64(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    Value::Float64(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            // Nested structures are kept as their JSON text
            nested => Value::String(nested.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) | Value::Timestamp(i) => serde_json::Value::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            // Cross-type numeric comparisons
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Int64(b)) => a.to_bits() == (*b as f64).to_bits(),
            (Value::Int64(a), Value::Timestamp(b)) => a == b,
            (Value::Timestamp(a), Value::Int64(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_inference() {
        let json = serde_json::json!(42);
        assert!(matches!(Value::from_json(&json, "x"), Value::Int64(42)));

        let json = serde_json::json!(3.14);
        assert!(matches!(Value::from_json(&json, "x"), Value::Float64(_)));

        let json = serde_json::json!("hello");
        assert!(matches!(Value::from_json(&json, "x"), Value::String(_)));

        let json = serde_json::json!(true);
        assert!(matches!(Value::from_json(&json, "x"), Value::Bool(true)));
    }

    #[test]
    fn test_timestamp_inference() {
        let json = serde_json::json!(1234567890);
        assert!(matches!(
            Value::from_json(&json, "timestamp"),
            Value::Timestamp(1234567890)
        ));
    }

    #[test]
    fn test_truthy_accepts_ints_bools_and_numeric_strings() {
        assert!(Value::Int64(1).truthy());
        assert!(!Value::Int64(0).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::String(" 1 ".into()).truthy());
        assert!(!Value::String("0".into()).truthy());
        assert!(Value::String("TRUE".into()).truthy());
        assert!(Value::Float64(0.5).truthy());
    }

    #[test]
    fn test_truthy_fails_closed() {
        assert!(!Value::String("yes please".into()).truthy());
        assert!(!Value::String(String::new()).truthy());
        assert!(!Value::Null.truthy());
        assert!(!Value::Float64(f64::NAN).truthy());
    }

    #[test]
    fn test_as_number() {
        assert_eq!(Value::Int64(7).as_number(), Some(7.0));
        assert_eq!(Value::String("12.5".into()).as_number(), Some(12.5));
        assert_eq!(Value::String("abc".into()).as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), None);
        assert_eq!(Value::Timestamp(1000).as_number(), None);
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Int64(1) < Value::Int64(2));
        assert!(Value::Int64(1) < Value::Float64(1.5));
        assert!(Value::String("a".into()) < Value::String("b".into()));
    }
}
