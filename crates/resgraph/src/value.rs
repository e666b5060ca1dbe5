//! Dynamically typed field values.
//!
//! Resolver outputs are a tagged union checked once against the declared
//! [`ValueType`] when they cross the registry boundary, so consumers can
//! use the typed accessors instead of re-checking shapes at every use.

use crate::resource::Resource;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Declared type of a field or argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Any,
    Nil,
    Bool,
    Int,
    Float,
    String,
    Time,
    /// Arbitrary JSON-shaped data
    Dict,
    Array(Box<ValueType>),
    /// String-keyed map
    Map(Box<ValueType>),
    /// Instance of the named resource type
    Resource(String),
}

impl ValueType {
    /// `[]T`
    pub fn array(item: ValueType) -> Self {
        Self::Array(Box::new(item))
    }

    /// `map[string]T`
    pub fn map(item: ValueType) -> Self {
        Self::Map(Box::new(item))
    }

    /// Resource reference type
    pub fn resource(name: impl Into<String>) -> Self {
        Self::Resource(name.into())
    }

    /// Check whether a value conforms to this type.
    ///
    /// `Nil` conforms to every type and stands for an absent value.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Nil) | (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Float, Value::Float(_))
            | (ValueType::String, Value::String(_))
            | (ValueType::Time, Value::Time(_)) => true,
            (ValueType::Dict, value) => !value.contains_resource(),
            (ValueType::Array(item), Value::Array(items)) => items.iter().all(|v| item.accepts(v)),
            (ValueType::Map(item), Value::Map(entries)) => {
                entries.values().all(|v| item.accepts(v))
            }
            (ValueType::Resource(name), Value::Resource(resource)) => {
                resource.type_name() == name
            }
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "any"),
            ValueType::Nil => write!(f, "nil"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::String => write!(f, "string"),
            ValueType::Time => write!(f, "time"),
            ValueType::Dict => write!(f, "dict"),
            ValueType::Array(item) => write!(f, "[]{item}"),
            ValueType::Map(item) => write!(f, "map[string]{item}"),
            ValueType::Resource(name) => write!(f, "{name}"),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A field value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Time(DateTime<Utc>),
    Dict(serde_json::Value),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Resource(Arc<Resource>),
}

impl Value {
    /// The type this value actually has
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Time(_) => ValueType::Time,
            Value::Dict(_) => ValueType::Dict,
            Value::Array(items) => ValueType::array(
                items
                    .first()
                    .map_or(ValueType::Any, Value::value_type),
            ),
            Value::Map(entries) => ValueType::map(
                entries
                    .values()
                    .next()
                    .map_or(ValueType::Any, Value::value_type),
            ),
            Value::Resource(resource) => ValueType::resource(resource.type_name()),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening ints
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Arc<Resource>> {
        match self {
            Value::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Truthiness used when reducing results to pass/fail.
    ///
    /// Empty lists are false, lists and maps are true only when every
    /// element is, and resources are always true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Time(t) => t.timestamp() != 0,
            Value::Dict(json) => json_truthy(json),
            Value::Array(items) => !items.is_empty() && items.iter().all(Value::truthy),
            Value::Map(entries) => entries.values().all(Value::truthy),
            Value::Resource(_) => true,
        }
    }

    /// Convert plain JSON into native values (objects become maps).
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as JSON. Resources render as `{"resource": name, "id": id}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Time(t) => serde_json::Value::String(t.to_rfc3339()),
            Value::Dict(json) => json.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Resource(resource) => serde_json::json!({
                "resource": resource.type_name(),
                "id": resource.id(),
            }),
        }
    }

    fn contains_resource(&self) -> bool {
        match self {
            Value::Resource(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_resource),
            Value::Map(entries) => entries.values().any(Value::contains_resource),
            _ => false,
        }
    }
}

fn json_truthy(json: &serde_json::Value) -> bool {
    match json {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(items) => !items.is_empty() && items.iter().all(json_truthy),
        serde_json::Value::Object(entries) => entries.values().all(json_truthy),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Resource(a), Value::Resource(b)) => {
                Arc::ptr_eq(a, b) || (a.type_name() == b.type_name() && a.id() == b.id())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Resource(resource) => write!(f, "{resource}"),
            Value::Dict(_) | Value::Array(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

impl From<Arc<Resource>> for Value {
    fn from(resource: Arc<Resource>) -> Self {
        Value::Resource(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_primitives_and_nil() {
        assert!(ValueType::Int.accepts(&Value::Int(3)));
        assert!(!ValueType::Int.accepts(&Value::Float(3.0)));
        assert!(ValueType::String.accepts(&Value::Nil));
        assert!(ValueType::Any.accepts(&Value::from("x")));
    }

    #[test]
    fn test_accepts_nested() {
        let list = Value::Array(vec![Value::from("a"), Value::from("b")]);
        assert!(ValueType::array(ValueType::String).accepts(&list));
        assert!(!ValueType::array(ValueType::Int).accepts(&list));

        let mut entries = BTreeMap::new();
        entries.insert("k".to_string(), Value::Int(1));
        assert!(ValueType::map(ValueType::Int).accepts(&Value::Map(entries.clone())));
        assert!(ValueType::Dict.accepts(&Value::Map(entries)));
    }

    #[test]
    fn test_type_display() {
        assert_eq!(ValueType::array(ValueType::String).to_string(), "[]string");
        assert_eq!(
            ValueType::map(ValueType::array(ValueType::Int)).to_string(),
            "map[string][]int"
        );
        assert_eq!(ValueType::resource("file").to_string(), "file");
    }

    #[test]
    fn test_truthy() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("x").truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Array(vec![]).truthy());
        assert!(!Value::Array(vec![Value::Bool(true), Value::Bool(false)]).truthy());
        assert!(Value::Array(vec![Value::Bool(true), Value::Int(1)]).truthy());
        assert!(Value::Map(BTreeMap::new()).truthy());
        assert!(!Value::Dict(serde_json::json!({"a": 0})).truthy());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"name": "sonda", "port": 8080, "ratio": 0.5, "tags": ["a"], "none": null});
        let value = Value::from_json(&json);
        let map = value.as_map().unwrap();
        assert_eq!(map["port"], Value::Int(8080));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert_eq!(map["none"], Value::Nil);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(
            Value::Array(vec![Value::from("a"), Value::Int(1)]).to_string(),
            r#"["a",1]"#
        );
        assert_eq!(Value::Nil.to_string(), "null");
    }

    #[test]
    fn test_u64_saturates() {
        assert_eq!(Value::from(u64::MAX), Value::Int(i64::MAX));
        assert_eq!(Value::from(193_u64), Value::Int(193));
    }
}
