//! Typed input model for the serializer.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::canonical_enum_name;

/// Enum-like values that travel by symbolic name, never by discriminant
pub trait WireEnum {
    fn variant_name(&self) -> &'static str;
}

/// Domain models that know how to dump themselves into a structured value.
/// The dump is serialized recursively, so it may contain enums, timestamps
/// and nested models.
pub trait ToWireFormat: Send + Sync {
    fn to_wire(&self) -> MessageValue;
}

/// Map key: plain text, or an enum that is canonicalized like enum values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    Text(String),
    Enum(&'static str),
}

impl MapKey {
    pub fn from_enum<E: WireEnum + ?Sized>(value: &E) -> Self {
        Self::Enum(value.variant_name())
    }

    pub fn canonical(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Enum(name) => canonical_enum_name(name),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Any value an event emitter may hand to the delivery engine
#[derive(Clone, Default)]
pub enum MessageValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    /// Symbolic enum name, canonicalized on output
    Enum(&'static str),
    Timestamp(DateTime<Utc>),
    Model(Arc<dyn ToWireFormat>),
    Map(Vec<(MapKey, MessageValue)>),
    List(Vec<MessageValue>),
    /// Already JSON; passed through untouched
    Json(serde_json::Value),
    /// Unrecognised value, emitted via its `Display` form
    Opaque(Arc<dyn fmt::Display + Send + Sync>),
}

impl MessageValue {
    pub fn from_enum<E: WireEnum + ?Sized>(value: &E) -> Self {
        Self::Enum(value.variant_name())
    }

    pub fn model<M: ToWireFormat + 'static>(model: M) -> Self {
        Self::Model(Arc::new(model))
    }

    pub fn opaque<D: fmt::Display + Send + Sync + 'static>(value: D) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Build a map from `(key, value)` pairs, preserving their order
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<MapKey>,
        I: IntoIterator<Item = (K, MessageValue)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Debug for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Self::UInt(n) => f.debug_tuple("UInt").field(n).finish(),
            Self::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Enum(name) => f.debug_tuple("Enum").field(name).finish(),
            Self::Timestamp(ts) => f.debug_tuple("Timestamp").field(ts).finish(),
            Self::Model(_) => f.write_str("Model(..)"),
            Self::Map(entries) => f.debug_list().entries(entries.iter()).finish(),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Json(json) => f.debug_tuple("Json").field(json).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<bool> for MessageValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for MessageValue {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<i64> for MessageValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for MessageValue {
    fn from(n: u32) -> Self {
        Self::UInt(n as u64)
    }
}

impl From<u64> for MessageValue {
    fn from(n: u64) -> Self {
        Self::UInt(n)
    }
}

impl From<usize> for MessageValue {
    fn from(n: usize) -> Self {
        Self::UInt(n as u64)
    }
}

impl From<f64> for MessageValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for MessageValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MessageValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<DateTime<Utc>> for MessageValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<serde_json::Value> for MessageValue {
    fn from(json: serde_json::Value) -> Self {
        Self::Json(json)
    }
}

impl<T: Into<MessageValue>> From<Option<T>> for MessageValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<T: Into<MessageValue>> From<Vec<T>> for MessageValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_order() {
        let value = MessageValue::map([("b", MessageValue::from(1)), ("a", MessageValue::from(2))]);
        match value {
            MessageValue::Map(entries) => {
                let keys: Vec<String> = entries.iter().map(|(k, _)| k.canonical()).collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_option_conversion() {
        assert!(MessageValue::from(Option::<String>::None).is_null());
        assert!(matches!(MessageValue::from(Some(7i64)), MessageValue::Int(7)));
    }
}
