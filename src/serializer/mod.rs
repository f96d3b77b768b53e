//! Conversion of application values into JSON-safe frames.
//!
//! [`serialize`] never fails: enum-like values become their canonical
//! lowercase name, timestamps become ISO-8601 strings, domain models are
//! dumped through [`ToWireFormat`] and anything unrecognised falls back to
//! its string form. A bad payload for one recipient must not break delivery
//! to anyone else.

mod value;

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use serde_json::{Map, Number, Value};

pub use value::{MapKey, MessageValue, ToWireFormat, WireEnum};

/// Placeholder emitted when user code panics while being converted, or when
/// nesting runs past [`MAX_DEPTH`]
const UNSERIALIZABLE: &str = "<unserializable>";

/// Deepest nesting converted before the placeholder is used. Keeps a model
/// whose dump contains itself from exhausting the stack.
pub const MAX_DEPTH: usize = 64;

/// Serialize a message value into JSON. Never panics, never errors.
pub fn serialize(value: &MessageValue) -> Value {
    serialize_at(value, 0)
}

fn serialize_at(value: &MessageValue, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        tracing::warn!(max_depth = MAX_DEPTH, "Value nested too deeply, using placeholder");
        return Value::String(UNSERIALIZABLE.to_string());
    }

    match value {
        MessageValue::Null => Value::Null,
        MessageValue::Bool(b) => Value::Bool(*b),
        MessageValue::Int(n) => Value::Number((*n).into()),
        MessageValue::UInt(n) => Value::Number((*n).into()),
        MessageValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        MessageValue::Text(s) => Value::String(s.clone()),
        MessageValue::Enum(name) => Value::String(canonical_enum_name(name)),
        MessageValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        MessageValue::Model(model) => {
            match catch_unwind(AssertUnwindSafe(|| model.to_wire())) {
                Ok(dumped) => serialize_at(&dumped, depth + 1),
                Err(_) => {
                    tracing::warn!("Model dump panicked during serialization");
                    Value::String(UNSERIALIZABLE.to_string())
                }
            }
        }
        MessageValue::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, val) in entries {
                map.insert(key.canonical(), serialize_at(val, depth + 1));
            }
            Value::Object(map)
        }
        MessageValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| serialize_at(item, depth + 1))
                .collect(),
        ),
        MessageValue::Json(json) => json.clone(),
        MessageValue::Opaque(display) => {
            match catch_unwind(AssertUnwindSafe(|| display.to_string())) {
                Ok(s) => Value::String(s),
                Err(_) => Value::String(UNSERIALIZABLE.to_string()),
            }
        }
    }
}

/// Serialize any serde value, falling back to a descriptive string when the
/// value cannot be represented as JSON.
pub fn serialize_serde<T: Serialize + ?Sized>(value: &T) -> Value {
    match catch_unwind(AssertUnwindSafe(|| serde_json::to_value(value))) {
        Ok(Ok(json)) => json,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Value not representable as JSON, using string form");
            Value::String(format!("<unserializable: {}>", e))
        }
        Err(_) => {
            tracing::warn!("Serialize impl panicked, using placeholder");
            Value::String(UNSERIALIZABLE.to_string())
        }
    }
}

/// Canonical wire form of an enum variant's symbolic name.
///
/// `OPEN` -> `open`, `HALF_OPEN` -> `half_open`, `HalfOpen` -> `half_open`.
pub fn canonical_enum_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;

    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::fmt;
    use std::sync::Arc;

    #[derive(Clone, Copy)]
    enum CircuitState {
        Closed,
        Open,
        HalfOpen,
    }

    impl WireEnum for CircuitState {
        fn variant_name(&self) -> &'static str {
            match self {
                Self::Closed => "CLOSED",
                Self::Open => "OPEN",
                Self::HalfOpen => "HalfOpen",
            }
        }
    }

    struct AgentStatus {
        agent: String,
        state: CircuitState,
        updated_at: chrono::DateTime<Utc>,
    }

    impl ToWireFormat for AgentStatus {
        fn to_wire(&self) -> MessageValue {
            MessageValue::map([
                ("agent", MessageValue::from(self.agent.as_str())),
                ("state", MessageValue::from_enum(&self.state)),
                ("updated_at", MessageValue::from(self.updated_at)),
            ])
        }
    }

    struct PanickingModel;

    impl ToWireFormat for PanickingModel {
        fn to_wire(&self) -> MessageValue {
            panic!("dump failed")
        }
    }

    struct PanickingDisplay;

    impl fmt::Display for PanickingDisplay {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("display failed")
        }
    }

    #[test]
    fn test_enum_uses_name_not_discriminant() {
        let value = MessageValue::from_enum(&CircuitState::Open);
        assert_eq!(serialize(&value), json!("open"));
        assert_eq!(
            serialize(&MessageValue::from_enum(&CircuitState::Closed)),
            json!("closed")
        );
        assert_eq!(
            serialize(&MessageValue::from_enum(&CircuitState::HalfOpen)),
            json!("half_open")
        );
    }

    #[test]
    fn test_canonical_enum_name() {
        assert_eq!(canonical_enum_name("OPEN"), "open");
        assert_eq!(canonical_enum_name("HALF_OPEN"), "half_open");
        assert_eq!(canonical_enum_name("HalfOpen"), "half_open");
        assert_eq!(canonical_enum_name("agent_started"), "agent_started");
        assert_eq!(canonical_enum_name("Http2Ready"), "http2_ready");
    }

    #[test]
    fn test_timestamp_is_iso8601() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            serialize(&MessageValue::from(ts)),
            json!("2024-05-01T12:30:00+00:00")
        );
    }

    #[test]
    fn test_model_dump_is_recursively_serialized() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let status = AgentStatus {
            agent: "triage".to_string(),
            state: CircuitState::HalfOpen,
            updated_at: ts,
        };

        let value = MessageValue::model(status);
        assert_eq!(
            serialize(&value),
            json!({
                "agent": "triage",
                "state": "half_open",
                "updated_at": "2024-01-02T03:04:05+00:00"
            })
        );
    }

    #[test]
    fn test_enum_map_keys_are_canonicalized() {
        let value = MessageValue::Map(vec![
            (MapKey::from_enum(&CircuitState::Open), MessageValue::Int(3)),
            (MapKey::from("plain"), MessageValue::Null),
        ]);

        assert_eq!(serialize(&value), json!({"open": 3, "plain": null}));
    }

    #[test]
    fn test_nested_sequences_and_null() {
        let value = MessageValue::List(vec![
            MessageValue::Null,
            MessageValue::from(vec![MessageValue::from(1), MessageValue::from_enum(&CircuitState::Closed)]),
            MessageValue::from(Option::<i64>::None),
        ]);

        assert_eq!(serialize(&value), json!([null, [1, "closed"], null]));
    }

    #[test]
    fn test_non_finite_float_falls_back_to_string() {
        assert_eq!(serialize(&MessageValue::Float(f64::NAN)), json!("NaN"));
        assert_eq!(serialize(&MessageValue::Float(1.5)), json!(1.5));
    }

    #[test]
    fn test_panicking_model_does_not_propagate() {
        let value = MessageValue::map([
            ("ok", MessageValue::from(true)),
            ("bad", MessageValue::model(PanickingModel)),
        ]);

        assert_eq!(
            serialize(&value),
            json!({"ok": true, "bad": UNSERIALIZABLE})
        );
    }

    #[test]
    fn test_self_referencing_model_is_cut_off() {
        struct Looping(std::sync::Weak<Looping>);

        impl ToWireFormat for Looping {
            fn to_wire(&self) -> MessageValue {
                match self.0.upgrade() {
                    Some(me) => MessageValue::map([("next", MessageValue::Model(me))]),
                    None => MessageValue::Null,
                }
            }
        }

        let looping = Arc::new_cyclic(|weak| Looping(weak.clone()));
        let mut current = &serialize(&MessageValue::Model(looping.clone()));

        let mut depth = 0;
        while let Some(next) = current.get("next") {
            current = next;
            depth += 1;
        }
        assert_eq!(*current, json!("<unserializable>"));
        assert!(depth <= MAX_DEPTH);
    }

    #[test]
    fn test_opaque_uses_display() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            serialize(&MessageValue::opaque(id)),
            json!("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(
            serialize(&MessageValue::Opaque(Arc::new(PanickingDisplay))),
            json!(UNSERIALIZABLE)
        );
    }

    #[test]
    fn test_serialize_serde_fallback() {
        use std::collections::HashMap;

        let mut ok = HashMap::new();
        ok.insert("a", 1);
        assert_eq!(serialize_serde(&ok), json!({"a": 1}));

        // Non-string map keys cannot be represented as JSON objects
        let mut bad: HashMap<(i32, i32), i32> = HashMap::new();
        bad.insert((1, 2), 3);
        let result = serialize_serde(&bad);
        assert!(result.as_str().unwrap().starts_with("<unserializable"));
    }

    #[test]
    fn test_json_passthrough() {
        let raw = json!({"type": "agent_update", "data": [1, 2]});
        assert_eq!(serialize(&MessageValue::from(raw.clone())), raw);
    }
}
