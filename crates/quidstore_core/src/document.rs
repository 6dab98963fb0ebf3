//! Documents and their JSON encoding.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fmt;

/// Name of the identity field every document carries.
pub const UUID_FIELD: &str = "uuid";

/// The JSON kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Any JSON number.
    Number,
    /// A string.
    String,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
}

impl ValueKind {
    /// Returns the kind of `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
        }
    }

    /// Returns the lowercase name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compares two JSON values for equality.
///
/// Identical to `==` except that numbers compare by numeric value, so
/// `1` equals `1.0`.
#[must_use]
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => map_eq(x, y),
        _ => a == b,
    }
}

/// Returns an integral number without loss, covering both `i64` and `u64`.
pub(crate) fn exact_integer(n: &serde_json::Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Compares two JSON objects with [`json_eq`] semantics.
#[must_use]
pub fn map_eq(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(k, v)| b.get(k).is_some_and(|other| json_eq(v, other)))
}

/// Steps one path segment into a value.
///
/// Objects are indexed by key, arrays by a decimal position.
#[must_use]
pub fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// A stored JSON document.
///
/// A document is a JSON object. Every stored document carries a unique
/// `uuid` string that is also the name of its file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the value is not an object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::invalid_operation(format!(
                "a document must be a JSON object, got {}",
                ValueKind::of(&other)
            ))),
        }
    }

    /// Returns the document id, if present and a string.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.0.get(UUID_FIELD).and_then(Value::as_str)
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value at a dotted path such as `stats.hp`.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.0.get(segments.next()?)?;
        segments.try_fold(first, |value, segment| step(value, segment))
    }

    /// Inserts a top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns `true` if the top-level field exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the underlying map mutably.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Consumes the document, returning the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Consumes the document, returning it as a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Deserializes the document into a typed record.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the document does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> CoreResult<T> {
        Ok(T::deserialize(Value::Object(self.0.clone()))?)
    }

    /// Encodes the document as tab-indented JSON.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        let formatter = PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.0.serialize(&mut serializer)?;
        Ok(buf)
    }

    /// Decodes the stored bytes of document `id`.
    ///
    /// # Errors
    ///
    /// Returns a `Codec` error if the bytes are not a JSON object.
    pub fn decode(id: &str, bytes: &[u8]) -> CoreResult<Self> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(CoreError::codec(
                id,
                format!("expected a JSON object, found {}", ValueKind::of(&other)),
            )),
            Err(e) => Err(CoreError::codec(id, e.to_string())),
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = CoreError;

    fn try_from(value: Value) -> CoreResult<Self> {
        Self::from_value(value)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn encode_uses_tab_indentation() {
        let d = doc(json!({"name": "Rex", "uuid": "a1"}));
        let text = String::from_utf8(d.encode().unwrap()).unwrap();
        assert_eq!(text, "{\n\t\"name\": \"Rex\",\n\t\"uuid\": \"a1\"\n}");
    }

    #[test]
    fn decode_round_trip() {
        let d = doc(json!({"hp": 70, "stats": {"level": 2}, "uuid": "a1"}));
        let decoded = Document::decode("a1", &d.encode().unwrap()).unwrap();
        assert_eq!(decoded, d);
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(
            Document::decode("x", b"[1, 2]"),
            Err(CoreError::Codec { .. })
        ));
        assert!(matches!(
            Document::decode("x", b"{\"trunc"),
            Err(CoreError::Codec { .. })
        ));
    }

    #[test]
    fn from_value_rejects_scalars() {
        assert!(Document::from_value(json!(3)).is_err());
    }

    #[test]
    fn dotted_paths() {
        let d = doc(json!({"stats": {"hp": 5}, "items": [{"name": "stick"}]}));
        assert_eq!(d.get_path("stats.hp"), Some(&json!(5)));
        assert_eq!(d.get_path("items.0.name"), Some(&json!("stick")));
        assert_eq!(d.get_path("items.1.name"), None);
        assert_eq!(d.get_path("stats.hp.deeper"), None);
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        assert!(json_eq(&json!(1), &json!(1.0)));
        assert!(json_eq(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!json_eq(&json!(1), &json!("1")));
        assert!(!json_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn typed_deserialize() {
        #[derive(Deserialize)]
        struct Profile {
            name: String,
            hp: u32,
        }

        let d = doc(json!({"name": "Rex", "hp": 100, "uuid": "a1"}));
        let profile: Profile = d.deserialize().unwrap();
        assert_eq!(profile.name, "Rex");
        assert_eq!(profile.hp, 100);
    }

    #[test]
    fn value_kinds() {
        assert_eq!(ValueKind::of(&json!(null)), ValueKind::Null);
        assert_eq!(ValueKind::of(&json!([1])), ValueKind::Array);
        assert_eq!(ValueKind::Object.to_string(), "object");
    }
}
