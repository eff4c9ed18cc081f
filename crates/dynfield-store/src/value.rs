//! The type-erased stored value.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single preference entry.
///
/// The store itself is type-erased: keys map to opaque `Value`s, and each
/// field declaration enforces one static type per key through the typed
/// accessors. Enum settings persist as their zero-based ordinal in `Int`;
/// timestamps persist as fixed-pattern text in `String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    String(String),
    /// Unordered set of strings.
    StringSet(BTreeSet<String>),
}

impl Value {
    /// The variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::StringSet(_) => "string_set",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_representation_is_stable() {
        let value = Value::Int(42);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"t":"int","v":42}"#);
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);
    }

    #[test]
    fn string_sets_serialize_sorted() {
        let value = Value::StringSet(BTreeSet::from(["b".to_string(), "a".to_string()]));
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"t":"string_set","v":["a","b"]}"#);
    }
}
