//! Structured-text serializer backed by serde_json.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Serializer;
use crate::error::{CacheError, Result};

/// JSON encoding. Only supports values with a JSON form (maps need string keys).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            CacheError::Serialization(format!("Failed to serialize value to JSON: {}", e))
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| CacheError::Deserialization(format!("Failed to deserialize JSON: {}", e)))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: u32,
        tags: Vec<String>,
    }

    #[test]
    fn test_roundtrip_mixed_data() {
        let serializer = JsonSerializer::new();
        let value = json!({
            "string": "value",
            "number": 42,
            "list": [1, 2, 3],
            "dict": {"a": 1},
            "boolean": true,
            "null": null
        });

        let bytes = serializer.serialize(&value).unwrap();
        let decoded: serde_json::Value = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_roundtrip_struct() {
        let serializer = JsonSerializer::new();
        let user = User {
            name: "John".to_string(),
            age: 30,
            tags: vec!["admin".to_string()],
        };

        let bytes = serializer.serialize(&user).unwrap();
        assert_eq!(serializer.deserialize::<User>(&bytes).unwrap(), user);
    }

    #[test]
    fn test_unicode_roundtrip() {
        let serializer = JsonSerializer::new();
        let bytes = serializer.serialize("你好 🐍").unwrap();
        assert_eq!(serializer.deserialize::<String>(&bytes).unwrap(), "你好 🐍");
    }

    #[test]
    fn test_non_string_map_keys_fail() {
        let serializer = JsonSerializer::new();
        let mut map: HashMap<Vec<u8>, u32> = HashMap::new();
        map.insert(vec![1, 2], 3);

        let result = serializer.serialize(&map);
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_invalid_bytes_fail() {
        let serializer = JsonSerializer::new();
        let result = serializer.deserialize::<BTreeMap<String, u32>>(b"{not json");
        assert!(matches!(result, Err(CacheError::Deserialization(_))));

        let result = serializer.deserialize::<String>(&[0xff, 0xfe]);
        assert!(matches!(result, Err(CacheError::Deserialization(_))));
    }

    #[test]
    fn test_type_mismatch_fails() {
        let serializer = JsonSerializer::new();
        let bytes = serializer.serialize(&"text").unwrap();
        assert!(matches!(
            serializer.deserialize::<u64>(&bytes),
            Err(CacheError::Deserialization(_))
        ));
    }
}
