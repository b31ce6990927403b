//! Binary serializer backed by rmp-serde (MessagePack).

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Serializer;
use crate::error::{CacheError, Result};

/// MessagePack encoding with named struct fields, so stored records survive
/// field reordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

impl MsgPackSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for MsgPackSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| {
            CacheError::Serialization(format!("Failed to serialize value to MessagePack: {}", e))
        })
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|e| {
            CacheError::Deserialization(format!("Failed to deserialize MessagePack: {}", e))
        })
    }

    fn name(&self) -> &'static str {
        "msgpack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Shape {
        Circle { radius: f64 },
        Square(u32),
        Empty,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Drawing {
        id: u64,
        shapes: Vec<Shape>,
        meta: HashMap<u32, String>,
        blob: Vec<u8>,
        parent: Option<u64>,
    }

    #[test]
    fn test_roundtrip_nested() {
        let serializer = MsgPackSerializer::new();
        let mut meta = HashMap::new();
        meta.insert(7, "seven".to_string());
        let drawing = Drawing {
            id: 1,
            shapes: vec![Shape::Circle { radius: 1.5 }, Shape::Square(4), Shape::Empty],
            meta,
            blob: vec![0, 1, 254, 255],
            parent: None,
        };

        let bytes = serializer.serialize(&drawing).unwrap();
        assert_eq!(serializer.deserialize::<Drawing>(&bytes).unwrap(), drawing);
    }

    #[test]
    fn test_non_string_map_keys_supported() {
        // Unlike JSON, MessagePack accepts arbitrary map keys
        let serializer = MsgPackSerializer::new();
        let mut map: HashMap<Vec<u8>, u32> = HashMap::new();
        map.insert(vec![1, 2], 3);

        let bytes = serializer.serialize(&map).unwrap();
        assert_eq!(
            serializer.deserialize::<HashMap<Vec<u8>, u32>>(&bytes).unwrap(),
            map
        );
    }

    #[test]
    fn test_truncated_bytes_fail() {
        let serializer = MsgPackSerializer::new();
        let bytes = serializer.serialize(&vec!["a", "b", "c"]).unwrap();

        let result = serializer.deserialize::<Vec<String>>(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(CacheError::Deserialization(_))));
    }

    #[test]
    fn test_json_bytes_are_not_msgpack() {
        let serializer = MsgPackSerializer::new();
        let result = serializer.deserialize::<Vec<u32>>(b"[1, 2, 3]");
        assert!(result.is_err());
    }
}
