//! Serializer Module
//!
//! Converts values to opaque bytes and back. The facade never looks inside
//! the bytes; only the serializer that produced them can read them.

mod json;
mod msgpack;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use json::JsonSerializer;
pub use msgpack::MsgPackSerializer;

// == Serializer Trait ==
/// Value codec used by the cache facades.
///
/// `deserialize(serialize(v))` must equal `v` for every type the
/// implementation accepts.
pub trait Serializer: Send + Sync {
    /// Encodes a value. Fails with `Serialization` when the value has no
    /// representation in this format.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decodes bytes. Fails with `Deserialization` on malformed input or a
    /// type mismatch.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Short format name for logs.
    fn name(&self) -> &'static str;
}
