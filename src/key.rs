//! Key Builder Module
//!
//! Derives stable cache keys from a namespace and a call's arguments.
//!
//! Arguments are canonicalized through `serde_json::Value` with object keys
//! sorted, so equal arguments give equal keys regardless of map iteration
//! order or keyword order. The canonical text is hashed with SHA-256, which
//! bounds key length and keeps raw argument values out of storage keys.
//!
//! JSON has no spelling for NaN or infinity and `serde_json` writes them as
//! `null`. Arguments holding such floats are rejected instead, so they never
//! share a key with `None`.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Separates the namespace from the canonical arguments. JSON escapes control
/// characters, so it never appears in the canonical form.
pub const KEY_DELIMITER: char = '\u{1f}';

// == Call Args ==
/// Positional and keyword arguments of one call.
///
/// Conversion errors are recorded and reported when the key is built, so the
/// builder chain stays infallible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
    error: Option<String>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        let position = self.positional.len();
        if let Some(value) = self.convert(value, || format!("positional #{}", position)) {
            self.positional.push(value);
        }
        self
    }

    /// Sets a keyword argument. A repeated name replaces the earlier value.
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        let name = name.into();
        if let Some(value) = self.convert(value, || format!("keyword '{}'", name)) {
            self.keyword.insert(name, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty() && self.error.is_none()
    }

    /// Canonical text form: `[positional, keyword]` as compact JSON.
    pub fn canonical(&self) -> Result<String> {
        if let Some(reason) = &self.error {
            return Err(CacheError::UnhashableArgument(reason.clone()));
        }

        let keyword: serde_json::Map<String, Value> = self
            .keyword
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let form = Value::Array(vec![
            Value::Array(self.positional.clone()),
            Value::Object(keyword),
        ]);

        serde_json::to_string(&form).map_err(|e| CacheError::UnhashableArgument(e.to_string()))
    }

    fn convert<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        describe: impl FnOnce() -> String,
    ) -> Option<Value> {
        if self.error.is_some() {
            return None;
        }
        let converted = value
            .serialize(FiniteCheck)
            .map_err(|e| e.to_string())
            .and_then(|()| serde_json::to_value(value).map_err(|e| e.to_string()));
        match converted {
            Ok(value) => Some(sort_keys(value)),
            Err(e) => {
                self.error = Some(format!("{} has no canonical form: {}", describe(), e));
                None
            }
        }
    }
}

/// Rebuilds objects with keys in sorted order at every depth.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(name, inner)| (name, sort_keys(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

// == Finite Check ==
/// Serializer that produces nothing and fails on the first NaN or infinite
/// float anywhere in a value.
struct FiniteCheck;

#[derive(Debug)]
struct NonFinite(String);

impl fmt::Display for NonFinite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NonFinite {}

impl ser::Error for NonFinite {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        NonFinite(msg.to_string())
    }
}

type Check = std::result::Result<(), NonFinite>;

fn check_float(finite: bool, value: impl fmt::Display) -> Check {
    if finite {
        Ok(())
    } else {
        Err(NonFinite(format!("non-finite float {}", value)))
    }
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = NonFinite;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_f32(self, v: f32) -> Check {
        check_float(v.is_finite(), v)
    }

    fn serialize_f64(self, v: f64) -> Check {
        check_float(v.is_finite(), v)
    }

    fn serialize_bool(self, _v: bool) -> Check {
        Ok(())
    }

    fn serialize_i8(self, _v: i8) -> Check {
        Ok(())
    }

    fn serialize_i16(self, _v: i16) -> Check {
        Ok(())
    }

    fn serialize_i32(self, _v: i32) -> Check {
        Ok(())
    }

    fn serialize_i64(self, _v: i64) -> Check {
        Ok(())
    }

    fn serialize_i128(self, _v: i128) -> Check {
        Ok(())
    }

    fn serialize_u8(self, _v: u8) -> Check {
        Ok(())
    }

    fn serialize_u16(self, _v: u16) -> Check {
        Ok(())
    }

    fn serialize_u32(self, _v: u32) -> Check {
        Ok(())
    }

    fn serialize_u64(self, _v: u64) -> Check {
        Ok(())
    }

    fn serialize_u128(self, _v: u128) -> Check {
        Ok(())
    }

    fn serialize_char(self, _v: char) -> Check {
        Ok(())
    }

    fn serialize_str(self, _v: &str) -> Check {
        Ok(())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Check {
        Ok(())
    }

    fn serialize_none(self) -> Check {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Check {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Check {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Check {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Check {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, NonFinite> {
        Ok(self)
    }
}

macro_rules! finite_check_compound {
    ($($kind:ident :: $method:ident),+) => {
        $(
            impl ser::$kind for FiniteCheck {
                type Ok = ();
                type Error = NonFinite;

                fn $method<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
                    value.serialize(FiniteCheck)
                }

                fn end(self) -> Check {
                    Ok(())
                }
            }
        )+
    };
}

finite_check_compound!(
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field
);

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Check {
        key.serialize(FiniteCheck)
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, value: &T) -> Check {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = NonFinite;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _key: &'static str, value: &T) -> Check {
        value.serialize(FiniteCheck)
    }

    fn end(self) -> Check {
        Ok(())
    }
}

// == Into Call Args ==
/// Types that describe a call's arguments.
///
/// Implemented for [`CallArgs`], `()` and tuples of up to six serializable
/// values (each element becomes one positional argument).
pub trait IntoCallArgs {
    fn to_call_args(&self) -> CallArgs;
}

impl IntoCallArgs for CallArgs {
    fn to_call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl IntoCallArgs for () {
    fn to_call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

macro_rules! tuple_call_args {
    ($($name:ident),+) => {
        impl<$($name: Serialize),+> IntoCallArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn to_call_args(&self) -> CallArgs {
                let ($($name,)+) = self;
                CallArgs::new()$(.arg($name))+
            }
        }
    };
}

tuple_call_args!(A);
tuple_call_args!(A, B);
tuple_call_args!(A, B, C);
tuple_call_args!(A, B, C, D);
tuple_call_args!(A, B, C, D, E);
tuple_call_args!(A, B, C, D, E, F);

// == Key Builder ==
/// Builds keys for one namespace, typically a function's qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the 64-character hex SHA-256 key for `args`.
    ///
    /// # Errors
    /// `UnhashableArgument` when an argument could not be canonicalized.
    pub fn build(&self, args: &CallArgs) -> Result<String> {
        let canonical = args.canonical()?;

        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        let mut delimiter = [0u8; 4];
        hasher.update(KEY_DELIMITER.encode_utf8(&mut delimiter).as_bytes());
        hasher.update(canonical.as_bytes());

        Ok(hex::encode(hasher.finalize()))
    }
}

/// Shorthand for `KeyBuilder::new(namespace).build(args)`.
pub fn make_key(namespace: &str, args: &CallArgs) -> Result<String> {
    KeyBuilder::new(namespace).build(args)
}
