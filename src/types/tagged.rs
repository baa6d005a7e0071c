//! Lazily cast values decoded from msgpack frames

use bytes::Bytes;
use rmpv::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use super::Dtype;
use crate::{BridgeError, Result};

/// Container classification of a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    /// Scalar, nil or extension value
    Scalar,
    /// Codec array or binary blob
    ArrayLike,
    /// Codec map; unexpected in bridge payloads
    Map,
}

impl ContainerType {
    /// Label used in summaries; empty for scalars.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Scalar => "",
            ContainerType::ArrayLike => "array-like",
            ContainerType::Map => "map",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded value whose Rust type is only fixed when the caller casts it.
///
/// `dtype` and `size` are derived once from the node at construction time.
/// Enumerating fields and inspecting their dtypes never fails; only
/// [`TaggedValue::cast`] checks compatibility, and it never widens or narrows
/// numbers: a `u64` node is readable as `u64` only, an `f32` node as `f32` only.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedValue {
    value: Value,
    dtype: Dtype,
    size: usize,
}

impl TaggedValue {
    /// Wrap one decoded node. The node is moved, never copied.
    pub fn new(value: Value) -> Self {
        let dtype = node_dtype(&value);
        let size = node_size(&value);
        Self { value, dtype, size }
    }

    /// Element type for containers, the node's own type for scalars.
    pub fn dtype(&self) -> &Dtype {
        &self.dtype
    }

    /// Element count for containers, 0 for scalars and nil.
    pub fn size(&self) -> usize {
        self.size
    }

    /// `[size]` for containers, empty for scalars.
    pub fn shape(&self) -> Vec<usize> {
        match self.container_type() {
            ContainerType::Scalar => Vec::new(),
            _ => vec![self.size],
        }
    }

    pub fn container_type(&self) -> ContainerType {
        match self.value {
            Value::Array(_) | Value::Binary(_) => ContainerType::ArrayLike,
            Value::Map(_) => ContainerType::Map,
            _ => ContainerType::Scalar,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.value.is_nil()
    }

    /// Cast the held node into `T`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::CastMismatch`] if the node kind is not exactly `T`'s
    /// semantic type, [`BridgeError::SizeMismatch`] for fixed-length arrays of
    /// the wrong length.
    pub fn cast<T: FromTagged>(&self) -> Result<T> {
        T::from_tagged(&self.value)
    }

    /// Borrow a string node without copying.
    pub fn as_str(&self) -> Result<&str> {
        match &self.value {
            Value::String(s) => s.as_str().ok_or_else(|| mismatch::<&str>(&self.value)),
            other => Err(mismatch::<&str>(other)),
        }
    }

    /// Borrow a binary node without copying.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match &self.value {
            Value::Binary(bin) => Ok(bin),
            other => Err(mismatch::<&[u8]>(other)),
        }
    }

    /// The underlying decoded node.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl From<Value> for TaggedValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn node_size(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Map(entries) => entries.len(),
        Value::Binary(bin) => bin.len(),
        _ => 0,
    }
}

fn node_dtype(value: &Value) -> Dtype {
    match value {
        Value::Array(items) => items.first().map(scalar_dtype).unwrap_or(Dtype::Unknown),
        Value::Binary(_) => Dtype::Char,
        other => scalar_dtype(other),
    }
}

fn scalar_dtype(value: &Value) -> Dtype {
    match value {
        Value::Nil => Dtype::Nil,
        Value::Boolean(_) => Dtype::Bool,
        Value::Integer(i) if i.is_u64() => Dtype::UInt64,
        Value::Integer(_) => Dtype::Int64,
        Value::F32(_) => Dtype::Float32,
        Value::F64(_) => Dtype::Float64,
        Value::String(_) => Dtype::String,
        Value::Binary(_) | Value::Array(_) | Value::Map(_) | Value::Ext(..) => Dtype::Undefined,
    }
}

/// "array-like of u64", "map of undefined" or just "f32".
fn describe(value: &Value) -> String {
    let dtype = node_dtype(value);
    match value {
        Value::Array(_) | Value::Binary(_) => format!("array-like of {dtype}"),
        Value::Map(_) => format!("map of {dtype}"),
        _ => dtype.to_string(),
    }
}

fn mismatch<T: ?Sized>(value: &Value) -> BridgeError {
    BridgeError::CastMismatch { requested: std::any::type_name::<T>(), found: describe(value) }
}

/// Types a [`TaggedValue`] can be cast into.
pub trait FromTagged: Sized {
    /// Convert a decoded node, failing on any kind mismatch.
    fn from_tagged(value: &Value) -> Result<Self>;

    /// Convert the elements of a binary blob. Only byte-sized element types
    /// accept one; sequence casts fall back to a mismatch otherwise.
    #[doc(hidden)]
    fn from_binary(_bytes: &[u8]) -> Option<Vec<Self>> {
        None
    }
}

impl FromTagged for bool {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

// A char element only exists inside a binary blob, so a lone node never casts.
impl FromTagged for u8 {
    fn from_tagged(value: &Value) -> Result<Self> {
        Err(mismatch::<Self>(value))
    }

    fn from_binary(bytes: &[u8]) -> Option<Vec<Self>> {
        Some(bytes.to_vec())
    }
}

impl FromTagged for u64 {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) if i.is_u64() => i.as_u64().ok_or_else(|| mismatch::<Self>(value)),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl FromTagged for i64 {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) if !i.is_u64() => i.as_i64().ok_or_else(|| mismatch::<Self>(value)),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl FromTagged for f32 {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::F32(v) => Ok(*v),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl FromTagged for f64 {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::F64(v) => Ok(*v),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl FromTagged for String {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => s.as_str().map(str::to_owned).ok_or_else(|| mismatch::<Self>(value)),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl FromTagged for Bytes {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Binary(bin) => Ok(Bytes::copy_from_slice(bin)),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl FromTagged for Value {
    fn from_tagged(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromTagged for TaggedValue {
    fn from_tagged(value: &Value) -> Result<Self> {
        Ok(TaggedValue::new(value.clone()))
    }
}

// Nil maps to None
impl<T: FromTagged> FromTagged for Option<T> {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_tagged(other).map(Some),
        }
    }
}

impl<T: FromTagged> FromTagged for Vec<T> {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(T::from_tagged)
                .collect::<Result<Vec<T>>>()
                .map_err(|_| mismatch::<Self>(value)),
            Value::Binary(bin) => T::from_binary(bin).ok_or_else(|| mismatch::<Self>(value)),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl<T: FromTagged> FromTagged for VecDeque<T> {
    fn from_tagged(value: &Value) -> Result<Self> {
        match value {
            Value::Array(_) | Value::Binary(_) => Vec::<T>::from_tagged(value)
                .map(VecDeque::from)
                .map_err(|_| mismatch::<Self>(value)),
            other => Err(mismatch::<Self>(other)),
        }
    }
}

impl<T: FromTagged, const N: usize> FromTagged for [T; N] {
    fn from_tagged(value: &Value) -> Result<Self> {
        let len = match value {
            Value::Array(items) => items.len(),
            Value::Binary(bin) => bin.len(),
            other => return Err(mismatch::<Self>(other)),
        };
        if len != N {
            return Err(BridgeError::SizeMismatch { requested: N, actual: len });
        }
        let elements = Vec::<T>::from_tagged(value).map_err(|_| mismatch::<Self>(value))?;
        <[T; N]>::try_from(elements)
            .map_err(|rest| BridgeError::SizeMismatch { requested: N, actual: rest.len() })
    }
}

fn map_entries<T, C>(value: &Value) -> Result<C>
where
    T: FromTagged,
    C: FromIterator<(String, T)>,
{
    let Value::Map(entries) = value else {
        return Err(mismatch::<C>(value));
    };
    entries
        .iter()
        .map(|(key, item)| {
            let key = key.as_str().ok_or_else(|| mismatch::<C>(value))?;
            let item = T::from_tagged(item).map_err(|_| mismatch::<C>(value))?;
            Ok((key.to_string(), item))
        })
        .collect()
}

impl<T: FromTagged> FromTagged for BTreeMap<String, T> {
    fn from_tagged(value: &Value) -> Result<Self> {
        map_entries::<T, Self>(value)
    }
}

impl<T: FromTagged> FromTagged for HashMap<String, T> {
    fn from_tagged(value: &Value) -> Result<Self> {
        map_entries::<T, Self>(value)
    }
}
