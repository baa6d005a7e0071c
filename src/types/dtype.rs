//! Canonical element type vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical element type shared by tagged values and array views.
///
/// Wire dtype names (numpy style, e.g. `"uint16"`, `"float32"`) and codec node
/// kinds both normalize into this vocabulary, so a cast only ever compares two
/// `Dtype`s and never converts between numeric widths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    Bool,
    /// Raw byte of a binary blob
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    /// Codec nil
    Nil,
    /// Element type of maps and extension values
    Undefined,
    /// Element type of an empty array
    Unknown,
    /// Wire dtype name with no canonical counterpart, kept verbatim
    Other(String),
}

impl Dtype {
    /// Normalize a wire dtype name into the canonical vocabulary.
    ///
    /// Integer names gain their fixed width (`int64` becomes [`Dtype::Int64`]),
    /// `float32`/`float64` become the 32/64-bit floats. Anything else passes
    /// through unchanged as [`Dtype::Other`].
    pub fn from_wire(name: &str) -> Self {
        match name {
            "bool" => Dtype::Bool,
            "int8" => Dtype::Int8,
            "uint8" => Dtype::UInt8,
            "int16" => Dtype::Int16,
            "uint16" => Dtype::UInt16,
            "int32" => Dtype::Int32,
            "uint32" => Dtype::UInt32,
            "int64" => Dtype::Int64,
            "uint64" => Dtype::UInt64,
            "float32" => Dtype::Float32,
            "float64" => Dtype::Float64,
            other => Dtype::Other(other.to_string()),
        }
    }

    /// Size in bytes of one element, if the type has a fixed layout.
    pub const fn item_size(&self) -> Option<usize> {
        match self {
            Dtype::Bool | Dtype::Char | Dtype::Int8 | Dtype::UInt8 => Some(1),
            Dtype::Int16 | Dtype::UInt16 => Some(2),
            Dtype::Int32 | Dtype::UInt32 | Dtype::Float32 => Some(4),
            Dtype::Int64 | Dtype::UInt64 | Dtype::Float64 => Some(8),
            _ => None,
        }
    }

    /// Canonical name used in error messages and summaries.
    pub fn name(&self) -> &str {
        match self {
            Dtype::Bool => "bool",
            Dtype::Char => "char",
            Dtype::Int8 => "i8",
            Dtype::UInt8 => "u8",
            Dtype::Int16 => "i16",
            Dtype::UInt16 => "u16",
            Dtype::Int32 => "i32",
            Dtype::UInt32 => "u32",
            Dtype::Int64 => "i64",
            Dtype::UInt64 => "u64",
            Dtype::Float32 => "f32",
            Dtype::Float64 => "f64",
            Dtype::String => "string",
            Dtype::Nil => "nil",
            Dtype::Undefined => "undefined",
            Dtype::Unknown => "unknown",
            Dtype::Other(name) => name,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
