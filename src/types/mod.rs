//! Core types for decoded bridge data.
//!
//! This module provides the data structures a reply is decoded into.
//!
//! ## Architecture
//!
//! - [`TaggedValue`] wraps one msgpack node and casts it on demand via [`FromTagged`]
//! - [`ArrayView`] overlays a typed, shaped view on a payload frame via [`Element`]
//!   and [`FromArray`]
//! - [`Dtype`] is the canonical element type both of them compare against
//! - [`SourceRecord`] bundles metadata, fields and arrays of one source and
//!   owns the frames backing them
//!
//! ## Casting Rules
//!
//! Casts never convert between numeric kinds. A payload field holding an
//! unsigned integer reads as `u64` only; a `float32` array reads as `f32` only.
//! Inspect [`TaggedValue::dtype`] or [`ArrayView::dtype`] first when the type
//! is not known in advance.
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::Bytes;
//! use karabo_bridge::types::{ArrayView, Dtype};
//!
//! // 2x2 little-endian uint32 payload
//! let payload: Vec<u8> = [1u32, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
//! let view = ArrayView::new(Bytes::from(payload), vec![2, 2], "uint32").unwrap();
//!
//! assert_eq!(view.dtype(), &Dtype::UInt32);
//! assert_eq!(view.size(), 4);
//! assert_eq!(view.cast::<Vec<u32>>().unwrap(), vec![1, 2, 3, 4]);
//! assert!(view.cast::<Vec<i32>>().is_err());
//! ```

mod array;
mod dtype;
mod record;
mod tagged;

pub use array::{ArrayView, Element, FromArray, element_count};
pub use dtype::Dtype;
pub use record::{DataPackage, SourceRecord};
pub use tagged::{ContainerType, FromTagged, TaggedValue};
