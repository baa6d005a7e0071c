//! Per-source data records returned by the client

use std::collections::BTreeMap;
use std::collections::btree_map;

use super::{ArrayView, FromArray, FromTagged, TaggedValue};
use crate::{BridgeError, Result};

/// Decoded data for all sources of one reply, keyed by source id.
pub type DataPackage = BTreeMap<String, SourceRecord>;

/// Everything one source contributed to a reply.
///
/// - `metadata` comes from the header of the record frame pair
/// - `fields` holds the scalar and small-array entries of the record payload
/// - `arrays` holds the large typed arrays sent as separate frame pairs
///
/// Array views share their payload frames; record pairs are decoded into
/// owned values and only their size is kept. Not `Clone`: hand it on by value.
#[derive(Debug, Default)]
pub struct SourceRecord {
    source: String,
    metadata: BTreeMap<String, TaggedValue>,
    fields: BTreeMap<String, TaggedValue>,
    arrays: BTreeMap<String, ArrayView>,
    bytes_received: usize,
}

impl SourceRecord {
    /// Create an empty record for a source id.
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), ..Self::default() }
    }

    /// Source id as sent on the wire.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, TaggedValue> {
        &self.metadata
    }

    pub fn fields(&self) -> &BTreeMap<String, TaggedValue> {
        &self.fields
    }

    pub fn arrays(&self) -> &BTreeMap<String, ArrayView> {
        &self.arrays
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&TaggedValue> {
        self.fields.get(key)
    }

    /// Look up a typed array.
    pub fn array(&self, path: &str) -> Option<&ArrayView> {
        self.arrays.get(path)
    }

    /// Cast a payload field.
    pub fn field<T: FromTagged>(&self, key: &str) -> Result<T> {
        self.fields
            .get(key)
            .ok_or_else(|| BridgeError::FieldNotFound { field: key.to_string() })?
            .cast()
    }

    /// Cast a metadata entry.
    pub fn meta<T: FromTagged>(&self, key: &str) -> Result<T> {
        self.metadata
            .get(key)
            .ok_or_else(|| BridgeError::FieldNotFound { field: key.to_string() })?
            .cast()
    }

    /// Copy an array into a container.
    pub fn array_as<C: FromArray>(&self, path: &str) -> Result<C> {
        self.arrays
            .get(path)
            .ok_or_else(|| BridgeError::FieldNotFound { field: path.to_string() })?
            .cast()
    }

    /// Iterate over payload fields in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, TaggedValue> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.fields.is_empty() && self.arrays.is_empty()
    }

    /// Total size of the header and payload frames this record was built from.
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    pub(crate) fn set_source(&mut self, source: &str) {
        if self.source != source {
            self.source = source.to_string();
        }
    }

    pub(crate) fn replace_metadata(&mut self, metadata: BTreeMap<String, TaggedValue>) {
        self.metadata = metadata;
    }

    /// Merge payload fields; a repeated key takes the newer value.
    pub(crate) fn merge_fields(&mut self, fields: impl IntoIterator<Item = (String, TaggedValue)>) {
        self.fields.extend(fields);
    }

    /// Insert an array; returns false if the path was already taken.
    pub(crate) fn insert_array(&mut self, path: String, view: ArrayView) -> bool {
        match self.arrays.entry(path) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(view);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    pub(crate) fn count_bytes(&mut self, len: usize) {
        self.bytes_received += len;
    }
}

impl<'a> IntoIterator for &'a SourceRecord {
    type Item = (&'a String, &'a TaggedValue);
    type IntoIter = btree_map::Iter<'a, String, TaggedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
