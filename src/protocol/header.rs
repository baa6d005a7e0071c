//! Header frame decoding and content-kind dispatch

use rmpv::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::TaggedValue;
use crate::{BridgeError, Result};

/// Category of the payload a header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// msgpack-encoded field map; opens a new source record
    Record,
    /// Raw typed array attached to the open record
    Array,
    /// Raw image array, handled like [`ContentKind::Array`]
    ImageData,
}

impl ContentKind {
    /// Parse the header `content` value.
    ///
    /// Servers send `"msgpack"` for record payloads; `"record"` is accepted
    /// as an alias.
    pub fn from_wire(content: &str) -> Option<Self> {
        match content {
            "msgpack" | "record" => Some(ContentKind::Record),
            "array" => Some(ContentKind::Array),
            "ImageData" => Some(ContentKind::ImageData),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Record => "msgpack",
            ContentKind::Array => "array",
            ContentKind::ImageData => "ImageData",
        }
    }

    /// Whether a pair of this kind starts a new record boundary.
    pub const fn opens_record(&self) -> bool {
        matches!(self, ContentKind::Record)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-specific part of a header.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderBody {
    Record { metadata: BTreeMap<String, TaggedValue> },
    Array { kind: ContentKind, path: String, shape: Vec<usize>, dtype: String },
}

/// Decoded header frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub source: String,
    pub body: HeaderBody,
}

impl Header {
    /// Decode a header frame and validate its required keys.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Protocol`] if the frame is not a single msgpack map, if
    /// `source` or `content` is missing or not a string, if `content` names an
    /// unknown kind, or if a content-specific key is missing or malformed.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let value = decode_value(frame, "header")?;
        let mut map = into_string_map(value, "header")?;

        let source = take_string(&mut map, "source")?;
        let content = take_string(&mut map, "content")?;
        let kind = ContentKind::from_wire(&content)
            .ok_or_else(|| BridgeError::protocol(format!("unknown content kind '{content}'")))?;

        let body = match kind {
            ContentKind::Record => {
                let metadata = into_string_map(take(&mut map, "metadata")?, "header metadata")?
                    .into_iter()
                    .map(|(key, value)| (key, TaggedValue::new(value)))
                    .collect();
                HeaderBody::Record { metadata }
            }
            ContentKind::Array | ContentKind::ImageData => {
                let path = take_string(&mut map, "path")?;
                let shape = take_shape(&mut map)?;
                let dtype = take_string(&mut map, "dtype")?;
                HeaderBody::Array { kind, path, shape, dtype }
            }
        };

        Ok(Header { source, body })
    }

    pub fn content(&self) -> ContentKind {
        match &self.body {
            HeaderBody::Record { .. } => ContentKind::Record,
            HeaderBody::Array { kind, .. } => *kind,
        }
    }
}

/// Decode exactly one msgpack value from a frame.
pub(crate) fn decode_value(frame: &[u8], context: &str) -> Result<Value> {
    let mut cursor = frame;
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| BridgeError::protocol(format!("undecodable {context} frame: {e}")))?;
    if !cursor.is_empty() {
        return Err(BridgeError::protocol(format!(
            "{context} frame has {} trailing bytes",
            cursor.len()
        )));
    }
    Ok(value)
}

/// Move the entries of a map node into a string-keyed map.
pub(crate) fn into_string_map(value: Value, context: &str) -> Result<BTreeMap<String, Value>> {
    let Value::Map(entries) = value else {
        return Err(BridgeError::protocol(format!("{context} is not a map")));
    };
    entries
        .into_iter()
        .map(|(key, value)| match key {
            Value::String(s) => s
                .into_str()
                .map(|key| (key, value))
                .ok_or_else(|| BridgeError::protocol(format!("{context} key is not valid UTF-8"))),
            other => Err(BridgeError::protocol(format!("{context} key {other} is not a string"))),
        })
        .collect()
}

fn take(map: &mut BTreeMap<String, Value>, key: &str) -> Result<Value> {
    map.remove(key)
        .ok_or_else(|| BridgeError::protocol(format!("header is missing required key '{key}'")))
}

fn take_string(map: &mut BTreeMap<String, Value>, key: &str) -> Result<String> {
    match take(map, key)? {
        Value::String(s) => s
            .into_str()
            .ok_or_else(|| BridgeError::protocol(format!("header key '{key}' is not valid UTF-8"))),
        _ => Err(BridgeError::protocol(format!("header key '{key}' must be a string"))),
    }
}

fn take_shape(map: &mut BTreeMap<String, Value>) -> Result<Vec<usize>> {
    let Value::Array(dims) = take(map, "shape")? else {
        return Err(BridgeError::protocol("header key 'shape' must be an array"));
    };
    dims.iter()
        .map(|dim| {
            dim.as_u64().and_then(|d| usize::try_from(d).ok()).ok_or_else(|| {
                BridgeError::protocol(format!("shape dimension {dim} is not a non-negative integer"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).unwrap();
        buf
    }

    fn header(entries: Vec<(&str, Value)>) -> Vec<u8> {
        encode(Value::Map(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect()))
    }

    #[test]
    fn record_header() {
        let frame = header(vec![
            ("source", Value::from("cam")),
            ("content", Value::from("msgpack")),
            ("metadata", Value::Map(vec![(Value::from("timestamp.tid"), Value::from(10u64))])),
        ]);
        let decoded = Header::decode(&frame).unwrap();
        assert_eq!(decoded.source, "cam");
        assert_eq!(decoded.content(), ContentKind::Record);
        let HeaderBody::Record { metadata } = decoded.body else { panic!("expected record") };
        assert_eq!(metadata["timestamp.tid"].cast::<u64>().unwrap(), 10);
    }

    #[test]
    fn array_header() {
        let frame = header(vec![
            ("source", Value::from("cam")),
            ("content", Value::from("ImageData")),
            ("path", Value::from("image.data")),
            ("shape", Value::Array(vec![Value::from(2u64), Value::from(3u64)])),
            ("dtype", Value::from("float32")),
        ]);
        let decoded = Header::decode(&frame).unwrap();
        assert_eq!(decoded.content(), ContentKind::ImageData);
        assert_eq!(
            decoded.body,
            HeaderBody::Array {
                kind: ContentKind::ImageData,
                path: "image.data".to_string(),
                shape: vec![2, 3],
                dtype: "float32".to_string(),
            }
        );
    }

    #[test]
    fn missing_content_is_protocol_error() {
        let frame = header(vec![("source", Value::from("cam"))]);
        let err = Header::decode(&frame).unwrap_err();
        assert!(err.to_string().contains("content"), "{err}");
    }

    #[test]
    fn missing_source_is_protocol_error() {
        let frame = header(vec![("content", Value::from("msgpack")), ("metadata", Value::Map(vec![]))]);
        assert!(matches!(Header::decode(&frame), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn unknown_content_kind() {
        let frame = header(vec![("source", Value::from("cam")), ("content", Value::from("pickle"))]);
        let err = Header::decode(&frame).unwrap_err();
        assert!(err.to_string().contains("unknown content kind"), "{err}");
    }

    #[test]
    fn record_requires_metadata() {
        let frame = header(vec![("source", Value::from("cam")), ("content", Value::from("msgpack"))]);
        assert!(matches!(Header::decode(&frame), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn negative_shape_is_rejected() {
        let frame = header(vec![
            ("source", Value::from("cam")),
            ("content", Value::from("array")),
            ("path", Value::from("x")),
            ("shape", Value::Array(vec![Value::from(-1i64)])),
            ("dtype", Value::from("uint8")),
        ]);
        assert!(matches!(Header::decode(&frame), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn non_map_header() {
        let frame = encode(Value::from("not a map"));
        assert!(matches!(Header::decode(&frame), Err(BridgeError::Protocol { .. })));
        assert!(matches!(Header::decode(&[0xc1]), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn content_kind_wire_names() {
        assert_eq!(ContentKind::from_wire("msgpack"), Some(ContentKind::Record));
        assert_eq!(ContentKind::from_wire("record"), Some(ContentKind::Record));
        assert_eq!(ContentKind::from_wire("array"), Some(ContentKind::Array));
        assert_eq!(ContentKind::from_wire("ImageData"), Some(ContentKind::ImageData));
        assert_eq!(ContentKind::from_wire("imagedata"), None);
        assert!(ContentKind::Record.opens_record());
        assert!(!ContentKind::ImageData.opens_record());
    }
}
