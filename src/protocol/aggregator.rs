//! Source record aggregation over the frame pairs of one reply

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::frames::{FramePair, pair_frames};
use super::header::{Header, HeaderBody, decode_value, into_string_map};
use crate::config::DuplicateSourcePolicy;
use crate::types::{ArrayView, DataPackage, SourceRecord, TaggedValue};
use crate::{BridgeError, Result};

/// Decode the frames of one reply into a package of source records.
///
/// An empty reply yields an empty package. Any structural error aborts the
/// whole reply; no partially decoded package is returned.
///
/// ```rust
/// use karabo_bridge::protocol::decode_reply;
/// use karabo_bridge::DuplicateSourcePolicy;
///
/// let package = decode_reply(Vec::new(), DuplicateSourcePolicy::Suffix).unwrap();
/// assert!(package.is_empty());
/// ```
pub fn decode_reply(frames: Vec<Bytes>, policy: DuplicateSourcePolicy) -> Result<DataPackage> {
    let mut aggregator = Aggregator::new(policy);
    for pair in pair_frames(frames)? {
        aggregator.push(pair)?;
    }
    aggregator.finish()
}

struct OpenRecord {
    record: SourceRecord,
    /// False while the record only holds arrays that arrived before any record pair
    opened_by_record: bool,
}

/// Boundary state machine turning frame pairs into source records.
///
/// A record pair closes the open record and starts a new one. Array pairs
/// attach to whichever record is open, opening an implicit one when needed;
/// the next record pair adopts that implicit record instead of closing it.
pub struct Aggregator {
    policy: DuplicateSourcePolicy,
    package: DataPackage,
    open: Option<OpenRecord>,
    current_source: Option<String>,
}

impl Aggregator {
    pub fn new(policy: DuplicateSourcePolicy) -> Self {
        Self { policy, package: DataPackage::new(), open: None, current_source: None }
    }

    /// Dispatch one frame pair by its header content kind.
    pub fn push(&mut self, pair: FramePair) -> Result<()> {
        let header = Header::decode(&pair.header)?;
        let pair_bytes = pair.header.len() + pair.payload.len();
        trace!(
            source = %header.source,
            content = %header.content(),
            payload_bytes = pair.payload.len(),
            "Frame pair"
        );

        if header.content().opens_record() {
            self.open_record(&header.source)?;
        }
        let open = self.open.get_or_insert_with(|| OpenRecord {
            record: SourceRecord::new(header.source.as_str()),
            opened_by_record: false,
        });

        match header.body {
            HeaderBody::Record { metadata } => {
                let value = decode_value(&pair.payload, "record payload")?;
                let fields = into_string_map(value, "record payload")?
                    .into_iter()
                    .map(|(key, value)| (key, TaggedValue::new(value)));
                open.record.set_source(&header.source);
                open.record.replace_metadata(metadata);
                open.record.merge_fields(fields);
            }
            HeaderBody::Array { kind: _, path, shape, dtype } => {
                let view = ArrayView::new(pair.payload, shape, &dtype)?;
                if open.record.source() != header.source {
                    warn!(
                        record = %open.record.source(),
                        source = %header.source,
                        path = %path,
                        "Array attached to a record of another source"
                    );
                }
                if !open.record.insert_array(path.clone(), view) {
                    warn!(source = %header.source, path = %path, "Duplicate array path, keeping the first");
                }
            }
        }
        open.record.count_bytes(pair_bytes);

        self.current_source = Some(header.source);
        Ok(())
    }

    /// Start a record boundary. An implicit record is adopted, anything else
    /// open is closed first.
    fn open_record(&mut self, source: &str) -> Result<()> {
        if let Some(open) = self.open.as_mut().filter(|open| !open.opened_by_record) {
            open.opened_by_record = true;
            return Ok(());
        }
        self.close_open()?;
        self.open = Some(OpenRecord { record: SourceRecord::new(source), opened_by_record: true });
        Ok(())
    }

    /// Close the open record and return the finished package.
    pub fn finish(mut self) -> Result<DataPackage> {
        self.close_open()?;
        Ok(self.package)
    }

    fn close_open(&mut self) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        let source = self.current_source.clone().unwrap_or_else(|| open.record.source().to_string());
        let key = self.unique_key(&source)?;
        debug!(
            key = %key,
            fields = open.record.fields().len(),
            arrays = open.record.arrays().len(),
            bytes = open.record.bytes_received(),
            "Closed source record"
        );
        self.package.insert(key, open.record);
        Ok(())
    }

    fn unique_key(&self, source: &str) -> Result<String> {
        if !self.package.contains_key(source) {
            return Ok(source.to_string());
        }
        match self.policy {
            DuplicateSourcePolicy::Reject => {
                Err(BridgeError::protocol(format!("duplicate source '{source}' in one reply")))
            }
            DuplicateSourcePolicy::Suffix => {
                let key = (2usize..)
                    .map(|n| format!("{source}-{n}"))
                    .find(|candidate| !self.package.contains_key(candidate))
                    .unwrap_or_else(|| source.to_string());
                warn!(source = %source, key = %key, "Duplicate source in one reply, renamed");
                Ok(key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ReplyBuilder, init_tracing};
    use rmpv::Value;

    fn decode(frames: Vec<Bytes>) -> Result<DataPackage> {
        decode_reply(frames, DuplicateSourcePolicy::Suffix)
    }

    #[test]
    fn single_empty_record() {
        init_tracing();
        let frames = ReplyBuilder::new().record("cam", vec![], vec![]).build();
        let package = decode(frames).unwrap();
        assert_eq!(package.len(), 1);
        let record = &package["cam"];
        assert!(record.fields().is_empty());
        assert!(record.arrays().is_empty());
    }

    #[test]
    fn record_with_arrays() {
        let frames = ReplyBuilder::new()
            .record(
                "cam",
                vec![("timestamp.tid", Value::from(42u64))],
                vec![("num", Value::from(7u64)), ("name", Value::from("det"))],
            )
            .array("cam", "image.data", &[2, 2], "uint32", &[1u32, 2, 3, 4])
            .array("cam", "image.mask", &[4], "uint8", &[0u8, 1, 0, 1])
            .build();
        let package = decode(frames).unwrap();
        let record = &package["cam"];
        assert_eq!(record.meta::<u64>("timestamp.tid").unwrap(), 42);
        assert_eq!(record.field::<u64>("num").unwrap(), 7);
        assert_eq!(record.field::<String>("name").unwrap(), "det");
        assert_eq!(record.array_as::<Vec<u32>>("image.data").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(record.array("image.mask").unwrap().shape(), &[4]);
    }

    #[test]
    fn arrays_before_record_are_adopted() {
        let frames = ReplyBuilder::new()
            .array("cam", "image.data", &[2], "float64", &[0.5f64, 1.5])
            .record("cam", vec![], vec![("n", Value::from(1u64))])
            .build();
        let package = decode(frames).unwrap();
        assert_eq!(package.len(), 1);
        let record = &package["cam"];
        assert_eq!(record.field::<u64>("n").unwrap(), 1);
        assert_eq!(record.array_as::<[f64; 2]>("image.data").unwrap(), [0.5, 1.5]);
    }

    #[test]
    fn repeated_record_boundary_yields_two_records() {
        let frames = ReplyBuilder::new()
            .record("A", vec![], vec![("i", Value::from(1u64))])
            .record("A", vec![], vec![("i", Value::from(2u64))])
            .build();
        let package = decode(frames).unwrap();
        assert_eq!(package.len(), 2);
        assert_eq!(package["A"].field::<u64>("i").unwrap(), 1);
        assert_eq!(package["A-2"].field::<u64>("i").unwrap(), 2);
        assert_eq!(package["A-2"].source(), "A");
    }

    #[test]
    fn suffix_picks_first_free_key() {
        let frames = ReplyBuilder::new()
            .record("A", vec![], vec![])
            .record("A-2", vec![], vec![])
            .record("A", vec![], vec![])
            .build();
        let package = decode(frames).unwrap();
        let keys: Vec<_> = package.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["A", "A-2", "A-3"]);
    }

    #[test]
    fn reject_policy_fails_on_duplicates() {
        let frames = ReplyBuilder::new().record("A", vec![], vec![]).record("A", vec![], vec![]).build();
        let result = decode_reply(frames, DuplicateSourcePolicy::Reject);
        assert!(matches!(result, Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn multiple_sources() {
        let frames = ReplyBuilder::new()
            .record("cam", vec![], vec![])
            .array("cam", "img", &[1], "uint16", &[9u16])
            .record("xgm", vec![], vec![("energy", Value::F32(1.5))])
            .build();
        let package = decode(frames).unwrap();
        assert_eq!(package.len(), 2);
        assert!(package["cam"].array("img").is_some());
        assert!(package["xgm"].arrays().is_empty());
        assert_eq!(package["xgm"].field::<f32>("energy").unwrap(), 1.5);
    }

    #[test]
    fn duplicate_array_path_keeps_first() {
        let frames = ReplyBuilder::new()
            .record("cam", vec![], vec![])
            .array("cam", "img", &[1], "uint8", &[1u8])
            .array("cam", "img", &[1], "uint8", &[2u8])
            .build();
        let package = decode(frames).unwrap();
        assert_eq!(package["cam"].array_as::<Vec<u8>>("img").unwrap(), vec![1]);
    }

    #[test]
    fn bytes_received_counts_every_frame() {
        let frames = ReplyBuilder::new()
            .record("cam", vec![], vec![])
            .array("cam", "img", &[4], "uint8", &[1u8, 2, 3, 4])
            .build();
        let total: usize = frames.iter().map(Bytes::len).sum();
        let package = decode(frames).unwrap();
        assert_eq!(package["cam"].bytes_received(), total);
    }

    #[test]
    fn record_frames_are_released_after_decode() {
        let frames = ReplyBuilder::new()
            .record("cam", vec![], vec![("n", Value::from(1u64))])
            .array("cam", "img", &[4], "uint8", &[1u8, 2, 3, 4])
            .build();
        let record_payload = frames[1].clone();
        let array_payload = frames[3].clone();

        let package = decode(frames).unwrap();
        assert!(record_payload.is_unique());
        assert!(!array_payload.is_unique());
        drop(package);
        assert!(array_payload.is_unique());
    }

    #[test]
    fn image_pairs_join_the_open_record() {
        let frames = ReplyBuilder::new()
            .record("cam", vec![], vec![])
            .image("cam", "image.data", &[2], "uint16", &[1u16, 2])
            .array("cam", "image.mask", &[2], "uint8", &[0u8, 1])
            .image("cam", "image.gain", &[1], "uint8", &[3u8])
            .build();
        let package = decode(frames).unwrap();
        assert_eq!(package.len(), 1);
        assert_eq!(package["cam"].arrays().len(), 3);
    }

    #[test]
    fn malformed_pair_discards_whole_reply() {
        let mut frames = ReplyBuilder::new().record("cam", vec![], vec![]).build();
        frames.extend(ReplyBuilder::new().raw_header(vec![("source", Value::from("cam"))]).build());
        let err = decode(frames).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { .. }));
    }

    #[test]
    fn short_array_payload_is_protocol_error() {
        let frames = ReplyBuilder::new().array("cam", "img", &[8], "uint32", &[1u32]).build();
        assert!(matches!(decode(frames), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn non_map_record_payload_is_protocol_error() {
        let mut frames = ReplyBuilder::new().record("cam", vec![], vec![]).build();
        let mut payload = Vec::new();
        rmpv::encode::write_value(&mut payload, &Value::from(3u64)).unwrap();
        frames[1] = Bytes::from(payload);
        assert!(matches!(decode(frames), Err(BridgeError::Protocol { .. })));
    }

    #[test]
    fn odd_frame_count() {
        let mut frames = ReplyBuilder::new().record("cam", vec![], vec![]).build();
        frames.pop();
        let err = decode(frames).unwrap_err();
        assert!(err.to_string().contains("odd frame count"), "{err}");
    }
}
