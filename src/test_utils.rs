//! Reply builders shared by unit tests and benchmarks
//!
//! [`ReplyBuilder`] produces the frames a bridge server would send, so tests
//! and benches can feed the decode pipeline without a server.

#![cfg(any(test, feature = "benchmark"))]

use bytes::Bytes;
use rmpv::Value;

/// Encode one msgpack value into a frame.
pub fn encode(value: &Value) -> Bytes {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = rmpv::encode::write_value(&mut buf, value);
    Bytes::from(buf)
}

fn string_map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
}

/// Builder for the frames of one multipart reply.
#[derive(Debug, Default, Clone)]
pub struct ReplyBuilder {
    frames: Vec<Bytes>,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record pair (`content: msgpack`).
    pub fn record(mut self, source: &str, metadata: Vec<(&str, Value)>, fields: Vec<(&str, Value)>) -> Self {
        let header = string_map(vec![
            ("source", Value::from(source)),
            ("content", Value::from("msgpack")),
            ("metadata", string_map(metadata)),
        ]);
        self.frames.push(encode(&header));
        self.frames.push(encode(&string_map(fields)));
        self
    }

    /// Append an array pair with a little-endian raw payload.
    pub fn array<T: bytemuck::NoUninit>(
        self,
        source: &str,
        path: &str,
        shape: &[u64],
        dtype: &str,
        data: &[T],
    ) -> Self {
        self.array_pair("array", source, path, shape, dtype, Bytes::copy_from_slice(bytemuck::cast_slice(data)))
    }

    /// Append an `ImageData` pair.
    pub fn image<T: bytemuck::NoUninit>(
        self,
        source: &str,
        path: &str,
        shape: &[u64],
        dtype: &str,
        data: &[T],
    ) -> Self {
        self.array_pair("ImageData", source, path, shape, dtype, Bytes::copy_from_slice(bytemuck::cast_slice(data)))
    }

    /// Append a pair with an arbitrary header map and an empty map payload.
    pub fn raw_header(mut self, entries: Vec<(&str, Value)>) -> Self {
        self.frames.push(encode(&string_map(entries)));
        self.frames.push(encode(&Value::Map(Vec::new())));
        self
    }

    pub fn build(self) -> Vec<Bytes> {
        self.frames
    }

    fn array_pair(
        mut self,
        content: &str,
        source: &str,
        path: &str,
        shape: &[u64],
        dtype: &str,
        payload: Bytes,
    ) -> Self {
        let header = string_map(vec![
            ("source", Value::from(source)),
            ("content", Value::from(content)),
            ("path", Value::from(path)),
            ("shape", Value::Array(shape.iter().map(|d| Value::from(*d)).collect())),
            ("dtype", Value::from(dtype)),
        ]);
        self.frames.push(encode(&header));
        self.frames.push(payload);
        self
    }
}

/// A detector-sized reply: one record plus a `frames x 512 x 128` float32 image.
pub fn detector_reply(source: &str, frames: u64) -> Vec<Bytes> {
    let len = (frames * 512 * 128) as usize;
    let image: Vec<f32> = (0..len).map(|i| (i % 4096) as f32).collect();
    let cells: Vec<u16> = (0..frames as u16).collect();
    ReplyBuilder::new()
        .record(
            source,
            vec![
                ("timestamp.tid", Value::from(10_000u64)),
                ("timestamp.sec", Value::from(1_540_000_000u64)),
            ],
            vec![
                ("detector.gain", Value::F32(1.5)),
                ("detector.name", Value::from(source)),
                ("trainId", Value::from(10_000u64)),
            ],
        )
        .image(source, "image.data", &[frames, 512, 128], "float32", &image)
        .array(source, "image.cellId", &[frames], "uint16", &cells)
        .build()
}

/// Install a test-writer subscriber honoring `RUST_LOG`; safe to call repeatedly.
#[cfg(test)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
