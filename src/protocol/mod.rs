//! Bridge wire protocol.
//!
//! A request is the ASCII token [`REQUEST`]. A reply is an even-length list
//! of frames forming (header, payload) pairs. Every header is a msgpack map
//! with at least `source` and `content`:
//!
//! | content | extra header keys | payload |
//! | --- | --- | --- |
//! | `msgpack` | `metadata` | msgpack map of fields, opens a new record |
//! | `array`, `ImageData` | `path`, `shape`, `dtype` | raw little-endian array bytes |
//!
//! [`decode_reply`] runs the whole pipeline: [`pair_frames`], then
//! [`Header::decode`] per pair, then the [`Aggregator`] boundary rules.
//! [`trace`] and [`summary`] render replies and packages for inspection.

mod aggregator;
mod frames;
mod header;
pub mod summary;
pub mod trace;

pub use aggregator::{Aggregator, decode_reply};
pub use frames::{FramePair, pair_frames};
pub use header::{ContentKind, Header, HeaderBody};

/// Payload of every request sent to the server.
pub const REQUEST: &[u8] = b"next";
