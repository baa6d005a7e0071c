//! Grouping of reply frames into (header, payload) pairs

use bytes::Bytes;

use crate::{BridgeError, Result};

/// One header frame and the payload frame it describes.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub header: Bytes,
    pub payload: Bytes,
}

/// Split the frames of one reply into pairs, preserving order.
///
/// # Errors
///
/// [`BridgeError::Protocol`] if the frame count is odd.
pub fn pair_frames(frames: Vec<Bytes>) -> Result<Vec<FramePair>> {
    if frames.len() % 2 != 0 {
        return Err(BridgeError::protocol(format!(
            "odd frame count: {} frames cannot form (header, payload) pairs",
            frames.len()
        )));
    }

    let mut pairs = Vec::with_capacity(frames.len() / 2);
    let mut iter = frames.into_iter();
    while let (Some(header), Some(payload)) = (iter.next(), iter.next()) {
        pairs.push(FramePair { header, payload });
    }
    Ok(pairs)
}
