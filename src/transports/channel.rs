//! In-process request/reply transport over tokio channels
//!
//! [`channel`] returns a connected pair: the [`ChannelTransport`] goes into a
//! [`Client`](crate::Client), the [`ChannelPeer`] plays the server. The peer
//! sees every request token and answers with lists of frames.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::transport::{ReceivedFrame, Transport};
use crate::{BridgeError, Result};

const ENDPOINT: &str = "inproc://channel";

/// Create a connected transport/peer pair.
pub fn channel() -> (ChannelTransport, ChannelPeer) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport { requests: request_tx, frames: frame_rx },
        ChannelPeer { requests: request_rx, frames: frame_tx },
    )
}

/// Client side of an in-process channel.
#[derive(Debug)]
pub struct ChannelTransport {
    requests: mpsc::UnboundedSender<Bytes>,
    frames: mpsc::UnboundedReceiver<ReceivedFrame>,
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, payload: Bytes) -> Result<()> {
        trace!(bytes = payload.len(), "Channel request");
        self.requests.send(payload).map_err(|_| BridgeError::transport_failed("channel peer closed"))
    }

    async fn receive_frame(&mut self) -> Result<ReceivedFrame> {
        self.frames.recv().await.ok_or_else(|| BridgeError::transport_failed("channel peer closed"))
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }
}

/// Server side of an in-process channel.
#[derive(Debug)]
pub struct ChannelPeer {
    requests: mpsc::UnboundedReceiver<Bytes>,
    frames: mpsc::UnboundedSender<ReceivedFrame>,
}

impl ChannelPeer {
    /// Wait for the next request; `None` once the transport is dropped.
    pub async fn next_request(&mut self) -> Option<Bytes> {
        self.requests.recv().await
    }

    /// Take a request that already arrived, without waiting.
    pub fn try_next_request(&mut self) -> Option<Bytes> {
        self.requests.try_recv().ok()
    }

    /// Take every request that already arrived and return how many there were.
    pub fn pending_requests(&mut self) -> usize {
        let mut count = 0;
        while self.requests.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Answer with a complete multipart reply.
    ///
    /// # Errors
    ///
    /// A request socket cannot carry an empty reply, so an empty frame list
    /// is rejected. Fails as well once the transport is dropped.
    pub fn reply(&self, frames: Vec<Bytes>) -> Result<()> {
        if frames.is_empty() {
            return Err(BridgeError::transport_failed("a reply needs at least one frame"));
        }
        let last = frames.len() - 1;
        for (i, frame) in frames.into_iter().enumerate() {
            self.send_frame(frame, i != last)?;
        }
        Ok(())
    }

    /// Deliver a single frame, e.g. the first part of a slow reply.
    pub fn send_frame(&self, data: Bytes, more: bool) -> Result<()> {
        self.frames
            .send(ReceivedFrame::new(data, more))
            .map_err(|_| BridgeError::transport_failed("channel transport closed"))
    }
}
