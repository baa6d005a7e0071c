//! Transport trait for request/reply sockets

use bytes::Bytes;

use crate::Result;

/// One frame of a multipart reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub data: Bytes,
    /// More frames of the same reply follow
    pub more: bool,
}

impl ReceivedFrame {
    pub fn new(data: Bytes, more: bool) -> Self {
        Self { data, more }
    }
}

/// Request/reply transport consumed by the [`Client`](crate::Client).
///
/// Implementations follow the strict alternation of a request socket: one
/// [`send`](Transport::send), then frames until one arrives with
/// `more == false`. The client never sends twice without a complete reply in
/// between, so transports do not need to guard against it.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Send one request payload.
    async fn send(&mut self, payload: Bytes) -> Result<()>;

    /// Wait for the next frame of the pending reply.
    ///
    /// Must be cancel safe: when the future is dropped before completion no
    /// frame may be lost. The client wraps this call in its receive timeout
    /// and cancellation.
    async fn receive_frame(&mut self) -> Result<ReceivedFrame>;

    /// Address this transport talks to, for logging.
    fn endpoint(&self) -> &str;
}
