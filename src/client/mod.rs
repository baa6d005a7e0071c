//! Bridge client session

use bytes::Bytes;
use futures::Stream;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::protocol::{REQUEST, decode_reply, summary, trace as reply_trace};
use crate::transport::Transport;
use crate::types::DataPackage;
use crate::{BridgeError, Result};


/// Request latch of a session.
///
/// A request socket must alternate strictly between send and receive, so a
/// request is only sent from `Idle`. Frames of a reply that arrive before a
/// timeout stay with the latch until the rest of the reply is received.
#[derive(Debug, Default)]
enum RequestState {
    #[default]
    Idle,
    AwaitingReply {
        received: Vec<Bytes>,
    },
}

/// Session with one bridge server.
///
/// A client serves one request at a time; its methods take `&mut self`, so
/// overlapping calls on one session are ruled out at compile time. Use one
/// client per worker.
///
/// ```rust
/// use karabo_bridge::{Client, ClientConfig};
/// use karabo_bridge::transports::channel;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> karabo_bridge::Result<()> {
/// let (transport, _server) = channel();
/// let config = ClientConfig::default().with_timeout(Duration::from_millis(10));
/// let mut client = Client::new(transport, config)?;
///
/// // Nothing answers: the timeout yields an empty package and keeps the request pending
/// assert!(client.next().await?.is_empty());
/// assert!(client.is_awaiting_reply());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client<T: Transport> {
    transport: T,
    config: ClientConfig,
    state: RequestState,
    cancel: CancellationToken,
}

impl<T: Transport> Client<T> {
    /// Create a session over a transport.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Config`] if the configuration does not validate.
    pub fn new(transport: T, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        debug!(endpoint = %transport.endpoint(), timeout = ?config.timeout(), "Client created");
        Ok(Self { transport, config, state: RequestState::Idle, cancel: CancellationToken::new() })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Whether a request has been sent and its reply is still outstanding.
    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self.state, RequestState::AwaitingReply { .. })
    }

    /// Token that interrupts pending and future receives when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request and decode the next data package.
    ///
    /// A timeout is not an error: it returns an empty package and keeps the
    /// request outstanding, and the next call only resumes receiving.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Protocol`] for a malformed reply (no partial package),
    /// [`BridgeError::Transport`] and [`BridgeError::Cancelled`] from the
    /// receive path.
    pub async fn next(&mut self) -> Result<DataPackage> {
        match self.next_multipart().await? {
            Some(frames) => decode_reply(frames, self.config.duplicate_sources),
            None => Ok(DataPackage::new()),
        }
    }

    /// Request the next reply and return its frames undissected.
    ///
    /// `None` means the receive timed out; the request stays outstanding.
    pub async fn next_multipart(&mut self) -> Result<Option<Vec<Bytes>>> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        if matches!(self.state, RequestState::Idle) {
            self.transport.send(Bytes::from_static(REQUEST)).await?;
            self.state = RequestState::AwaitingReply { received: Vec::new() };
            debug!(endpoint = %self.transport.endpoint(), "Request sent");
        } else {
            debug!("Reply still outstanding, resuming receive");
        }

        let deadline = self.config.timeout().map(|timeout| Instant::now() + timeout);
        loop {
            let transport = &mut self.transport;
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Receive cancelled");
                    return Err(BridgeError::Cancelled);
                }
                received = async {
                    match deadline {
                        Some(deadline) => timeout_at(deadline, transport.receive_frame()).await.ok(),
                        None => Some(transport.receive_frame().await),
                    }
                } => received,
            };

            let Some(frame) = received.transpose()? else {
                debug!(timeout = ?self.config.timeout(), "No reply before timeout");
                return Ok(None);
            };

            let RequestState::AwaitingReply { received } = &mut self.state else {
                return Err(BridgeError::protocol("frame received without an outstanding request"));
            };
            trace!(bytes = frame.data.len(), more = frame.more, "Frame received");
            received.push(frame.data);

            if !frame.more {
                let frames = match std::mem::take(&mut self.state) {
                    RequestState::AwaitingReply { received } => received,
                    RequestState::Idle => Vec::new(),
                };
                debug!(
                    frames = frames.len(),
                    bytes = frames.iter().map(Bytes::len).sum::<usize>(),
                    "Reply complete"
                );
                return Ok(Some(frames));
            }
        }
    }

    /// Request the next reply and render its frames as a structural trace.
    ///
    /// # Errors
    ///
    /// Unlike [`Client::next`], a timeout surfaces as [`BridgeError::Timeout`].
    pub async fn show_msg(&mut self) -> Result<String> {
        match self.next_multipart().await? {
            Some(frames) => Ok(reply_trace::render_reply(&frames)),
            None => Err(BridgeError::Timeout { duration: self.config.timeout().unwrap_or_default() }),
        }
    }

    /// Request the next package and render a per-source summary table.
    pub async fn show_next(&mut self) -> Result<String> {
        let package = self.next().await?;
        Ok(summary::render_package(&package))
    }

    /// Turn the client into an endless stream of non-empty packages.
    ///
    /// Timeouts are skipped, requests are spaced by the configured pacing and
    /// the stream ends once the cancel token fires. Errors are yielded and the
    /// stream continues.
    pub fn into_stream(self) -> impl Stream<Item = Result<DataPackage>> + Send {
        let pacing = self.config.pacing();
        futures::stream::unfold((self, None::<Instant>), move |(mut client, mut last)| async move {
            loop {
                if let (Some(pacing), Some(last)) = (pacing, last) {
                    let cancel = client.cancel.clone();
                    tokio::select! {
                        _ = cancel.cancelled() => return None,
                        _ = sleep_until(last + pacing) => {}
                    }
                }

                let started = Instant::now();
                last = Some(started);
                match client.next().await {
                    Ok(package) if package.is_empty() => continue,
                    Ok(package) => return Some((Ok(package), (client, last))),
                    Err(BridgeError::Cancelled) => return None,
                    Err(e) => return Some((Err(e), (client, last))),
                }
            }
        })
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
