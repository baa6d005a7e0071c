//! ZeroMQ REQ socket transport
//!
//! The socket lives in a background task. `ReqSocket::recv` gives up its
//! pending request when its future is dropped, so the task keeps that future
//! alive across client timeouts and forwards each reply frame over a channel.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::transport::{ReceivedFrame, Transport};
use crate::{BridgeError, Result};

struct Outgoing {
    payload: Bytes,
    sent: oneshot::Sender<Result<()>>,
}

/// Transport over a ZeroMQ REQ socket owned by a background task.
pub struct ZmqTransport {
    endpoint: String,
    requests: mpsc::UnboundedSender<Outgoing>,
    frames: mpsc::UnboundedReceiver<Result<ReceivedFrame>>,
    cancel: CancellationToken,
}

impl ZmqTransport {
    /// Connect a REQ socket to `endpoint` and start its socket task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!(endpoint, "Connecting REQ socket");
        let mut socket = ReqSocket::new();
        socket.connect(endpoint).await?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(socket_task(socket, request_rx, frame_tx, cancel.clone()));

        Ok(Self { endpoint: endpoint.to_string(), requests: request_tx, frames: frame_rx, cancel })
    }
}

fn task_stopped() -> BridgeError {
    BridgeError::transport_failed("ZeroMQ socket task stopped")
}

/// Sends one request, then drives its receive to completion before taking
/// the next request. Only cancellation drops a pending receive.
async fn socket_task(
    mut socket: ReqSocket,
    mut requests: mpsc::UnboundedReceiver<Outgoing>,
    frames: mpsc::UnboundedSender<Result<ReceivedFrame>>,
    cancel: CancellationToken,
) {
    debug!("Socket task started");
    loop {
        let outgoing = tokio::select! {
            _ = cancel.cancelled() => break,
            outgoing = requests.recv() => match outgoing {
                Some(outgoing) => outgoing,
                None => break,
            },
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = socket.send(ZmqMessage::from(outgoing.payload)) => sent.map_err(BridgeError::from),
        };
        let failed = sent.is_err();
        // The sender may have stopped waiting; the outcome then goes nowhere.
        let _ = outgoing.sent.send(sent);
        if failed {
            continue;
        }

        let reply = tokio::select! {
            _ = cancel.cancelled() => break,
            reply = socket.recv() => reply,
        };

        let forwarded = match reply {
            Ok(message) => {
                let parts = message.into_vecdeque();
                trace!(frames = parts.len(), "Reply received");
                let last = parts.len().saturating_sub(1);
                parts
                    .into_iter()
                    .enumerate()
                    .all(|(i, data)| frames.send(Ok(ReceivedFrame::new(data, i != last))).is_ok())
            }
            Err(err) => frames.send(Err(err.into())).is_ok(),
        };
        if !forwarded {
            break;
        }
    }
    debug!("Socket task stopped");
}

#[async_trait::async_trait]
impl Transport for ZmqTransport {
    async fn send(&mut self, payload: Bytes) -> Result<()> {
        let (sent, outcome) = oneshot::channel();
        self.requests.send(Outgoing { payload, sent }).map_err(|_| task_stopped())?;
        outcome.await.map_err(|_| task_stopped())?
    }

    async fn receive_frame(&mut self) -> Result<ReceivedFrame> {
        self.frames.recv().await.ok_or_else(task_stopped)?
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for ZmqTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(all(test, feature = "zeromq"))]
mod tests {
    use super::*;
    use crate::test_utils::ReplyBuilder;
    use crate::{Bridge, ClientConfig};
    use rmpv::Value;
    use std::time::Duration;
    use zeromq::RepSocket;

    async fn bind_server() -> (RepSocket, String) {
        let mut server = RepSocket::new();
        let endpoint = server.bind("tcp://127.0.0.1:0").await.unwrap();
        (server, endpoint.to_string())
    }

    fn multipart(frames: Vec<Bytes>) -> ZmqMessage {
        let mut parts = frames.into_iter();
        let mut message = ZmqMessage::from(parts.next().unwrap());
        for part in parts {
            message.push_back(part);
        }
        message
    }

    fn camera_reply() -> Vec<Bytes> {
        ReplyBuilder::new()
            .record("cam", vec![("timestamp.tid", Value::from(10_000u64))], vec![("trainId", Value::from(10_000u64))])
            .array("cam", "image.data", &[2], "uint16", &[7u16, 9])
            .build()
    }

    #[tokio::test]
    async fn request_reply_round_trip() {
        let (mut server, endpoint) = bind_server().await;
        let config = ClientConfig::default().with_endpoint(&endpoint).with_timeout(Duration::from_secs(5));
        let mut client = Bridge::connect(config).await.unwrap();
        assert_eq!(client.endpoint(), endpoint);

        let serve = tokio::spawn(async move {
            let request = server.recv().await.unwrap();
            assert_eq!(request.get(0).unwrap().as_ref(), b"next");
            server.send(multipart(camera_reply())).await.unwrap();
        });

        let package = client.next().await.unwrap();
        serve.await.unwrap();

        let record = &package["cam"];
        assert_eq!(record.field::<u64>("trainId").unwrap(), 10_000);
        assert_eq!(record.array_as::<Vec<u16>>("image.data").unwrap(), vec![7, 9]);
        assert!(!client.is_awaiting_reply());
    }

    #[tokio::test]
    async fn late_reply_is_delivered_without_resend() {
        let (mut server, endpoint) = bind_server().await;
        let config = ClientConfig::default().with_endpoint(&endpoint).with_timeout(Duration::from_millis(100));
        let mut client = Bridge::connect(config).await.unwrap();

        let serve = tokio::spawn(async move {
            server.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            server.send(multipart(camera_reply())).await.unwrap();
            // No second request may follow the late reply.
            tokio::time::timeout(Duration::from_millis(300), server.recv()).await.is_err()
        });

        assert!(client.next().await.unwrap().is_empty());
        assert!(client.is_awaiting_reply());

        let mut package = client.next().await.unwrap();
        for _ in 0..20 {
            if !package.is_empty() {
                break;
            }
            package = client.next().await.unwrap();
        }
        assert_eq!(package["cam"].field::<u64>("trainId").unwrap(), 10_000);
        assert!(!client.is_awaiting_reply());

        assert!(serve.await.unwrap(), "server saw a second request");
    }

    #[tokio::test]
    async fn stopped_socket_task_fails_transport() {
        let (_server, endpoint) = bind_server().await;
        let mut transport = ZmqTransport::connect(&endpoint).await.unwrap();
        transport.cancel.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(transport.send(Bytes::from_static(b"next")).await, Err(BridgeError::Transport { .. })));
        assert!(matches!(transport.receive_frame().await, Err(BridgeError::Transport { .. })));
    }
}
