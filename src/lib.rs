//! Async client for the Karabo bridge data protocol.
//!
//! A bridge server answers every `next` request with a multipart reply of
//! (header, payload) frame pairs. This crate requests those replies and
//! decodes them into per-source records without copying array payloads.
//!
//! # Features
//!
//! - **Zero-copy arrays**: [`ArrayView`] reads typed slices straight out of the
//!   received frames
//! - **Strict casts**: no implicit numeric conversion; a mismatch is an error
//!   local to the value, never to the reply
//! - **Timeout-safe requests**: a timed-out request stays outstanding and is
//!   never sent twice
//! - **Pluggable transport**: in-process channels for tests and embedding,
//!   ZeroMQ behind the `zeromq` feature
//!
//! # Quick Start
//!
//! ```rust
//! use karabo_bridge::{Bridge, ClientConfig};
//! use karabo_bridge::transports::channel;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> karabo_bridge::Result<()> {
//! let (transport, server) = channel();
//! let mut client = Bridge::attach(transport, ClientConfig::default())?;
//!
//! # use rmpv::Value;
//! # let encode = |v: Value| { let mut b = Vec::new(); rmpv::encode::write_value(&mut b, &v).unwrap(); bytes::Bytes::from(b) };
//! # let header = Value::Map(vec![
//! #     ("source".into(), "cam".into()),
//! #     ("content".into(), "msgpack".into()),
//! #     ("metadata".into(), Value::Map(vec![])),
//! # ]);
//! # let payload = Value::Map(vec![("n".into(), 7u64.into())]);
//! # server.reply(vec![encode(header), encode(payload)])?;
//! let package = client.next().await?;
//! for (source, record) in &package {
//!     println!("{source}: {} fields, {} arrays", record.fields().len(), record.arrays().len());
//! }
//! assert_eq!(package["cam"].field::<u64>("n")?, 7);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod error;
pub mod protocol;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod transport;
pub mod transports;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, DuplicateSourcePolicy};
pub use error::*;
pub use transport::{ReceivedFrame, Transport};
pub use types::*;

#[cfg(feature = "zeromq")]
pub use transports::ZmqTransport;

/// Entry point for creating bridge clients.
///
/// # Examples
///
/// ## ZeroMQ (feature `zeromq`)
/// ```rust,ignore
/// use karabo_bridge::{Bridge, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> karabo_bridge::Result<()> {
///     let config = ClientConfig::default().with_endpoint("tcp://localhost:4545");
///     let mut client = Bridge::connect(config).await?;
///     let package = client.next().await?;
///     Ok(())
/// }
/// ```
pub struct Bridge;

impl Bridge {
    /// Build a client over an existing transport.
    pub fn attach<T: Transport>(transport: T, config: ClientConfig) -> Result<Client<T>> {
        Client::new(transport, config)
    }

    /// Connect a REQ socket to `config.endpoint`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Config`] if no endpoint is configured, or a transport
    /// error if the socket cannot connect.
    #[cfg(feature = "zeromq")]
    pub async fn connect(config: ClientConfig) -> Result<Client<ZmqTransport>> {
        config.validate()?;
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| BridgeError::config("an endpoint is required to connect"))?;
        let transport = ZmqTransport::connect(&endpoint).await?;
        Client::new(transport, config)
    }
}
