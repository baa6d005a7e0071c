//! Transport implementations

pub mod channel;
#[cfg(feature = "zeromq")]
pub mod zmq;

pub use channel::{ChannelPeer, ChannelTransport, channel};
#[cfg(feature = "zeromq")]
pub use zmq::ZmqTransport;
