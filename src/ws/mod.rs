//! Networking: wire codec, framing, dispatch, addressing and the transport

pub mod clients;
pub mod codec;
pub mod handler;
pub mod packet;
pub mod protocol;
pub mod resolver;
pub mod socket;

pub use clients::{ClientId, Clients, Selection};
pub use packet::{ChannelKey, Packet};
pub use resolver::Resolver;
pub use socket::Socket;
