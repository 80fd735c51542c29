//! Packet framing
//!
//! Every frame starts with a 16-bit big-endian header: the top 4 bits are
//! the main channel, the low 12 bits the sub-channel. The codec payload
//! follows directly; its length is the rest of the transport frame.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::clients::ClientId;
use super::codec::{Codec, CodecError};

/// Bytes reserved in front of every payload for the header
pub const HEADER_SIZE: usize = 2;

pub const MAX_MAIN_CHANNEL: u8 = 0x0F;
pub const MAX_SUB_CHANNEL: u16 = 0x0FFF;

/// Routing key of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub main: u8,
    pub sub: u16,
}

impl ChannelKey {
    /// Out-of-range channel numbers are masked to their wire width
    pub const fn new(main: u8, sub: u16) -> Self {
        Self {
            main: main & MAX_MAIN_CHANNEL,
            sub: sub & MAX_SUB_CHANNEL,
        }
    }

    pub const fn header(self) -> u16 {
        ((self.main as u16) << 12) | self.sub
    }

    pub const fn from_header(header: u16) -> Self {
        Self {
            main: ((header & 0xF000) >> 12) as u8,
            sub: header & 0x0FFF,
        }
    }

    /// Read the key from the front of a frame. Frames shorter than the
    /// header yield `None`.
    pub fn read(frame: &[u8]) -> Option<Self> {
        let bytes: [u8; HEADER_SIZE] = frame.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_header(u16::from_be_bytes(bytes)))
    }

    /// Write the key into the reserved front bytes of `buffer`
    pub fn write(self, buffer: &mut [u8]) {
        if let Some(head) = buffer.get_mut(..HEADER_SIZE) {
            head.copy_from_slice(&self.header().to_be_bytes());
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#03x}/{:#05x}", self.main, self.sub)
    }
}

/// Encode `value` and frame it under `key` in one buffer
pub fn frame<T>(codec: &Codec<T>, key: ChannelKey, value: &T) -> Result<Bytes, CodecError>
where
    T: Serialize + DeserializeOwned,
{
    let mut buffer = codec.encode(value, HEADER_SIZE)?;
    key.write(&mut buffer);
    Ok(Bytes::from(buffer))
}

/// An inbound frame, routed but not yet decoded
#[derive(Debug, Clone)]
pub struct Packet {
    /// Sender, when the receiving side is the server
    pub client: Option<ClientId>,
    pub key: ChannelKey,
    data: Bytes,
}

impl Packet {
    /// Split the header off a raw frame. Frames too short to hold a header
    /// are dropped.
    pub fn parse(client: Option<ClientId>, data: Bytes) -> Option<Self> {
        let key = ChannelKey::read(&data)?;
        Some(Self { client, key, data })
    }

    /// The whole frame, header included
    pub fn frame(&self) -> &Bytes {
        &self.data
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }

    /// Decode the payload. `None` when it is malformed or of the wrong shape.
    pub fn decode<T>(&self, codec: &Codec<T>) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
    {
        codec.decode(&self.data, HEADER_SIZE)
    }
}
