//! Packet trait and raw packet representation
//!
//! A packet's wire form inside a frame payload is:
//! ```text
//! [varuint32 packet_id][body...]
//! ```
//! Packet IDs are only unique within one connection state.

use bytes::{Bytes, BytesMut};
use cobble_core::Result;

use crate::codecs::{read_var_u32, var_u32_len, write_var_u32};

/// A typed packet body that can read and write itself
pub trait Packet: Sized + Send + 'static {
    /// Packet ID within its connection state
    const ID: u32;

    /// Decode the body (the packet ID has already been consumed).
    fn read(buf: &mut Bytes) -> Result<Self>;

    /// Encode the body (without the packet ID).
    fn write(&self, buf: &mut BytesMut);

    /// Encode the packet ID followed by the body.
    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(var_u32_len(Self::ID) + 16);
        write_var_u32(&mut buf, Self::ID);
        self.write(&mut buf);
        buf.freeze()
    }
}

/// Short type name of a packet, used in logs and handler errors
pub fn packet_name<P: Packet>() -> &'static str {
    let full = std::any::type_name::<P>();
    full.rsplit("::").next().unwrap_or(full)
}

/// A packet whose body has not been decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: u32,
    pub body: Bytes,
}

impl RawPacket {
    pub fn new(id: u32, body: Bytes) -> Self {
        Self { id, body }
    }

    /// Split a frame payload into packet ID and body.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        let id = read_var_u32(&mut payload)?;
        Ok(Self { id, body: payload })
    }

    /// Encode the packet ID followed by the body.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(var_u32_len(self.id) + self.body.len());
        write_var_u32(&mut buf, self.id);
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::read_var_u32;

    /// Packet ID 0 with a single varint field
    struct Counter {
        value: u32,
    }

    impl Packet for Counter {
        const ID: u32 = 0x00;

        fn read(buf: &mut Bytes) -> Result<Self> {
            Ok(Self {
                value: read_var_u32(buf)?,
            })
        }

        fn write(&self, buf: &mut BytesMut) {
            write_var_u32(buf, self.value);
        }
    }

    #[test]
    fn test_encode_example_packet() {
        let encoded = Counter { value: 300 }.encode();
        assert_eq!(&encoded[..], &[0x00, 0xAC, 0x02]);

        let raw = RawPacket::decode(encoded).unwrap();
        assert_eq!(raw.id, 0);
        let mut body = raw.body.clone();
        assert_eq!(Counter::read(&mut body).unwrap().value, 300);
        assert_eq!(&raw.encode()[..], &[0x00, 0xAC, 0x02]);
    }

    #[test]
    fn test_packet_name_is_short() {
        assert_eq!(packet_name::<Counter>(), "Counter");
    }
}
