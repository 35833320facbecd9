//! HANDSHAKING state packet

use bytes::{BufMut, Bytes, BytesMut};
use cobble_core::Result;

use crate::codecs::{read_string, read_u16, read_var_u32, write_string, write_var_u32};
use crate::packet::Packet;
use crate::state::ConnectionState;

/// Longest server address a client may send
pub const MAX_SERVER_ADDRESS_LEN: usize = 255;

/// First packet of every connection, selecting STATUS or LOGIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: ConnectionState,
}

impl Packet for Handshake {
    const ID: u32 = 0x00;

    fn read(buf: &mut Bytes) -> Result<Self> {
        let protocol_version = read_var_u32(buf)? as i32;
        let server_address = read_string(buf, MAX_SERVER_ADDRESS_LEN)?;
        let server_port = read_u16(buf)?;

        let next_state = ConnectionState::from_handshake(read_var_u32(buf)? as i32)?;

        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_var_u32(buf, self.protocol_version as u32);
        write_string(buf, &self.server_address);
        buf.put_u16(self.server_port);
        write_var_u32(buf, self.next_state.id() as u32);
    }
}
