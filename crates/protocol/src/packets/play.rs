//! PLAY state packets

use bytes::{BufMut, Bytes, BytesMut};
use cobble_core::Result;

use crate::codecs::{read_i64, read_string, write_string};
use crate::packet::Packet;

use super::MAX_CHAT_LEN;

/// Liveness probe; the client echoes the server's ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub id: i64,
}

impl Packet for KeepAlive {
    const ID: u32 = 0x00;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self { id: read_i64(buf)? })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_i64(self.id);
    }
}

/// Server-initiated disconnect with a JSON text reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Packet for Disconnect {
    const ID: u32 = 0x01;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            reason: read_string(buf, MAX_CHAT_LEN)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_string(buf, &self.reason);
    }
}
