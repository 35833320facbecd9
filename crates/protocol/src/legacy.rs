//! Pre-netty server list ping
//!
//! Old clients open with `0xFE` instead of a frame length. They never speak
//! the framed protocol: the server answers with a single kick packet carrying
//! the status fields and closes the connection.
//!
//! # Reply Format
//! ```text
//! [0xFF][u16 BE length in UTF-16 units][UTF-16BE "§1\0protocol\0version\0motd\0online\0max"]
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// First byte sent by a legacy ping
pub const LEGACY_PING: u8 = 0xFE;

const LEGACY_KICK: u8 = 0xFF;

/// Whether the first byte of a new connection starts a legacy ping
pub fn is_legacy_ping(first_byte: u8) -> bool {
    first_byte == LEGACY_PING
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStatus {
    pub protocol: i32,
    pub version: String,
    pub motd: String,
    pub online: usize,
    pub max: usize,
}

impl LegacyStatus {
    fn text(&self) -> String {
        format!(
            "§1\0{}\0{}\0{}\0{}\0{}",
            self.protocol, self.version, self.motd, self.online, self.max
        )
    }

    /// Encode the kick packet answering a legacy ping.
    ///
    /// Text beyond `u16::MAX` UTF-16 units is cut off.
    pub fn encode(&self) -> Bytes {
        let units: Vec<u16> = self.text().encode_utf16().take(u16::MAX as usize).collect();

        let mut buf = BytesMut::with_capacity(3 + units.len() * 2);
        buf.put_u8(LEGACY_KICK);
        buf.put_u16(units.len() as u16);
        for unit in units {
            buf.put_u16(unit);
        }
        buf.freeze()
    }
}
