//! Length-prefixed frame codec
//!
//! # Format
//! ```text
//! [varuint32 length (1-3 bytes)][payload: length bytes]
//! ```
//!
//! The prefix is limited to three encoded bytes, which bounds a single frame
//! to 2,097,151 bytes. Decoding never consumes anything until a whole frame
//! has arrived, so the codec can be re-entered on every transport read.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use cobble_core::{ProtocolError, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::codecs::{var_u32_len, write_var_u32};

/// Maximum number of bytes in a frame length prefix.
pub const MAX_FRAME_PREFIX_LEN: usize = 3;

/// Largest payload a frame can carry (the largest 3-byte varint).
pub const MAX_FRAME_LEN: usize = (1 << (7 * MAX_FRAME_PREFIX_LEN)) - 1;

/// Splits a byte stream into frames and prefixes outgoing frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Peek at the length prefix without consuming it.
///
/// Returns `Ok(None)` when the prefix has not fully arrived yet, and
/// `Ok(Some((payload_len, prefix_len)))` once it has.
fn peek_length(src: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut value = 0usize;

    for (i, &byte) in src.iter().take(MAX_FRAME_PREFIX_LEN).enumerate() {
        value |= usize::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }

    if src.len() >= MAX_FRAME_PREFIX_LEN {
        return Err(ProtocolError::SizeExceeded {
            what: "frame length prefix",
            len: MAX_FRAME_PREFIX_LEN + 1,
            max: MAX_FRAME_PREFIX_LEN,
        });
    }

    Ok(None)
}

/// Write `payload` as one frame into `dst`.
///
/// # Errors
/// Returns `SizeExceeded` if the length would need more than three prefix bytes.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::SizeExceeded {
            what: "frame",
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let len = payload.len() as u32;
    dst.reserve(var_u32_len(len) + payload.len());
    write_var_u32(dst, len);
    dst.put_slice(payload);
    Ok(())
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        let Some((len, prefix_len)) = peek_length(src)? else {
            return Ok(None);
        };

        let total = prefix_len + len;
        if src.len() < total {
            // Wait for the rest of the frame
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst)
    }
}
