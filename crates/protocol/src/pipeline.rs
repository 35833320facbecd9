//! Composed per-connection codec
//!
//! Stacks the optional cipher and compression layers around the frame codec:
//!
//! ```text
//! inbound:  bytes → decrypt → frame → decompress → payload
//! outbound: payload → compress → frame → encrypt → bytes
//! ```
//!
//! Both layers start disabled and are switched on mid-stream through
//! `Framed::codec_mut()`. Enabling encryption affects every byte not yet
//! decoded, including bytes that were already buffered when the switch
//! happened.

use bytes::{Bytes, BytesMut};
use cobble_core::{ProtocolError, Result};
use tokio_util::codec::{Decoder, Encoder};

use crate::cipher::{CipherTransform, SHARED_SECRET_LEN};
use crate::compression::CompressionTransform;
use crate::frame::{encode_frame, FrameCodec};

#[derive(Debug, Default)]
pub struct PacketCodec {
    frame: FrameCodec,
    compression: Option<CompressionTransform>,
    cipher: Option<CipherTransform>,
    /// Number of bytes at the front of the read buffer already decrypted
    decrypted: usize,
    envelope: BytesMut,
    scratch: BytesMut,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start wrapping payloads in compression envelopes.
    ///
    /// Replaces any previous compression settings.
    pub fn enable_compression(&mut self, threshold: usize, level: u32) {
        self.compression = Some(CompressionTransform::new(threshold, level));
    }

    /// Start encrypting both directions with the shared secret.
    pub fn enable_encryption(&mut self, shared_secret: &[u8; SHARED_SECRET_LEN]) {
        self.cipher = Some(CipherTransform::new(shared_secret));
        self.decrypted = 0;
    }

    pub fn compression_threshold(&self) -> Option<usize> {
        self.compression.as_ref().map(CompressionTransform::threshold)
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }
}

impl Decoder for PacketCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(cipher) = self.cipher.as_mut() {
            if src.len() > self.decrypted {
                cipher.decrypt(&mut src[self.decrypted..]);
                self.decrypted = src.len();
            }
        }

        let before = src.len();
        let Some(frame) = self.frame.decode(src)? else {
            return Ok(None);
        };
        self.decrypted = self.decrypted.saturating_sub(before - src.len());

        let payload = match self.compression.as_mut() {
            Some(compression) => compression.decompress(frame)?,
            None => frame,
        };
        Ok(Some(payload.freeze()))
    }
}

impl Encoder<Bytes> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.scratch.clear();

        match self.compression.as_mut() {
            Some(compression) => {
                self.envelope.clear();
                compression.compress(&payload, &mut self.envelope)?;
                encode_frame(&self.envelope, &mut self.scratch)?;
            }
            None => encode_frame(&payload, &mut self.scratch)?,
        }

        match self.cipher.as_mut() {
            Some(cipher) => dst.extend_from_slice(cipher.encrypt(&self.scratch)),
            None => dst.extend_from_slice(&self.scratch),
        }
        Ok(())
    }
}
