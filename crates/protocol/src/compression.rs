//! Compression layer for frame payloads
//!
//! # Envelope Format
//! ```text
//! [varuint32 N][N == 0 ? raw payload : zlib(payload) inflating to N bytes]
//! ```
//!
//! Payloads shorter than the negotiated threshold travel uncompressed with
//! `N = 0`. A peer that claims compression for a payload below the threshold,
//! or above the protocol maximum, is rejected.

use bytes::{Buf, BufMut, BytesMut};
use cobble_core::{ProtocolError, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::codecs::{read_var_u32, write_var_u32};

/// Largest uncompressed payload a compressed envelope may declare.
pub const MAX_UNCOMPRESSED_LEN: usize = 2_097_152;

/// Default zlib compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Connection-scoped deflate/inflate state
///
/// Both streams are reset after every packet, so each envelope is an
/// independent zlib stream.
pub struct CompressionTransform {
    threshold: usize,
    deflater: Compress,
    inflater: Decompress,
}

impl std::fmt::Debug for CompressionTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionTransform")
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl CompressionTransform {
    /// Create a transform with the given threshold and zlib level (0-9)
    pub fn new(threshold: usize, level: u32) -> Self {
        Self {
            threshold,
            deflater: Compress::new(Compression::new(level.min(9)), true),
            inflater: Decompress::new(true),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Wrap `payload` in a compression envelope, appending it to `dst`.
    pub fn compress(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > MAX_UNCOMPRESSED_LEN {
            return Err(ProtocolError::SizeExceeded {
                what: "uncompressed payload",
                len: payload.len(),
                max: MAX_UNCOMPRESSED_LEN,
            });
        }

        if payload.len() < self.threshold {
            write_var_u32(dst, 0);
            dst.put_slice(payload);
            return Ok(());
        }

        write_var_u32(dst, payload.len() as u32);
        let deflated = self.deflate(payload);
        self.deflater.reset();
        dst.put_slice(&deflated?);
        Ok(())
    }

    /// Unwrap a compression envelope, returning the original payload.
    ///
    /// # Errors
    /// - `BadCompression` if `N` is below the threshold or above the maximum
    /// - `BadCompression` if the inflated size does not equal `N`
    pub fn decompress(&mut self, mut envelope: BytesMut) -> Result<BytesMut> {
        let declared = read_var_u32(&mut envelope)? as usize;

        if declared == 0 {
            return Ok(envelope);
        }

        if declared < self.threshold {
            return Err(ProtocolError::BadCompression(format!(
                "declared size {} is below threshold {}",
                declared, self.threshold
            )));
        }

        if declared > MAX_UNCOMPRESSED_LEN {
            return Err(ProtocolError::BadCompression(format!(
                "declared size {} exceeds maximum {}",
                declared, MAX_UNCOMPRESSED_LEN
            )));
        }

        let inflated = self.inflate(envelope.chunk(), declared);
        self.inflater.reset(true);
        Ok(BytesMut::from(&inflated?[..]))
    }

    fn deflate(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        let start_in = self.deflater.total_in();

        loop {
            let consumed = (self.deflater.total_in() - start_in) as usize;
            let status = self
                .deflater
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Finish)
                .map_err(|e| ProtocolError::BadCompression(e.to_string()))?;

            match status {
                Status::StreamEnd => return Ok(out),
                Status::Ok | Status::BufError => out.reserve(out.capacity().max(64)),
            }
        }
    }

    fn inflate(&mut self, input: &[u8], declared: usize) -> Result<Vec<u8>> {
        // One spare byte lets an overlong stream show up as a size mismatch
        let mut out = Vec::with_capacity(declared + 1);
        let start_in = self.inflater.total_in();
        let mut finished = false;

        loop {
            let consumed = (self.inflater.total_in() - start_in) as usize;
            let before = self.inflater.total_out();
            let status = self
                .inflater
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Finish)
                .map_err(|e| ProtocolError::BadCompression(e.to_string()))?;

            let stalled = self.inflater.total_out() == before;
            match status {
                Status::StreamEnd => {
                    finished = true;
                    break;
                }
                _ if stalled || out.len() > declared => break,
                _ => {}
            }
        }

        if out.len() != declared {
            return Err(ProtocolError::BadCompression(format!(
                "inflated {} bytes, envelope declared {}",
                out.len(),
                declared
            )));
        }

        if !finished {
            return Err(ProtocolError::BadCompression(
                "zlib stream ended before its checksum".to_string(),
            ));
        }

        let consumed = (self.inflater.total_in() - start_in) as usize;
        if consumed != input.len() {
            return Err(ProtocolError::BadCompression(format!(
                "{} bytes after the end of the zlib stream",
                input.len() - consumed
            )));
        }

        Ok(out)
    }
}
