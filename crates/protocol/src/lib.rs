//! # Cobble Protocol Library
//!
//! Transport core of the Minecraft Java Edition protocol: everything between
//! the raw TCP byte stream and typed packet handlers.
//!
//! ## Architecture
//!
//! The protocol is organized into layers, innermost first:
//!
//! ### 1. Codecs Layer ([`codecs`])
//! Bounds-checked primitive reads and writes over `bytes` buffers:
//! - Fixed-width big-endian integers and floats
//! - VarUInt32/VarUInt64 (LSB-first, 7 data bits per byte) and zig-zag signed variants
//! - Length-prefixed strings, byte arrays and collections with caller-supplied maxima
//! - Nullable fields and UUIDs
//!
//! ### 2. Frame Codec ([`frame`])
//! `[varuint32 length (≤ 3 bytes)][payload]`, decoded without consuming partial frames.
//!
//! ### 3. Transforms ([`compression`], [`cipher`])
//! zlib envelopes above a threshold and AES-128-CFB8 over the whole stream.
//! [`PacketCodec`] stacks both around the frame codec for `tokio_util::codec::Framed`.
//!
//! ### 4. Packets ([`packet`], [`packets`])
//! The [`Packet`] trait and the built-in handshake, status, login and play packets.
//!
//! ### 5. Registry and State ([`registry`], [`state`])
//! Per-state packet ID tables with handlers, and the connection state machine
//! that swaps them.
//!
//! ## Wire Format
//!
//! ```text
//! [cipher](
//!   [varuint32 frame length][
//!     [varuint32 N][N == 0 ? raw : zlib] → [varuint32 packet id][body]
//!   ]
//! )
//! ```
//!
//! A connection whose first byte is `0xFE` is a [`legacy`] ping and never
//! enters this format.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cobble_protocol::{Packet, PacketCodec, packets::PingRequest};
//! use tokio_util::codec::Encoder;
//! use bytes::BytesMut;
//!
//! let mut codec = PacketCodec::new();
//! let mut wire = BytesMut::new();
//! codec.encode(PingRequest { payload: 42 }.encode(), &mut wire).unwrap();
//! ```

pub mod cipher;
pub mod codecs;
pub mod compression;
pub mod frame;
pub mod legacy;
pub mod packet;
pub mod packets;
pub mod pipeline;
pub mod registry;
pub mod state;

// Re-export commonly used items
pub use cipher::{CipherTransform, SHARED_SECRET_LEN};
pub use compression::{CompressionTransform, DEFAULT_COMPRESSION_LEVEL, MAX_UNCOMPRESSED_LEN};
pub use frame::{FrameCodec, MAX_FRAME_LEN};
pub use legacy::{is_legacy_ping, LegacyStatus};
pub use packet::{packet_name, Packet, RawPacket};
pub use pipeline::PacketCodec;
pub use registry::{AnyPacket, Dispatched, PacketRegistry, PacketRegistryBuilder, PacketType};
pub use state::{ConnectionState, ProtocolState, StateRegistries};
