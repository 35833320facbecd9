//! Core error types for Cobble
//!
//! Every failure in the transport core is fatal to the connection it occurred
//! on. The variants are grouped by how the connection layer reports them:
//! bounds and protocol violations are logged loudly, transport faults quietly.

use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data received for {0:?}")]
    Timeout(Duration),

    #[error("{what} too large: {len} (max {max})")]
    SizeExceeded {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Not enough bytes for {what}: need {needed}, have {remaining}")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Compression error: {0}")]
    BadCompression(String),

    #[error("Unknown packet ID 0x{id:02x} in state {state}")]
    UnknownPacketId { state: &'static str, id: u32 },

    #[error("Packet {packet} has {remaining} unread trailing bytes")]
    TrailingBytes {
        packet: &'static str,
        remaining: usize,
    },

    #[error("Invalid next state: {0}")]
    InvalidNextState(i32),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Verify token mismatch")]
    VerifyTokenMismatch,

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Handler for {packet} failed: {source}")]
    Handler {
        packet: &'static str,
        source: Box<ProtocolError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event loop pool has been shut down")]
    PoolShutdown,
}

impl ProtocolError {
    /// Wrap a handler failure with the name of the packet being handled.
    pub fn handler(packet: &'static str, source: ProtocolError) -> Self {
        Self::Handler {
            packet,
            source: Box::new(source),
        }
    }

    /// Transport faults (I/O errors, idle timeouts) are expected churn and
    /// are reported at low severity. Everything else is a misbehaving peer.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout(_) => true,
            Self::Handler { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let io = ProtocolError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(io.is_transport());
        assert!(ProtocolError::Timeout(Duration::from_secs(30)).is_transport());
        assert!(!ProtocolError::VerifyTokenMismatch.is_transport());
        assert!(!ProtocolError::UnknownPacketId { state: "PLAY", id: 7 }.is_transport());
    }

    #[test]
    fn test_handler_wrapping_keeps_packet_name() {
        let err = ProtocolError::handler("LoginStart", ProtocolError::VerifyTokenMismatch);
        let text = err.to_string();
        assert!(text.contains("LoginStart"));
        assert!(text.contains("Verify token mismatch"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
