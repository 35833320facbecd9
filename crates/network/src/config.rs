//! # Server Configuration
//!
//! Configuration options for the Cobble networking layer.
//!
//! # Example
//!
//! ```rust
//! use cobble_network::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig {
//!     bind_address: "0.0.0.0:25565".parse().unwrap(),
//!     max_connections: 500,
//!     read_timeout: Duration::from_secs(30),
//!     compression_threshold: Some(256),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use cobble_protocol::DEFAULT_COMPRESSION_LEVEL;

/// Server configuration options
///
/// # Default Values
///
/// - Port 25565 on all interfaces
/// - 1000 max connections
/// - 30-second idle read timeout
/// - Compression at 256 bytes, zlib level 6
/// - Online mode (key exchange and encryption) enabled
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port to bind the TCP listener to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections
    ///
    /// Connections accepted beyond this limit are closed immediately.
    pub max_connections: usize,

    /// Listen backlog passed to the socket
    pub backlog: u32,

    /// How long a connection may go without sending a byte
    ///
    /// This is the only timeout in the transport. A connection that stays
    /// silent for this long is closed.
    pub read_timeout: Duration,

    /// Worker threads for the event loop pool (0 = one per core)
    pub worker_threads: usize,

    /// Minimum payload size before compression is applied
    ///
    /// `None` disables compression: no SetCompression packet is sent
    /// during login and payloads are never wrapped in envelopes.
    pub compression_threshold: Option<usize>,

    /// zlib level (0-9)
    pub compression_level: u32,

    /// Run the key exchange and encrypt the connection during login
    pub online_mode: bool,

    /// Message of the day shown in the server list
    pub motd: String,

    /// Player limit advertised in the server list
    pub max_players: usize,

    /// Version name advertised in the server list
    pub version_name: String,

    /// Protocol version advertised in the server list
    pub protocol_version: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 25565)),
            max_connections: 1000,
            backlog: 1024,
            read_timeout: Duration::from_secs(30),
            worker_threads: 0,
            compression_threshold: Some(256),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            online_mode: true,
            motd: "A Cobble server".to_string(),
            max_players: 20,
            version_name: "1.21".to_string(),
            protocol_version: 767,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration
    ///
    /// # Checks
    /// - `max_connections` must be > 0
    /// - `read_timeout` must be non-zero
    /// - `compression_level` must be 0-9
    /// - `compression_threshold` must fit in a frame
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.read_timeout.is_zero() {
            return Err("read_timeout must be > 0".to_string());
        }

        if self.compression_level > 9 {
            return Err("compression_level must be 0-9".to_string());
        }

        if let Some(threshold) = self.compression_threshold {
            if threshold > cobble_protocol::MAX_FRAME_LEN {
                return Err(format!(
                    "compression_threshold must be <= {}",
                    cobble_protocol::MAX_FRAME_LEN
                ));
            }
        }

        if self.max_players > self.max_connections {
            tracing::warn!(
                "max_players ({}) exceeds max_connections ({})",
                self.max_players,
                self.max_connections
            );
        }

        Ok(())
    }
}
