//! # Cobble Networking Layer
//!
//! Tokio transport around the protocol core.
//!
//! ## Modules
//!
//! - [`config`] - Server configuration options
//! - [`pool`] - Lazily started, explicitly owned event loop pool
//! - [`auth`] - RSA keypair and verify-token exchange
//! - [`session`] - Per-connection handler context and queued actions
//! - [`handlers`] - Default handshake, status, login and play handlers
//! - [`connection`] - Per-connection task and cross-task handle
//! - [`server`] - Listener, connection map and accept loop
//! - [`stats`] - Server-wide counters

pub mod auth;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod pool;
pub mod server;
pub mod session;
pub mod stats;

// Re-export commonly used items
pub use auth::ServerKeyPair;
pub use config::ServerConfig;
pub use connection::{Connection, ConnectionHandle};
pub use pool::EventLoopPool;
pub use server::Server;
pub use session::{ServerContext, Session, SessionAction};
pub use stats::{ServerMetrics, ServerStats};
