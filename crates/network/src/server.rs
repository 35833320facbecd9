//! # Cobble Server
//!
//! Accepts TCP connections and spawns one task per connection.
//!
//! # Components
//!
//! 1. **TCP Listener** - built with `socket2`, then handed to tokio
//! 2. **Connection Map** - `DashMap<ConnectionId, ConnectionHandle>` of live connections
//! 3. **Registries** - one frozen packet registry per connection state, shared by all connections
//! 4. **ID Generator** - assigns connection IDs
//!
//! # Example
//!
//! ```rust,no_run
//! use cobble_network::{EventLoopPool, Server, ServerConfig};
//!
//! let config = ServerConfig {
//!     bind_address: "0.0.0.0:25565".parse().unwrap(),
//!     ..Default::default()
//! };
//!
//! let pool = EventLoopPool::new("cobble-worker", 0);
//! let server = Server::new(config).unwrap();
//! pool.block_on(server.run()).unwrap().unwrap();
//! pool.shutdown();
//! ```

use cobble_core::{ConnectionId, IdGenerator, ProtocolError, Result};
use cobble_protocol::{Packet, StateRegistries};
use dashmap::DashMap;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionHandle};
use crate::handlers::default_registries;
use crate::session::{ServerContext, Session};
use crate::stats::ServerStats;

pub struct Server {
    context: Arc<ServerContext>,
    registries: Arc<StateRegistries<Session>>,
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
    id_generator: IdGenerator,
}

impl Server {
    /// Create a server with the default registries
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `Crypto` if the online-mode keypair cannot be generated
    pub fn new(config: ServerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ProtocolError::Config(format!("Invalid configuration: {}", e)))?;

        Ok(Self {
            context: Arc::new(ServerContext::new(config)?),
            registries: Arc::new(default_registries()),
            connections: Arc::new(DashMap::new()),
            id_generator: IdGenerator::new(),
        })
    }

    /// Replace the packet registries used for new connections
    pub fn with_registries(mut self, registries: StateRegistries<Session>) -> Self {
        self.registries = Arc::new(registries);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Bind the listening socket
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = self.context.config.bind_address;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into()).map_err(|e| {
            ProtocolError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;
        socket.listen(self.context.config.backlog.min(i32::MAX as u32) as i32)?;

        let listener = TcpListener::from_std(socket.into())?;
        tracing::info!("Cobble listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl-C received, initiating shutdown");
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` completes
    ///
    /// # Lifecycle
    ///
    /// ```text
    /// 1. Accept incoming connection
    /// 2. Check connection limit
    /// 3. Assign connection ID
    /// 4. Spawn connection task
    /// 5. Repeat until shutdown, then ask every live connection to close
    /// ```
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "Configuration: max_connections={}, online_mode={}, compression={:?}",
            self.context.config.max_connections,
            self.context.config.online_mode,
            self.context.config.compression_threshold
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            if self.connections.len() >= self.context.config.max_connections {
                                tracing::warn!(
                                    "Connection from {} rejected: server full ({} connections)",
                                    addr,
                                    self.connections.len()
                                );
                                self.context.metrics.connection_rejected();
                                drop(socket);
                                continue;
                            }

                            if let Err(e) = socket.set_nodelay(true) {
                                tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                            }

                            let id = self.id_generator.next_id();
                            tracing::debug!("New connection {} from {}", id, addr);

                            let (connection, handle) = Connection::new(
                                socket,
                                id,
                                Some(addr),
                                Arc::clone(&self.context),
                                Arc::clone(&self.registries),
                            );
                            self.connections.insert(id, handle);

                            let connections = Arc::clone(&self.connections);
                            tokio::spawn(async move {
                                // Errors are logged by the connection itself
                                let _ = connection.run().await;
                                connections.remove(&id);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Error accepting connection: {}", e);
                        }
                    }
                }

                _ = &mut shutdown => {
                    break;
                }
            }
        }

        tracing::info!("Closing {} connections", self.connections.len());
        for entry in self.connections.iter() {
            let _ = entry.value().disconnect();
        }

        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Queue a packet on every live connection
    ///
    /// # Returns
    /// The number of connections the packet was queued on
    pub fn broadcast<P: Packet>(&self, packet: &P) -> usize {
        let mut sent = 0;
        for entry in self.connections.iter() {
            match entry.value().send(packet) {
                Ok(()) => sent += 1,
                Err(e) => tracing::debug!("Broadcast to {} failed: {}", entry.key(), e),
            }
        }
        sent
    }

    pub fn stats(&self) -> ServerStats {
        self.context.metrics.snapshot()
    }
}
