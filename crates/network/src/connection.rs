//! # Connection Task
//!
//! Drives one client connection from the first byte to close.
//!
//! # Architecture
//!
//! Each connection runs in its own Tokio task. Reads, the transform chain,
//! dispatch and writes all happen sequentially inside that task, so handlers
//! never need locks for per-connection state. Other tasks reach the
//! connection through a [`ConnectionHandle`].
//!
//! # Lifecycle
//!
//! ```text
//! first read ──▶ 0xFE? ──yes──▶ legacy status reply, close
//!                  │
//!                  no
//!                  ▼
//!        Framed<S, PacketCodec> loop:
//!          inbound frame → dispatch → apply session actions → flush
//!          handle message → write
//!          no bytes for read_timeout → close
//! ```
//!
//! # Errors
//!
//! Every error is fatal to the connection. It is reported to the active
//! registry's exception hook, logged (transport faults at debug, everything
//! else at warn) and the connection is closed.

use bytes::{Bytes, BytesMut};
use cobble_core::{ConnectionId, ProtocolError, Result};
use cobble_protocol::{
    is_legacy_ping, Packet, PacketCodec, ProtocolState, RawPacket, StateRegistries,
};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::codec::{Framed, FramedParts};

use crate::session::{ServerContext, Session, SessionAction};

/// Size of the first read, which also seeds the frame buffer
const INITIAL_READ_CAPACITY: usize = 4096;

/// Messages a connection can hold from other tasks before senders see an error
const OUTBOUND_QUEUE_LEN: usize = 256;

#[derive(Debug)]
enum Outbound {
    Packet(Bytes),
    Disconnect,
}

/// Cross-task handle to a running connection
///
/// Cheap to clone. All methods fail once the connection has closed or its
/// queue is full.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn push(&self, message: Outbound) -> Result<()> {
        self.tx.try_send(message).map_err(|e| {
            let kind = match e {
                mpsc::error::TrySendError::Full(_) => std::io::ErrorKind::WouldBlock,
                mpsc::error::TrySendError::Closed(_) => std::io::ErrorKind::NotConnected,
            };
            ProtocolError::Io(std::io::Error::new(
                kind,
                format!("Connection {} is not accepting packets", self.id),
            ))
        })
    }

    /// Queue a packet for the connection to write
    pub fn send<P: Packet>(&self, packet: &P) -> Result<()> {
        self.push(Outbound::Packet(packet.encode()))
    }

    /// Queue a packet whose body is already encoded
    pub fn send_raw(&self, packet: &RawPacket) -> Result<()> {
        self.push(Outbound::Packet(packet.encode()))
    }

    /// Ask the connection to close after writing what is already queued
    pub fn disconnect(&self) -> Result<()> {
        self.push(Outbound::Disconnect)
    }
}

/// Transport wrapper that remembers when bytes last arrived
struct ReadActivity<S> {
    inner: S,
    last_read: Instant,
}

impl<S> ReadActivity<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            last_read: Instant::now(),
        }
    }

    fn last_read(&self) -> Instant {
        self.last_read
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ReadActivity<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if buf.filled().len() > before {
            this.last_read = Instant::now();
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ReadActivity<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// One client connection, ready to run
pub struct Connection<S> {
    io: S,
    session: Session,
    protocol: ProtocolState<Session>,
    outbound: mpsc::Receiver<Outbound>,
    read_timeout: Duration,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an accepted byte stream
    ///
    /// # Arguments
    /// * `io` - The transport (a TCP stream, or one half of `tokio::io::duplex` in tests)
    /// * `id` - Connection ID assigned by the server
    /// * `peer_addr` - Remote address, if the transport has one
    /// * `server` - Shared server context
    /// * `registries` - Per-state packet registries
    pub fn new(
        io: S,
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        server: Arc<ServerContext>,
        registries: Arc<StateRegistries<Session>>,
    ) -> (Self, ConnectionHandle) {
        let (tx, outbound) = mpsc::channel(OUTBOUND_QUEUE_LEN);
        let read_timeout = server.config.read_timeout;

        let connection = Self {
            io,
            session: Session::new(id, peer_addr, server),
            protocol: ProtocolState::new(registries),
            outbound,
            read_timeout,
        };
        let handle = ConnectionHandle { id, peer_addr, tx };

        (connection, handle)
    }

    /// Run the connection until it closes
    ///
    /// # Returns
    /// `Ok(())` when the peer or a handler closed the connection, or the
    /// error that closed it.
    pub async fn run(self) -> Result<()> {
        let Self {
            io,
            mut session,
            mut protocol,
            mut outbound,
            read_timeout,
        } = self;

        let id = session.id();
        let server = Arc::clone(session.server());
        server.metrics.connection_opened();
        protocol.active().attach(&mut session);

        let result = serve(io, &mut session, &mut protocol, &mut outbound, read_timeout).await;

        if let Err(e) = &result {
            protocol.active().exception_caught(&mut session, e);
            if e.is_transport() {
                tracing::debug!("Connection {} closed: {}", id, e);
            } else {
                server.metrics.protocol_error();
                tracing::warn!("Connection {} closed in {}: {}", id, protocol.state(), e);
            }
        } else {
            tracing::debug!("Connection {} closed", id);
        }

        protocol.active().detach(&mut session);
        server.metrics.connection_closed();
        result
    }
}

async fn serve<S>(
    mut io: S,
    session: &mut Session,
    protocol: &mut ProtocolState<Session>,
    outbound: &mut mpsc::Receiver<Outbound>,
    read_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut read_buf = BytesMut::with_capacity(INITIAL_READ_CAPACITY);
    let read = timeout(read_timeout, io.read_buf(&mut read_buf))
        .await
        .map_err(|_| ProtocolError::Timeout(read_timeout))??;

    if read == 0 {
        return Ok(());
    }

    if is_legacy_ping(read_buf[0]) {
        tracing::debug!("Connection {} sent a legacy ping", session.id());
        let reply = session.server().legacy_status().encode();
        io.write_all(&reply).await?;
        io.shutdown().await?;
        return Ok(());
    }

    let mut parts = FramedParts::new::<Bytes>(ReadActivity::new(io), PacketCodec::new());
    parts.read_buf = read_buf;
    let mut framed = Framed::from_parts(parts);

    let idle = sleep(read_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => {
                // Bytes of a partial frame count as activity
                let deadline = framed.get_ref().last_read() + read_timeout;
                if deadline <= Instant::now() {
                    return Err(ProtocolError::Timeout(read_timeout));
                }
                idle.as_mut().reset(deadline);
            }

            inbound = framed.next() => {
                let Some(payload) = inbound else {
                    return Ok(());
                };

                session.server().metrics.packet_received();
                protocol.dispatch(session, payload?)?;

                if !apply_actions(&mut framed, protocol, session).await? {
                    SinkExt::<Bytes>::close(&mut framed).await?;
                    return Ok(());
                }
            }

            Some(message) = outbound.recv() => {
                match message {
                    Outbound::Packet(packet) => {
                        framed.send(packet).await?;
                        session.server().metrics.packet_sent();
                    }
                    Outbound::Disconnect => {
                        SinkExt::<Bytes>::close(&mut framed).await?;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Apply queued session actions in order, then flush
///
/// Returns `false` if a handler asked to disconnect.
async fn apply_actions<S>(
    framed: &mut Framed<S, PacketCodec>,
    protocol: &mut ProtocolState<Session>,
    session: &mut Session,
) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut open = true;

    // Attach hooks run during a transition may queue more actions
    while open && session.has_pending_actions() {
        for action in session.take_actions() {
            match action {
                SessionAction::Send(packet) => {
                    framed.feed(packet).await?;
                    session.server().metrics.packet_sent();
                }
                SessionAction::EnableCompression { threshold, level } => {
                    framed.codec_mut().enable_compression(threshold, level);
                }
                SessionAction::EnableEncryption(secret) => {
                    framed.codec_mut().enable_encryption(&secret);
                }
                SessionAction::Transition(next) => {
                    protocol.transition(session, next)?;
                    session.set_state(next);
                }
                SessionAction::Disconnect => {
                    open = false;
                    break;
                }
            }
        }
    }

    SinkExt::<Bytes>::flush(framed).await?;
    Ok(open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::handlers::default_registries;
    use cobble_protocol::packets::{
        EncryptionRequest, EncryptionResponse, Handshake, KeepAlive, LoginStart, LoginSuccess,
        PingRequest, PongResponse, ServerStatus, SetCompression, StatusRequest, StatusResponse,
    };
    use cobble_protocol::{ConnectionState, DEFAULT_COMPRESSION_LEVEL};
    use rsa::pkcs8::DecodePublicKey;
    use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use tokio_util::codec::Encoder;

    type Client = Framed<DuplexStream, PacketCodec>;

    fn context(config: ServerConfig) -> Arc<ServerContext> {
        Arc::new(ServerContext::new(config).unwrap())
    }

    fn offline() -> ServerConfig {
        ServerConfig {
            online_mode: false,
            compression_threshold: None,
            ..Default::default()
        }
    }

    fn spawn_connection(
        server: Arc<ServerContext>,
    ) -> (Client, ConnectionHandle, JoinHandle<Result<()>>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (connection, handle) = Connection::new(
            server_io,
            ConnectionId::new(1),
            None,
            server,
            Arc::new(default_registries()),
        );
        let task = tokio::spawn(connection.run());
        (Framed::new(client_io, PacketCodec::new()), handle, task)
    }

    fn handshake(next_state: ConnectionState) -> Bytes {
        Handshake {
            protocol_version: 767,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state,
        }
        .encode()
    }

    async fn receive<P: Packet>(client: &mut Client) -> P {
        let payload = client.next().await.unwrap().unwrap();
        let raw = RawPacket::decode(payload).unwrap();
        assert_eq!(raw.id, P::ID, "unexpected packet id");
        let mut body = raw.body;
        P::read(&mut body).unwrap()
    }

    #[tokio::test]
    async fn test_status_ping() {
        let (mut client, _handle, task) = spawn_connection(context(offline()));

        client.send(handshake(ConnectionState::Status)).await.unwrap();
        client.send(StatusRequest.encode()).await.unwrap();

        let response: StatusResponse = receive(&mut client).await;
        let status = ServerStatus::from_json(&response.json).unwrap();
        assert_eq!(status.players.max, 20);
        assert_eq!(status.version.protocol, 767);

        client.send(PingRequest { payload: 1234 }.encode()).await.unwrap();
        let pong: PongResponse = receive(&mut client).await;
        assert_eq!(pong.payload, 1234);

        // The server closes after the pong
        assert!(client.next().await.is_none());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_encrypted_compressed_login() {
        let server = context(ServerConfig {
            online_mode: true,
            compression_threshold: Some(64),
            ..Default::default()
        });
        let (mut client, _handle, task) = spawn_connection(Arc::clone(&server));

        client.send(handshake(ConnectionState::Login)).await.unwrap();
        client
            .send(
                LoginStart {
                    username: "Steve".into(),
                    uuid: None,
                }
                .encode(),
            )
            .await
            .unwrap();

        let request: EncryptionRequest = receive(&mut client).await;
        let public_key = RsaPublicKey::from_public_key_der(&request.public_key).unwrap();
        let secret = [0x42u8; 16];
        let mut rng = rand::thread_rng();
        let response = EncryptionResponse {
            shared_secret: public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, &secret)
                .unwrap()
                .into(),
            verify_token: public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, &request.verify_token)
                .unwrap()
                .into(),
        };
        client.send(response.encode()).await.unwrap();
        client.codec_mut().enable_encryption(&secret);

        let compression: SetCompression = receive(&mut client).await;
        assert_eq!(compression.threshold, 64);
        client
            .codec_mut()
            .enable_compression(compression.threshold as usize, DEFAULT_COMPRESSION_LEVEL);

        let success: LoginSuccess = receive(&mut client).await;
        assert_eq!(success.username, "Steve");
        assert_eq!(server.metrics.players_online(), 1);

        // PLAY packets resolve against the PLAY registry, through both layers
        client.send(KeepAlive { id: 9 }.encode()).await.unwrap();
        drop(client);

        assert!(task.await.unwrap().is_ok());
        assert_eq!(server.metrics.players_online(), 0);
    }

    #[tokio::test]
    async fn test_wrong_verify_token_closes() {
        let server = context(ServerConfig {
            online_mode: true,
            ..Default::default()
        });
        let (mut client, _handle, task) = spawn_connection(server);

        client.send(handshake(ConnectionState::Login)).await.unwrap();
        client
            .send(
                LoginStart {
                    username: "Mallory".into(),
                    uuid: None,
                }
                .encode(),
            )
            .await
            .unwrap();

        let request: EncryptionRequest = receive(&mut client).await;
        let public_key = RsaPublicKey::from_public_key_der(&request.public_key).unwrap();
        let mut rng = rand::thread_rng();
        let wrong_token: Vec<u8> = request.verify_token.iter().map(|b| b ^ 0xFF).collect();
        let response = EncryptionResponse {
            shared_secret: public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, &[1u8; 16])
                .unwrap()
                .into(),
            verify_token: public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, &wrong_token)
                .unwrap()
                .into(),
        };
        client.send(response.encode()).await.unwrap();

        let Err(ProtocolError::Handler { source, .. }) = task.await.unwrap() else {
            panic!("expected a handler error");
        };
        assert!(matches!(*source, ProtocolError::VerifyTokenMismatch));
    }

    #[tokio::test]
    async fn test_unknown_packet_closes() {
        let server = context(offline());
        let (mut client, _handle, task) = spawn_connection(Arc::clone(&server));

        client.send(handshake(ConnectionState::Status)).await.unwrap();
        client
            .send(RawPacket::new(0x42, Bytes::new()).encode())
            .await
            .unwrap();

        assert!(client.next().await.is_none());
        assert!(matches!(
            task.await.unwrap(),
            Err(ProtocolError::UnknownPacketId { state: "STATUS", id: 0x42 })
        ));
        assert_eq!(server.metrics.snapshot().protocol_errors, 1);
    }

    #[tokio::test]
    async fn test_legacy_ping() {
        let (mut client_io, server_io) = tokio::io::duplex(1024);
        let (connection, _handle) = Connection::new(
            server_io,
            ConnectionId::new(1),
            None,
            context(offline()),
            Arc::new(default_registries()),
        );
        let task = tokio::spawn(connection.run());

        client_io.write_all(&[0xFE, 0x01]).await.unwrap();
        let mut reply = Vec::new();
        client_io.read_to_end(&mut reply).await.unwrap();

        assert_eq!(reply[0], 0xFF);
        let units = u16::from_be_bytes([reply[1], reply[2]]) as usize;
        assert_eq!(reply.len(), 3 + units * 2);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_handle_send_and_disconnect() {
        let (mut client, handle, task) = spawn_connection(context(offline()));
        client.send(handshake(ConnectionState::Status)).await.unwrap();

        handle
            .send(&StatusResponse {
                json: "{}".into(),
            })
            .unwrap();
        let pushed: StatusResponse = receive(&mut client).await;
        assert_eq!(pushed.json, "{}");

        handle.disconnect().unwrap();
        assert!(client.next().await.is_none());
        assert!(task.await.unwrap().is_ok());
        assert!(handle.is_closed());
        assert!(handle.send(&PingRequest { payload: 0 }).is_err());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let server = context(ServerConfig {
            read_timeout: Duration::from_millis(50),
            ..offline()
        });
        let (mut client, _handle, task) = spawn_connection(server);
        client.send(handshake(ConnectionState::Status)).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ProtocolError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_slow_frame_is_not_idle() {
        let server = context(ServerConfig {
            read_timeout: Duration::from_millis(100),
            ..offline()
        });
        let (mut client, _handle, task) = spawn_connection(server);
        client.send(handshake(ConnectionState::Status)).await.unwrap();

        // A ten-byte frame trickled in over four timeout windows
        let mut wire = BytesMut::new();
        PacketCodec::new()
            .encode(PingRequest { payload: 77 }.encode(), &mut wire)
            .unwrap();
        for byte in wire.iter() {
            sleep(Duration::from_millis(40)).await;
            client.get_mut().write_all(&[*byte]).await.unwrap();
        }

        let pong: PongResponse = receive(&mut client).await;
        assert_eq!(pong.payload, 77);
        assert!(task.await.unwrap().is_ok());
    }
}
