//! # Session
//!
//! Per-connection context handed to every packet handler.
//!
//! Handlers are synchronous: they never touch the socket or the codec.
//! Instead they queue [`SessionAction`]s, which the connection task applies
//! in order once the handler returns. Ordering is what makes login work:
//!
//! ```text
//! EnableEncryption → Send(SetCompression) → EnableCompression
//!                  → Send(LoginSuccess) → Transition(PLAY)
//! ```
//!
//! SetCompression goes out encrypted but uncompressed; LoginSuccess goes
//! out encrypted and compressed.

use bytes::Bytes;
use cobble_core::{ConnectionId, Result};
use cobble_protocol::packets::{Disconnect, LoginDisconnect, ServerStatus};
use cobble_protocol::{ConnectionState, LegacyStatus, Packet, RawPacket, SHARED_SECRET_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{generate_verify_token, ServerKeyPair, VERIFY_TOKEN_LEN};
use crate::config::ServerConfig;
use crate::stats::ServerMetrics;

/// State shared by every connection of one server
#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    /// Present in online mode
    pub keys: Option<ServerKeyPair>,
    pub metrics: ServerMetrics,
}

impl ServerContext {
    /// Build the shared context, generating the RSA keypair in online mode
    pub fn new(config: ServerConfig) -> Result<Self> {
        let keys = if config.online_mode {
            tracing::debug!("Generating server keypair");
            Some(ServerKeyPair::generate()?)
        } else {
            None
        };

        Ok(Self {
            config,
            keys,
            metrics: ServerMetrics::new(),
        })
    }

    /// Server list document for the status handler
    pub fn status(&self) -> ServerStatus {
        ServerStatus::new(
            self.config.version_name.clone(),
            self.config.protocol_version,
            self.metrics.players_online(),
            self.config.max_players,
            self.config.motd.clone(),
        )
    }

    pub fn legacy_status(&self) -> LegacyStatus {
        LegacyStatus {
            protocol: self.config.protocol_version,
            version: self.config.version_name.clone(),
            motd: self.config.motd.clone(),
            online: self.metrics.players_online(),
            max: self.config.max_players,
        }
    }
}

/// Work queued by a handler for the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Encoded packet (ID + body) to write
    Send(Bytes),
    EnableCompression { threshold: usize, level: u32 },
    EnableEncryption([u8; SHARED_SECRET_LEN]),
    Transition(ConnectionState),
    /// Flush what was queued so far, then close
    Disconnect,
}

pub struct Session {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    state: ConnectionState,
    server: Arc<ServerContext>,

    protocol_version: Option<i32>,
    username: Option<String>,
    uuid: Option<Uuid>,
    verify_token: Option<[u8; VERIFY_TOKEN_LEN]>,

    actions: Vec<SessionAction>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("username", &self.username)
            .field("pending_actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        server: Arc<ServerContext>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            state: ConnectionState::Handshaking,
            server,
            protocol_version: None,
            username: None,
            uuid: None,
            verify_token: None,
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// State the connection is in; updated when a transition is applied
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn server(&self) -> &Arc<ServerContext> {
        &self.server
    }

    //=== Outbound ===//

    /// Queue a packet
    pub fn send<P: Packet>(&mut self, packet: &P) {
        self.actions.push(SessionAction::Send(packet.encode()));
    }

    /// Queue a packet whose body is already encoded
    pub fn write_raw(&mut self, packet: &RawPacket) {
        self.actions.push(SessionAction::Send(packet.encode()));
    }

    /// Queue a switch to `next`. Validity is checked when it is applied.
    pub fn request_transition(&mut self, next: ConnectionState) {
        self.actions.push(SessionAction::Transition(next));
    }

    pub fn enable_compression(&mut self, threshold: usize, level: u32) {
        self.actions
            .push(SessionAction::EnableCompression { threshold, level });
    }

    pub fn enable_encryption(&mut self, shared_secret: [u8; SHARED_SECRET_LEN]) {
        self.actions.push(SessionAction::EnableEncryption(shared_secret));
    }

    /// Close the connection after the packets queued so far are written
    pub fn disconnect(&mut self) {
        self.actions.push(SessionAction::Disconnect);
    }

    /// Send a disconnect packet suited to the current state, then close
    ///
    /// LOGIN and PLAY carry a JSON text reason; other states just close.
    pub fn disconnect_with(&mut self, reason: &str) {
        let text = serde_json::json!({ "text": reason }).to_string();
        match self.state {
            ConnectionState::Login => self.send(&LoginDisconnect { reason: text }),
            ConnectionState::Play => self.send(&Disconnect { reason: text }),
            ConnectionState::Handshaking | ConnectionState::Status => {}
        }
        self.disconnect();
    }

    pub fn has_pending_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn take_actions(&mut self) -> Vec<SessionAction> {
        std::mem::take(&mut self.actions)
    }

    //=== Login ===//

    /// Protocol version announced in the handshake
    pub fn protocol_version(&self) -> Option<i32> {
        self.protocol_version
    }

    pub fn set_protocol_version(&mut self, version: i32) {
        self.protocol_version = Some(version);
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn set_profile(&mut self, username: String, uuid: Option<Uuid>) {
        self.username = Some(username);
        self.uuid = uuid;
    }

    /// Issue a fresh verify token for this connection's key exchange
    pub fn issue_verify_token(&mut self) -> [u8; VERIFY_TOKEN_LEN] {
        let token = generate_verify_token();
        self.verify_token = Some(token);
        token
    }

    /// Consume the issued token; `None` if no key exchange is in progress
    pub fn take_verify_token(&mut self) -> Option<[u8; VERIFY_TOKEN_LEN]> {
        self.verify_token.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobble_protocol::packets::PongResponse;

    fn offline_context() -> Arc<ServerContext> {
        let config = ServerConfig {
            online_mode: false,
            ..Default::default()
        };
        Arc::new(ServerContext::new(config).unwrap())
    }

    #[test]
    fn test_actions_keep_order() {
        let mut session = Session::new(ConnectionId::new(1), None, offline_context());
        session.enable_encryption([1; SHARED_SECRET_LEN]);
        session.send(&PongResponse { payload: 5 });
        session.enable_compression(256, 6);
        session.write_raw(&RawPacket::new(0x02, Bytes::from_static(b"x")));
        session.request_transition(ConnectionState::Play);

        let actions = session.take_actions();
        assert_eq!(
            actions,
            vec![
                SessionAction::EnableEncryption([1; SHARED_SECRET_LEN]),
                SessionAction::Send(PongResponse { payload: 5 }.encode()),
                SessionAction::EnableCompression {
                    threshold: 256,
                    level: 6
                },
                SessionAction::Send(Bytes::from_static(&[0x02, b'x'])),
                SessionAction::Transition(ConnectionState::Play),
            ]
        );
        assert!(!session.has_pending_actions());
    }

    #[test]
    fn test_disconnect_with_reason_per_state() {
        let mut session = Session::new(ConnectionId::new(1), None, offline_context());
        session.disconnect_with("bye");
        assert_eq!(session.take_actions(), vec![SessionAction::Disconnect]);

        session.set_state(ConnectionState::Login);
        session.disconnect_with("bye");
        let actions = session.take_actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            SessionAction::Send(
                LoginDisconnect {
                    reason: "{\"text\":\"bye\"}".into()
                }
                .encode()
            )
        );
    }

    #[test]
    fn test_verify_token_is_single_use() {
        let mut session = Session::new(ConnectionId::new(1), None, offline_context());
        assert!(session.take_verify_token().is_none());

        let token = session.issue_verify_token();
        assert_eq!(session.take_verify_token(), Some(token));
        assert!(session.take_verify_token().is_none());
    }

    #[test]
    fn test_status_document() {
        let context = offline_context();
        let status = context.status();
        assert_eq!(status.players.max, 20);
        assert_eq!(status.players.online, 0);
        assert_eq!(status.description.text, context.config.motd);
        assert!(context.keys.is_none());
    }
}
