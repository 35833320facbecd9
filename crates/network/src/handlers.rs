//! # Default Packet Handlers
//!
//! Builds the registries that take a client from the handshake into PLAY.
//!
//! # Flows
//!
//! ```text
//! HANDSHAKING  Handshake            → remember protocol version, switch to next_state
//! STATUS       StatusRequest        → StatusResponse (JSON)
//!              PingRequest          → PongResponse, close
//! LOGIN        LoginStart           → online:  EncryptionRequest
//!                                     offline: finish login
//!              EncryptionResponse   → check token, enable encryption, finish login
//!              (finish login)       → [SetCompression, enable compression],
//!                                     LoginSuccess, switch to PLAY
//! PLAY         KeepAlive            → noted
//! ```
//!
//! The PLAY registry is returned as a builder from [`play_registry`] so the
//! embedding application can add its own packets before building.
//!
//! # Example
//!
//! ```no_run
//! use cobble_network::handlers;
//! use cobble_protocol::packets::KeepAlive;
//!
//! let play = handlers::play_registry()
//!     .add_packet_with::<KeepAlive, _>(|session, packet| {
//!         tracing::info!("{} answered keep-alive {}", session.id(), packet.id);
//!         Ok(())
//!     });
//! let registries = handlers::registries_with_play(play);
//! ```

use bytes::Bytes;
use cobble_core::{ProtocolError, Result};
use cobble_protocol::packets::{
    EncryptionRequest, EncryptionResponse, Handshake, KeepAlive, LoginStart, LoginSuccess,
    PingRequest, PongResponse, SetCompression, StatusRequest, StatusResponse,
};
use cobble_protocol::{ConnectionState, PacketRegistry, PacketRegistryBuilder, StateRegistries};
use uuid::Uuid;

use crate::session::Session;

/// All four default registries
pub fn default_registries() -> StateRegistries<Session> {
    registries_with_play(play_registry())
}

/// Default HANDSHAKING, STATUS and LOGIN registries with a custom PLAY registry
pub fn registries_with_play(play: PacketRegistryBuilder<Session>) -> StateRegistries<Session> {
    StateRegistries::new(
        handshake_registry(),
        status_registry(),
        login_registry(),
        play.build(),
    )
}

pub fn handshake_registry() -> PacketRegistry<Session> {
    PacketRegistry::<Session>::builder(ConnectionState::Handshaking.name())
        .add_packet_with::<Handshake, _>(handle_handshake)
        .build()
}

pub fn status_registry() -> PacketRegistry<Session> {
    PacketRegistry::<Session>::builder(ConnectionState::Status.name())
        .add_packet_with::<StatusRequest, _>(handle_status_request)
        .add_packet_with::<PingRequest, _>(handle_ping)
        .build()
}

pub fn login_registry() -> PacketRegistry<Session> {
    PacketRegistry::<Session>::builder(ConnectionState::Login.name())
        .add_packet_with::<LoginStart, _>(handle_login_start)
        .add_packet_with::<EncryptionResponse, _>(handle_encryption_response)
        .build()
}

/// PLAY registry builder with the transport-level packets registered
pub fn play_registry() -> PacketRegistryBuilder<Session> {
    PacketRegistry::<Session>::builder(ConnectionState::Play.name())
        .add_packet_with::<KeepAlive, _>(|session, packet| {
            tracing::trace!("{} keep-alive {}", session.id(), packet.id);
            Ok(())
        })
        .on_attach(|session| {
            session.server().metrics.player_joined();
            tracing::info!(
                "{} joined as {}",
                session.id(),
                session.username().unwrap_or("<unknown>")
            );
        })
        .on_detach(|session| {
            session.server().metrics.player_left();
            tracing::info!("{} left", session.id());
        })
}

fn handle_handshake(session: &mut Session, packet: Handshake) -> Result<()> {
    tracing::debug!(
        "{} handshake: protocol {}, address {}:{}, next {}",
        session.id(),
        packet.protocol_version,
        packet.server_address,
        packet.server_port,
        packet.next_state
    );

    session.set_protocol_version(packet.protocol_version);
    session.request_transition(packet.next_state);
    Ok(())
}

fn handle_status_request(session: &mut Session, _packet: StatusRequest) -> Result<()> {
    let json = session.server().status().to_json()?;
    session.send(&StatusResponse { json });
    Ok(())
}

fn handle_ping(session: &mut Session, packet: PingRequest) -> Result<()> {
    session.send(&PongResponse {
        payload: packet.payload,
    });
    session.disconnect();
    Ok(())
}

fn handle_login_start(session: &mut Session, packet: LoginStart) -> Result<()> {
    if session.username().is_some() {
        return Err(ProtocolError::InvalidData("Duplicate login start".to_string()));
    }
    if packet.username.is_empty() {
        return Err(ProtocolError::InvalidData("Empty username".to_string()));
    }

    tracing::debug!("{} login start: {}", session.id(), packet.username);
    session.set_profile(packet.username, packet.uuid);

    let public_key = session.server().keys.as_ref().map(|keys| keys.public_key_der());
    match public_key {
        Some(public_key) => {
            let verify_token = session.issue_verify_token();
            session.send(&EncryptionRequest {
                server_id: String::new(),
                public_key,
                verify_token: Bytes::copy_from_slice(&verify_token),
            });
        }
        None => finish_login(session),
    }

    Ok(())
}

fn handle_encryption_response(session: &mut Session, packet: EncryptionResponse) -> Result<()> {
    let expected = session.take_verify_token().ok_or_else(|| {
        ProtocolError::InvalidData("Encryption response without a pending request".to_string())
    })?;

    let server = session.server().clone();
    let keys = server
        .keys
        .as_ref()
        .ok_or_else(|| ProtocolError::Crypto("No server keypair".to_string()))?;

    let shared_secret =
        keys.decrypt_response(&packet.shared_secret, &packet.verify_token, &expected)?;

    tracing::debug!("{} encryption enabled", session.id());
    session.enable_encryption(shared_secret);
    finish_login(session);
    Ok(())
}

fn finish_login(session: &mut Session) {
    let config = &session.server().config;
    let compression = config
        .compression_threshold
        .map(|threshold| (threshold, config.compression_level));

    if let Some((threshold, level)) = compression {
        session.send(&SetCompression {
            threshold: threshold as u32,
        });
        session.enable_compression(threshold, level);
    }

    // Without an identity service the client-supplied UUID is trusted;
    // clients that send none get a random one
    let uuid = session.uuid().unwrap_or_else(Uuid::new_v4);
    let username = session.username().unwrap_or_default().to_string();
    session.set_profile(username.clone(), Some(uuid));

    session.send(&LoginSuccess { uuid, username });
    session.request_transition(ConnectionState::Play);
}
