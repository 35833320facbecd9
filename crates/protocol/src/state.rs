//! Connection states and the per-connection state machine
//!
//! ```text
//! HANDSHAKING ──▶ STATUS
//!      │
//!      └────────▶ LOGIN ──▶ PLAY
//! ```
//!
//! Each state owns one [`PacketRegistry`]; switching state swaps the active
//! registry, so packet IDs always resolve against the current state only.

use bytes::Bytes;
use cobble_core::{ProtocolError, Result};
use std::fmt;
use std::sync::Arc;

use crate::registry::{Dispatched, PacketRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshaking,
    Status,
    Login,
    Play,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 4] = [
        ConnectionState::Handshaking,
        ConnectionState::Status,
        ConnectionState::Login,
        ConnectionState::Play,
    ];

    /// Protocol ID of the state
    pub const fn id(self) -> i32 {
        match self {
            Self::Handshaking => -1,
            Self::Play => 0,
            Self::Status => 1,
            Self::Login => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.id() == id)
    }

    /// Resolve the `next_state` field of a handshake.
    ///
    /// Only STATUS and LOGIN may be requested.
    pub fn from_handshake(next_state: i32) -> Result<Self> {
        match Self::from_id(next_state) {
            Some(state @ (Self::Status | Self::Login)) => Ok(state),
            _ => Err(ProtocolError::InvalidNextState(next_state)),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Handshaking => "HANDSHAKING",
            Self::Status => "STATUS",
            Self::Login => "LOGIN",
            Self::Play => "PLAY",
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Handshaking, Self::Status)
                | (Self::Handshaking, Self::Login)
                | (Self::Login, Self::Play)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One registry per connection state, shared by every connection
pub struct StateRegistries<C> {
    handshaking: Arc<PacketRegistry<C>>,
    status: Arc<PacketRegistry<C>>,
    login: Arc<PacketRegistry<C>>,
    play: Arc<PacketRegistry<C>>,
}

impl<C> StateRegistries<C> {
    pub fn new(
        handshaking: PacketRegistry<C>,
        status: PacketRegistry<C>,
        login: PacketRegistry<C>,
        play: PacketRegistry<C>,
    ) -> Self {
        Self {
            handshaking: Arc::new(handshaking),
            status: Arc::new(status),
            login: Arc::new(login),
            play: Arc::new(play),
        }
    }

    pub fn get(&self, state: ConnectionState) -> &Arc<PacketRegistry<C>> {
        match state {
            ConnectionState::Handshaking => &self.handshaking,
            ConnectionState::Status => &self.status,
            ConnectionState::Login => &self.login,
            ConnectionState::Play => &self.play,
        }
    }
}

impl<C> fmt::Debug for StateRegistries<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistries")
            .field("handshaking", &self.handshaking)
            .field("status", &self.status)
            .field("login", &self.login)
            .field("play", &self.play)
            .finish()
    }
}

/// Current state of one connection and its active registry
pub struct ProtocolState<C> {
    state: ConnectionState,
    registries: Arc<StateRegistries<C>>,
    active: Arc<PacketRegistry<C>>,
}

impl<C: 'static> ProtocolState<C> {
    /// Start in HANDSHAKING
    pub fn new(registries: Arc<StateRegistries<C>>) -> Self {
        let active = Arc::clone(registries.get(ConnectionState::Handshaking));
        Self {
            state: ConnectionState::Handshaking,
            registries,
            active,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn active(&self) -> &PacketRegistry<C> {
        &self.active
    }

    /// Dispatch a frame payload against the current state's registry
    pub fn dispatch(&self, ctx: &mut C, payload: Bytes) -> Result<Dispatched> {
        self.active.dispatch(ctx, payload)
    }

    /// Switch to `next`.
    ///
    /// The new registry's attach hook runs before the old registry's detach
    /// hook. Packets decoded after this call resolve against `next`.
    ///
    /// # Errors
    /// Returns `InvalidTransition` for anything other than
    /// HANDSHAKING → STATUS, HANDSHAKING → LOGIN or LOGIN → PLAY.
    pub fn transition(&mut self, ctx: &mut C, next: ConnectionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ProtocolError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }

        let previous = std::mem::replace(&mut self.active, Arc::clone(self.registries.get(next)));
        tracing::trace!("State {} -> {}", self.state, next);
        self.state = next;

        self.active.attach(ctx);
        previous.detach(ctx);
        Ok(())
    }
}

impl<C> fmt::Debug for ProtocolState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolState")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
