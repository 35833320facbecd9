//! Built-in packet vocabulary
//!
//! Only the packets the transport needs to get a client from the handshake
//! into PLAY are defined here. Gameplay packets are registered by the
//! embedding application.
//!
//! | State       | Direction | ID   | Packet                |
//! |-------------|-----------|------|-----------------------|
//! | HANDSHAKING | in        | 0x00 | [`Handshake`]         |
//! | STATUS      | in        | 0x00 | [`StatusRequest`]     |
//! | STATUS      | in        | 0x01 | [`PingRequest`]       |
//! | STATUS      | out       | 0x00 | [`StatusResponse`]    |
//! | STATUS      | out       | 0x01 | [`PongResponse`]      |
//! | LOGIN       | in        | 0x00 | [`LoginStart`]        |
//! | LOGIN       | in        | 0x01 | [`EncryptionResponse`]|
//! | LOGIN       | out       | 0x00 | [`LoginDisconnect`]   |
//! | LOGIN       | out       | 0x01 | [`EncryptionRequest`] |
//! | LOGIN       | out       | 0x02 | [`LoginSuccess`]      |
//! | LOGIN       | out       | 0x03 | [`SetCompression`]    |
//! | PLAY        | both      | 0x00 | [`KeepAlive`]         |
//! | PLAY        | out       | 0x01 | [`Disconnect`]        |

mod handshake;
mod login;
mod play;
mod status;

pub use handshake::Handshake;
pub use login::{
    EncryptionRequest, EncryptionResponse, LoginDisconnect, LoginStart, LoginSuccess,
    SetCompression,
};
pub use play::{Disconnect, KeepAlive};
pub use status::{
    PingRequest, PongResponse, ServerStatus, StatusDescription, StatusPlayers, StatusRequest,
    StatusResponse, StatusVersion,
};

/// Longest JSON text component accepted in a disconnect reason
pub const MAX_CHAT_LEN: usize = 262_144;
