//! LOGIN state packets

use bytes::{Bytes, BytesMut};
use cobble_core::Result;
use uuid::Uuid;

use crate::codecs::{
    read_byte_array, read_option, read_string, read_uuid, read_var_u32, write_byte_array,
    write_option, write_string, write_uuid, write_var_u32,
};
use crate::packet::Packet;

use super::MAX_CHAT_LEN;

pub const MAX_USERNAME_LEN: usize = 16;

/// Upper bound on RSA-encrypted fields; a 1024-bit key yields 128 bytes
pub const MAX_ENCRYPTED_LEN: usize = 256;

const MAX_SERVER_ID_LEN: usize = 20;
const MAX_PUBLIC_KEY_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub username: String,
    pub uuid: Option<Uuid>,
}

impl Packet for LoginStart {
    const ID: u32 = 0x00;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            username: read_string(buf, MAX_USERNAME_LEN)?,
            uuid: read_option(buf, read_uuid)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_string(buf, &self.username);
        write_option(buf, self.uuid.as_ref(), write_uuid);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    pub server_id: String,
    /// DER-encoded SubjectPublicKeyInfo
    pub public_key: Bytes,
    pub verify_token: Bytes,
}

impl Packet for EncryptionRequest {
    const ID: u32 = 0x01;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            server_id: read_string(buf, MAX_SERVER_ID_LEN)?,
            public_key: read_byte_array(buf, MAX_PUBLIC_KEY_LEN)?,
            verify_token: read_byte_array(buf, MAX_ENCRYPTED_LEN)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_string(buf, &self.server_id);
        write_byte_array(buf, &self.public_key);
        write_byte_array(buf, &self.verify_token);
    }
}

/// Shared secret and verify token, both encrypted with the server's public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResponse {
    pub shared_secret: Bytes,
    pub verify_token: Bytes,
}

impl Packet for EncryptionResponse {
    const ID: u32 = 0x01;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            shared_secret: read_byte_array(buf, MAX_ENCRYPTED_LEN)?,
            verify_token: read_byte_array(buf, MAX_ENCRYPTED_LEN)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_byte_array(buf, &self.shared_secret);
        write_byte_array(buf, &self.verify_token);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDisconnect {
    pub reason: String,
}

impl Packet for LoginDisconnect {
    const ID: u32 = 0x00;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            reason: read_string(buf, MAX_CHAT_LEN)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_string(buf, &self.reason);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub uuid: Uuid,
    pub username: String,
}

impl Packet for LoginSuccess {
    const ID: u32 = 0x02;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            uuid: read_uuid(buf)?,
            username: read_string(buf, MAX_USERNAME_LEN)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_uuid(buf, &self.uuid);
        write_string(buf, &self.username);
    }
}

/// Announces the compression threshold; every later packet uses envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    pub threshold: u32,
}

impl Packet for SetCompression {
    const ID: u32 = 0x03;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            threshold: read_var_u32(buf)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_var_u32(buf, self.threshold);
    }
}
