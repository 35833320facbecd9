//! STATUS state packets and the server list JSON document

use bytes::{BufMut, Bytes, BytesMut};
use cobble_core::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

use crate::codecs::{read_i64, read_string, write_string};
use crate::packet::Packet;

/// Longest status JSON accepted
pub const MAX_STATUS_JSON_LEN: usize = 32_767;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRequest;

impl Packet for StatusRequest {
    const ID: u32 = 0x00;

    fn read(_buf: &mut Bytes) -> Result<Self> {
        Ok(Self)
    }

    fn write(&self, _buf: &mut BytesMut) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub json: String,
}

impl Packet for StatusResponse {
    const ID: u32 = 0x00;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            json: read_string(buf, MAX_STATUS_JSON_LEN)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        write_string(buf, &self.json);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub payload: i64,
}

impl Packet for PingRequest {
    const ID: u32 = 0x01;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            payload: read_i64(buf)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_i64(self.payload);
    }
}

/// Echo of a [`PingRequest`] payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongResponse {
    pub payload: i64,
}

impl Packet for PongResponse {
    const ID: u32 = 0x01;

    fn read(buf: &mut Bytes) -> Result<Self> {
        Ok(Self {
            payload: read_i64(buf)?,
        })
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_i64(self.payload);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: usize,
    pub online: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDescription {
    pub text: String,
}

/// Document carried by [`StatusResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: StatusDescription,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub favicon: Option<String>,
}

impl ServerStatus {
    pub fn new(
        version_name: impl Into<String>,
        protocol: i32,
        online: usize,
        max: usize,
        motd: impl Into<String>,
    ) -> Self {
        Self {
            version: StatusVersion {
                name: version_name.into(),
                protocol,
            },
            players: StatusPlayers { max, online },
            description: StatusDescription { text: motd.into() },
            favicon: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::InvalidData(format!("Status serialization failed: {}", e)))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ProtocolError::InvalidData(format!("Malformed status JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_shape() {
        let status = ServerStatus::new("1.21", 767, 3, 20, "A Cobble server");
        let value: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();

        assert_eq!(value["version"]["name"], "1.21");
        assert_eq!(value["version"]["protocol"], 767);
        assert_eq!(value["players"]["online"], 3);
        assert_eq!(value["players"]["max"], 20);
        assert_eq!(value["description"]["text"], "A Cobble server");
        assert!(value.get("favicon").is_none());

        assert_eq!(ServerStatus::from_json(&status.to_json().unwrap()).unwrap(), status);
    }

    #[test]
    fn test_ping_is_big_endian() {
        let encoded = PingRequest { payload: 0x0102_0304_0506_0708 }.encode();
        assert_eq!(&encoded[..], &[0x01, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_truncated_ping_rejected() {
        let mut body = Bytes::from_static(&[0, 0, 0]);
        assert!(matches!(
            PingRequest::read(&mut body),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
