use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{BridgeError, ErrorKind};

/// Header size: 1 (type) + 4 (length) + 4 (request_id) = 9 bytes
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (96 MB), enough for a base64'd 50 MB preview plus envelope
pub const MAX_PAYLOAD_SIZE: usize = 96 * 1024 * 1024;

// --- Message Types ---

// Connection
pub const AUTH: u8 = 0x01;
pub const AUTH_RESULT: u8 = 0x02;
pub const HEARTBEAT: u8 = 0x03;
pub const HEARTBEAT_ACK: u8 = 0x04;

// Bridge requests (UI -> host)
pub const OPEN_FOLDER: u8 = 0x10;
pub const LIST_CHILDREN: u8 = 0x11;
pub const HOME_DIR: u8 = 0x12;
pub const RESOLVE_PATH: u8 = 0x13;
pub const RUN_COMMAND: u8 = 0x14;
pub const READ_FILE: u8 = 0x15;
pub const GET_ASSET: u8 = 0x16;

// Bridge replies (host -> UI), one per request, same request_id
pub const REPLY: u8 = 0x20;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload too large: {size} bytes (max {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge { size: usize },
    #[error("invalid message type: 0x{0:02x}")]
    InvalidType(u8),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: u8,
    pub length: u32,
    pub request_id: u32,
}

/// A decoded protocol message
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: u8, request_id: u32, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                msg_type,
                length: payload.len() as u32,
                request_id,
            },
            payload,
        }
    }

    /// Create a message with JSON payload
    pub fn json<T: Serialize>(msg_type: u8, request_id: u32, data: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(data)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
            });
        }
        Ok(Self::new(msg_type, request_id, payload))
    }

    /// Parse the payload as JSON
    pub fn parse_json<'a, T: Deserialize<'a>>(&'a self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Encode this message into bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.header.msg_type);
        buf.put_u32_le(self.header.length);
        buf.put_u32_le(self.header.request_id);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Encode into an existing BytesMut buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.header.msg_type);
        buf.put_u32_le(self.header.length);
        buf.put_u32_le(self.header.request_id);
        buf.extend_from_slice(&self.payload);
    }

    /// Decode a message from bytes. Returns None if not enough data.
    pub fn decode(buf: &[u8]) -> Result<Option<(Message, usize)>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut cursor = buf;
        let msg_type = cursor.get_u8();
        let length = cursor.get_u32_le();
        let request_id = cursor.get_u32_le();

        // Reject before buffering a huge frame
        let payload_len = length as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size: payload_len });
        }

        let total_len = HEADER_SIZE + payload_len;
        if buf.len() < total_len {
            return Ok(None);
        }

        let payload = buf[HEADER_SIZE..total_len].to_vec();

        let msg = Message {
            header: Header {
                msg_type,
                length,
                request_id,
            },
            payload,
        };

        Ok(Some((msg, total_len)))
    }
}

// --- JSON payload types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFolderRequest {
    #[serde(default)]
    pub default_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListChildrenRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvePathRequest {
    pub cwd: String,
    pub segment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCommandRequest {
    pub command: String,
    pub cwd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRequest {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

/// Envelope of every REPLY: `{ok: true, value}` or `{ok: false, error}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Reply {
    pub fn ok<T: Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            ok: true,
            value: serde_json::to_value(value)?,
            error: None,
        })
    }

    pub fn err(error: &BridgeError) -> Self {
        Self {
            ok: false,
            value: serde_json::Value::Null,
            error: Some(ErrorPayload {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }
}

// --- Helper functions for building specific messages ---

/// Build a heartbeat message
pub fn heartbeat() -> Message {
    Message::new(HEARTBEAT, 0, vec![])
}

/// Build a heartbeat ACK message
pub fn heartbeat_ack() -> Message {
    Message::new(HEARTBEAT_ACK, 0, vec![])
}

/// Build an auth result message
pub fn auth_result(result: &AuthResult) -> Result<Message, ProtocolError> {
    Message::json(AUTH_RESULT, 0, result)
}

/// Build a successful reply to `request_id`
pub fn reply_ok<T: Serialize>(request_id: u32, value: &T) -> Result<Message, ProtocolError> {
    Message::json(REPLY, request_id, &Reply::ok(value)?)
}

/// Build a failed reply to `request_id`
pub fn reply_err(request_id: u32, error: &BridgeError) -> Result<Message, ProtocolError> {
    Message::json(REPLY, request_id, &Reply::err(error))
}

/// Is `msg_type` something a UI may ask the bridge for
pub fn is_request(msg_type: u8) -> bool {
    matches!(
        msg_type,
        OPEN_FOLDER | LIST_CHILDREN | HOME_DIR | RESOLVE_PATH | RUN_COMMAND | READ_FILE | GET_ASSET
    )
}
