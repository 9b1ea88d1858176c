use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::message::{Message, ResultCode};

/// Error codes a join failure may carry through to the caller unchanged.
const KNOWN_JOIN_ERRORS: &[&str] = &[
    "INVITE_HASH_INVALID",
    "INVITE_HASH_EXPIRED",
    "GROUPCALL_FORBIDDEN",
    "GROUPCALL_INVALID",
    "CHAT_ADMIN_REQUIRED",
    "JOIN_AS_PEER_INVALID",
    "NO_ACTIVE_GROUP_CALL",
    "FILE_NOT_FOUND",
    "NO_MEDIA_SOURCE",
];
const GENERIC_JOIN_ERROR: &str = "JOIN_ERROR";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid format")] // Json not parsed/missing fields
    InvalidFormat,
    #[error("invalid handshake")] // Controller didnt send connect in time
    InvalidHandshake,
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("frame too large (max 512 KiB)")]
    OversizedFrame,
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

impl From<ProtocolError> for Message {
    fn from(e: ProtocolError) -> Self {
        let name = match e {
            ProtocolError::InvalidFormat => "INVALID_FORMAT",
            ProtocolError::InvalidHandshake => "INVALID_HANDSHAKE",
            ProtocolError::ConnectionClosed => "CONNECTION_CLOSED",
            ProtocolError::Io(_) => "IO_ERROR",
            ProtocolError::OversizedFrame => "OVERSIZED_FRAME",
        };
        Message::mk_error(name.to_string(), e.to_string())
    }
}

/// Failure reported by a session capability.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The call backend refused; the detail usually names an upper-snake code.
    #[allow(dead_code)] // raised by network-backed sessions, not file playout
    #[error("{0}")]
    Rejected(String),
    #[error("FILE_NOT_FOUND: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("NO_MEDIA_SOURCE: request carries neither an audio nor a video path")]
    NoMediaSource,
    #[error("stream failed: {0}")]
    Stream(String),
    #[error("session closed")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Caller-facing code for a failed join.
    pub fn result_code(&self) -> ResultCode {
        map_join_error(&self.to_string())
    }
}

pub fn map_join_error(detail: &str) -> ResultCode {
    let code = KNOWN_JOIN_ERRORS
        .iter()
        .find(|code| detail.contains(*code))
        .copied()
        .unwrap_or(GENERIC_JOIN_ERROR);
    ResultCode::Failed(code.to_string())
}

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("outbound channel closed")]
    Closed,
}

/// What an action handler can leak to the dispatcher's top level.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("outbound send failed: {0}")]
    Outbound(#[from] OutboundError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}
