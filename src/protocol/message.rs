use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol::request::ChatId;

/// Frames sent to the controlling process.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Message {
    UpdateRequest {
        result: ResultCode,
        chat_id: ChatId,
        solver_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<u64>,
    },
    ResolveUpdate { chat_id: ChatId, update_id: String },
    StreamEnded { chat_id: ChatId },
    Error { name: String, msg: String },
}

impl Message {
    pub fn mk_update(result: ResultCode, chat_id: ChatId, solver_id: String) -> Self {
        Self::UpdateRequest { result, chat_id, solver_id, error: None, time: None }
    }

    pub fn mk_left(chat_id: ChatId, solver_id: String, error: Option<String>) -> Self {
        Self::UpdateRequest { result: ResultCode::LeftVoiceChat, chat_id, solver_id, error, time: None }
    }

    pub fn mk_played_time(chat_id: ChatId, solver_id: String, time: u64) -> Self {
        Self::UpdateRequest {
            result: ResultCode::PlayedTime,
            chat_id,
            solver_id,
            error: None,
            time: Some(time),
        }
    }

    pub fn mk_resolve(chat_id: ChatId, update_id: String) -> Self {
        Self::ResolveUpdate { chat_id, update_id }
    }

    pub fn mk_stream_ended(chat_id: ChatId) -> Self {
        Self::StreamEnded { chat_id }
    }

    pub fn mk_error(name: String, msg: String) -> Self {
        Self::Error { name, msg }
    }
}

/// Outcome code carried by an `update_request` frame.
///
/// Join failures carry the caller-facing code they were mapped to in
/// [`ResultCode::Failed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultCode {
    JoinedVoiceChat,
    AlreadyJoined,
    LeftVoiceChat,
    NotInGroupCall,
    PausedStream,
    ResumedStream,
    ChangedStream,
    StreamDeleted,
    MutedStream,
    UnmutedStream,
    PlayedTime,
    Failed(String),
}

impl ResultCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::JoinedVoiceChat => "JOINED_VOICE_CHAT",
            Self::AlreadyJoined => "ALREADY_JOINED",
            Self::LeftVoiceChat => "LEFT_VOICE_CHAT",
            Self::NotInGroupCall => "NOT_IN_GROUP_CALL",
            Self::PausedStream => "PAUSED_STREAM",
            Self::ResumedStream => "RESUMED_STREAM",
            Self::ChangedStream => "CHANGED_STREAM",
            Self::StreamDeleted => "STREAM_DELETED",
            Self::MutedStream => "MUTED_STREAM",
            Self::UnmutedStream => "UNMUTED_STREAM",
            Self::PlayedTime => "PLAYED_TIME",
            Self::Failed(code) => code,
        }
    }

    fn from_code(code: String) -> Self {
        match code.as_str() {
            "JOINED_VOICE_CHAT" => Self::JoinedVoiceChat,
            "ALREADY_JOINED" => Self::AlreadyJoined,
            "LEFT_VOICE_CHAT" => Self::LeftVoiceChat,
            "NOT_IN_GROUP_CALL" => Self::NotInGroupCall,
            "PAUSED_STREAM" => Self::PausedStream,
            "RESUMED_STREAM" => Self::ResumedStream,
            "CHANGED_STREAM" => Self::ChangedStream,
            "STREAM_DELETED" => Self::StreamDeleted,
            "MUTED_STREAM" => Self::MutedStream,
            "UNMUTED_STREAM" => Self::UnmutedStream,
            "PLAYED_TIME" => Self::PlayedTime,
            _ => Self::Failed(code),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_code)
    }
}
