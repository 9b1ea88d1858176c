use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session key: the chat whose group call a request targets.
pub type ChatId = i64;

/// `type` marker of a leave request issued because the account was removed
/// from the chat.
pub const FORCED_REMOVAL: &str = "kicked_from_group";

/// Frames received from the controlling process.
///
/// A request body is kept as raw JSON here and typed by
/// [`Request::from_body`], so a badly typed field costs only that request.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Connect { user_id: i64 },
    Request { update_id: String, data: Value },
}

/// A request body that did not parse.
#[derive(Debug)]
pub struct MalformedBody {
    /// Recovered when the body still names its chat; the request can then be
    /// acknowledged.
    pub chat_id: Option<ChatId>,
    pub reason: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Action {
    JoinCall,
    LeaveCall,
    Pause,
    Resume,
    ChangeStream,
    MuteStream,
    UnmuteStream,
    PlayedTime,
    Unknown,
}

impl Action {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "join_call" => Self::JoinCall,
            "leave_call" => Self::LeaveCall,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "change_stream" => Self::ChangeStream,
            "mute_stream" => Self::MuteStream,
            "unmute_stream" => Self::UnmuteStream,
            "played_time" => Self::PlayedTime,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct AudioStream {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct VideoStream {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<u32>,
}

/// A lifecycle request. Action-specific fields are optional on the wire and
/// only read by the action that uses them.
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
pub struct Request {
    pub action: String,
    pub chat_id: ChatId,
    #[serde(default)]
    pub solver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_audio: Option<AudioStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_video: Option<VideoStream>,
    #[serde(default)]
    pub lip_sync: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Request {
    pub fn from_body(data: Value) -> Result<Self, MalformedBody> {
        let chat_id = data.get("chat_id").and_then(Value::as_i64);
        serde_json::from_value(data).map_err(|e| MalformedBody { chat_id, reason: e.to_string() })
    }

    /// Stands in for a body that could not be parsed. Its action is
    /// unrecognized, so dispatching it only acknowledges.
    pub fn unparsed(chat_id: ChatId) -> Self {
        Self {
            action: String::new(),
            chat_id,
            solver_id: String::new(),
            buffer_length: None,
            invite_hash: None,
            stream_audio: None,
            stream_video: None,
            lip_sync: false,
            kind: None,
        }
    }

    pub fn action(&self) -> Action {
        Action::from_tag(&self.action)
    }

    pub fn is_forced_removal(&self) -> bool {
        self.kind.as_deref() == Some(FORCED_REMOVAL)
    }
}

#[cfg(test)]
impl Request {
    pub fn new(action: &str, chat_id: ChatId, solver_id: &str) -> Self {
        Self {
            action: action.to_string(),
            solver_id: solver_id.to_string(),
            ..Self::unparsed(chat_id)
        }
    }

    pub fn with_audio(mut self, path: impl Into<String>) -> Self {
        self.stream_audio = Some(AudioStream { path: path.into(), bitrate: None });
        self
    }

    pub fn with_buffer_length(mut self, len: usize) -> Self {
        self.buffer_length = Some(len);
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::JoinCall => "join_call",
            Self::LeaveCall => "leave_call",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::ChangeStream => "change_stream",
            Self::MuteStream => "mute_stream",
            Self::UnmuteStream => "unmute_stream",
            Self::PlayedTime => "played_time",
            Self::Unknown => "unknown",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_from_wire() {
        let line = r#"{"type":"request","update_id":"42","data":{
            "action":"join_call","chat_id":-1001234567890,"solver_id":"abc",
            "buffer_length":3840,"invite_hash":"",
            "stream_audio":{"path":"/tmp/input.raw","bitrate":48000},
            "lip_sync":false}}"#;

        let frame: Inbound = serde_json::from_str(line).expect("failed to deserialize request");
        let Inbound::Request { update_id, data } = frame else {
            panic!("expected a request frame");
        };
        let data = Request::from_body(data).expect("failed to type request body");
        assert_eq!(update_id, "42");
        assert_eq!(data.action(), Action::JoinCall);
        assert_eq!(data.chat_id, -1001234567890);
        assert_eq!(data.buffer_length, Some(3840));
        assert_eq!(data.stream_audio.unwrap().bitrate, Some(48000));
        assert!(data.stream_video.is_none());
    }

    #[test]
    fn unrecognized_action_still_parses() {
        let req: Request =
            serde_json::from_str(r#"{"action":"teleport","chat_id":1,"solver_id":"s"}"#).unwrap();
        assert_eq!(req.action(), Action::Unknown);
        assert_eq!(req.action, "teleport");
    }

    #[test]
    fn forced_removal_marker() {
        let req: Request = serde_json::from_str(
            r#"{"action":"leave_call","chat_id":1,"solver_id":"s","type":"kicked_from_group"}"#,
        )
        .unwrap();
        assert!(req.is_forced_removal());
        assert!(!Request::new("leave_call", 1, "s").is_forced_removal());
    }

    #[test]
    fn connect_frame() {
        let frame: Inbound = serde_json::from_str(r#"{"type":"connect","user_id":99}"#).unwrap();
        assert_eq!(frame, Inbound::Connect { user_id: 99 });
    }

    #[test]
    fn badly_typed_field_keeps_chat_id() {
        let bodies = [
            r#"{"action":"join_call","chat_id":5,"solver_id":"x","buffer_length":-1}"#,
            r#"{"action":"join_call","chat_id":5,"solver_id":"x","lip_sync":null}"#,
            r#"{"action":"join_call","chat_id":5,"solver_id":"x","stream_audio":{"bitrate":1}}"#,
        ];
        for body in bodies {
            let data: Value = serde_json::from_str(body).unwrap();
            let err = Request::from_body(data).unwrap_err();
            assert_eq!(err.chat_id, Some(5), "{body}");
        }
    }

    #[test]
    fn body_without_usable_chat_id() {
        let data: Value = serde_json::from_str(r#"{"action":"pause","chat_id":"five"}"#).unwrap();
        assert_eq!(Request::from_body(data).unwrap_err().chat_id, None);
    }

    #[test]
    fn unparsed_stand_in_is_unknown_action() {
        let req = Request::unparsed(3);
        assert_eq!(req.action(), Action::Unknown);
        assert_eq!(req.chat_id, 3);
    }

    #[test]
    fn missing_chat_id_is_rejected() {
        let res = serde_json::from_str::<Request>(r#"{"action":"pause","solver_id":"s"}"#);
        assert!(res.is_err());
    }
}
