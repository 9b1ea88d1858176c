//! Capability interface of a live call.
//!
//! The dispatcher only ever talks to a call through [`Session`]; how media is
//! produced, encoded or signalled is up to the implementation behind it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::SessionError,
    protocol::request::{AudioStream, ChatId, Request, VideoStream},
};

#[cfg(test)]
pub mod testing;

pub const LEAVE_OK: &str = "OK";

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct StreamParams {
    pub audio: Option<AudioStream>,
    pub video: Option<VideoStream>,
    pub lip_sync: bool,
}

impl StreamParams {
    pub fn from_request(request: &Request) -> Self {
        Self {
            audio: request.stream_audio.clone(),
            video: request.stream_video.clone(),
            lip_sync: request.lip_sync,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct JoinParams {
    /// Frame size in bytes; `None` lets the factory pick its default.
    pub buffer_length: Option<usize>,
    pub invite_hash: Option<String>,
    pub stream: StreamParams,
}

impl JoinParams {
    pub fn from_request(request: &Request) -> Self {
        Self {
            buffer_length: request.buffer_length,
            invite_hash: request.invite_hash.clone().filter(|hash| !hash.is_empty()),
            stream: StreamParams::from_request(request),
        }
    }
}

/// Result of a graceful leave. Anything but `"OK"` is reported back to the
/// caller as the `error` of the `LEFT_VOICE_CHAT` update.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LeaveOutcome {
    pub result: String,
}

impl LeaveOutcome {
    pub fn ok() -> Self {
        Self { result: LEAVE_OK.to_string() }
    }

    pub fn is_ok(&self) -> bool {
        self.result == LEAVE_OK
    }
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn join(&self) -> Result<(), SessionError>;

    async fn leave(&self) -> Result<LeaveOutcome, SessionError>;

    /// Tears the call down without a graceful leave.
    async fn stop(&self);

    async fn pause(&self) -> Result<(), SessionError>;

    async fn resume(&self) -> Result<(), SessionError>;

    async fn change_stream(&self, params: StreamParams) -> Result<(), SessionError>;

    fn mute(&self);

    fn unmute(&self);

    /// Seconds of media played so far.
    fn played_time(&self) -> u64;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        chat_id: ChatId,
        params: JoinParams,
    ) -> Result<Arc<dyn Session>, SessionError>;
}
