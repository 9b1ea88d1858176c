use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::OutboundError,
    protocol::{message::Message, request::ChatId},
};

/// Where results and acknowledgments go.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_update(&self, msg: Message) -> Result<(), OutboundError>;

    /// Acknowledges `update_id`; the controller stops waiting on it.
    async fn resolve_update(&self, chat_id: ChatId, update_id: String) -> Result<(), OutboundError>;
}

/// Queues frames for whichever controller connection is being served.
#[derive(Clone, Debug)]
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<Message>,
}

pub type Outbox = mpsc::UnboundedReceiver<Message>;

impl ChannelOutbound {
    pub fn new() -> (Self, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Outbound for ChannelOutbound {
    async fn send_update(&self, msg: Message) -> Result<(), OutboundError> {
        tracing::trace!(?msg, "Queueing update");
        self.tx.send(msg).map_err(|_| OutboundError::Closed)
    }

    async fn resolve_update(&self, chat_id: ChatId, update_id: String) -> Result<(), OutboundError> {
        self.tx.send(Message::mk_resolve(chat_id, update_id)).map_err(|_| OutboundError::Closed)
    }
}
