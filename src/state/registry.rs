use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    protocol::request::ChatId,
    session::{Session, StreamParams},
};

/// A live call as the dispatcher tracks it.
#[derive(Clone)]
pub struct SessionHandle {
    pub chat_id: ChatId,
    pub session: Arc<dyn Session>,
    pub stream: StreamParams,
}

impl SessionHandle {
    pub fn new(chat_id: ChatId, session: Arc<dyn Session>, stream: StreamParams) -> Self {
        Self { chat_id, session, stream }
    }

    pub fn with_stream(self, stream: StreamParams) -> Self {
        Self { stream, ..self }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("chat_id", &self.chat_id)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Live sessions by chat. Keys are sharded, so unrelated chats never wait on
/// each other; ordering within one chat is the dispatcher's job.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ChatId, SessionHandle>,
}

pub type SharedRegistry = Arc<SessionRegistry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(SessionRegistry::default())
}

impl SessionRegistry {
    /// Clones the handle out so no shard lock outlives the call.
    pub fn get(&self, chat_id: ChatId) -> Option<SessionHandle> {
        self.sessions.get(&chat_id).map(|entry| entry.value().clone())
    }

    pub fn set(&self, chat_id: ChatId, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.insert(chat_id, handle)
    }

    pub fn remove(&self, chat_id: ChatId) -> Option<SessionHandle> {
        self.sessions.remove(&chat_id).map(|(_, handle)| handle)
    }

    #[cfg(test)]
    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.sessions.contains_key(&chat_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionRegistry").field(&self.len()).finish()
    }
}
