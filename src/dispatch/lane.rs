use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::oneshot;

use crate::protocol::request::ChatId;

/// Per-chat FIFO of request tasks.
///
/// Each chat keeps only its tail: the completion signal of the most recently
/// enqueued request. A new request takes that signal and waits on it, then
/// becomes the tail itself. Enqueueing is synchronous, so the chain follows
/// arrival order. Chats share nothing but the map shard.
#[derive(Default)]
pub struct Lanes {
    tails: DashMap<ChatId, Tail>,
    next_ticket: AtomicU64,
}

struct Tail {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

/// A request's place in its chat's lane. Dropping it lets the next request
/// of the same chat run.
pub struct Turn {
    pub chat_id: ChatId,
    pub ticket: u64,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl Lanes {
    pub fn enqueue(&self, chat_id: ChatId) -> Turn {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        let tail = Tail { ticket, done: done_rx };

        let previous = match self.tails.entry(chat_id) {
            Entry::Occupied(mut entry) => Some(std::mem::replace(entry.get_mut(), tail).done),
            Entry::Vacant(entry) => {
                entry.insert(tail);
                None
            }
        };

        Turn { chat_id, ticket, previous, _done: done_tx }
    }

    /// Forgets the lane if `ticket` is still its tail, i.e. nothing queued
    /// behind it.
    pub fn release(&self, chat_id: ChatId, ticket: u64) {
        self.tails.remove_if(&chat_id, |_, tail| tail.ticket == ticket);
    }

    /// Chats with at least one request queued or running.
    pub fn active(&self) -> usize {
        self.tails.len()
    }
}

impl Turn {
    /// Resolves once every earlier request of this chat has finished.
    pub async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // the sender is only ever dropped, never used
            let _ = previous.await;
        }
    }
}
