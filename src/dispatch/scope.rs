use std::sync::Arc;

use tokio::runtime::Handle;

use crate::dispatch::{Dispatcher, lane::Turn};

/// Owns a request from enqueue to acknowledgment.
///
/// The acknowledgment goes out exactly once: through [`RequestScope::acknowledge`]
/// on the normal path, or from `Drop` if handling unwound before reaching it.
/// Dropping the scope also hands the chat's lane to the next request.
pub struct RequestScope {
    dispatcher: Arc<Dispatcher>,
    turn: Turn,
    update_id: String,
    acknowledged: bool,
}

impl RequestScope {
    pub fn new(dispatcher: Arc<Dispatcher>, turn: Turn, update_id: String) -> Self {
        Self { dispatcher, turn, update_id, acknowledged: false }
    }

    pub async fn wait_turn(&mut self) {
        self.turn.wait().await;
    }

    pub async fn acknowledge(mut self) {
        self.acknowledged = true;
        let chat_id = self.turn.chat_id;
        let update_id = std::mem::take(&mut self.update_id);
        if let Err(e) = self.dispatcher.outbound.resolve_update(chat_id, update_id).await {
            tracing::error!(chat_id, error = %e, "Failed to acknowledge request");
        }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let chat_id = self.turn.chat_id;
        if !self.acknowledged {
            let update_id = std::mem::take(&mut self.update_id);
            tracing::warn!(chat_id, %update_id, "Request handling aborted, acknowledging anyway");

            let outbound = Arc::clone(&self.dispatcher.outbound);
            match Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = outbound.resolve_update(chat_id, update_id).await {
                            tracing::error!(chat_id, error = %e, "Failed to acknowledge request");
                        }
                    });
                }
                Err(_) => tracing::error!(chat_id, "No runtime left to acknowledge request"),
            }
        }
        self.dispatcher.lanes.release(chat_id, self.turn.ticket);
    }
}
