//! Routes lifecycle requests onto live sessions.
//!
//! Every request runs on its own task, behind the earlier requests of the
//! same chat (see [`lane`]). Whatever happens while it is handled, exactly
//! one acknowledgment is sent for it, after any result it produced.

mod lane;
mod scope;


use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    error::DispatchError,
    net::outbound::Outbound,
    protocol::{
        message::{Message, ResultCode},
        request::{Action, Request},
    },
    session::{JoinParams, SessionFactory, StreamParams},
    state::registry::{SessionHandle, SharedRegistry},
};

use lane::Lanes;
use scope::RequestScope;

pub struct Dispatcher {
    registry: SharedRegistry,
    factory: Arc<dyn SessionFactory>,
    outbound: Arc<dyn Outbound>,
    lanes: Lanes,
}

impl Dispatcher {
    pub fn new(
        registry: SharedRegistry,
        factory: Arc<dyn SessionFactory>,
        outbound: Arc<dyn Outbound>,
    ) -> Arc<Self> {
        Arc::new(Self { registry, factory, outbound, lanes: Lanes::default() })
    }

    #[cfg(test)]
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Queues `request` behind earlier requests for the same chat and returns
    /// the task handling it. The task ends after the acknowledgment is sent.
    pub fn dispatch(self: &Arc<Self>, request: Request, update_id: String) -> JoinHandle<()> {
        let turn = self.lanes.enqueue(request.chat_id);
        let mut scope = RequestScope::new(Arc::clone(self), turn, update_id);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            scope.wait_turn().await;
            this.process(&request).await;
            scope.acknowledge().await;
        })
    }

    async fn process(&self, request: &Request) {
        tracing::info!(
            chat_id = request.chat_id,
            action = %request.action,
            solver_id = %request.solver_id,
            busy_chats = self.lanes.active(),
            "Request received"
        );

        if let Err(e) = self.handle(request).await {
            tracing::error!(
                chat_id = request.chat_id,
                action = %request.action,
                error = %e,
                "Unhandled error"
            );
        }
    }

    async fn handle(&self, request: &Request) -> Result<(), DispatchError> {
        let action = request.action();
        let live = self.registry.get(request.chat_id);

        match (action, live) {
            (Action::Unknown, _) => {
                tracing::debug!(action = %request.action, "Ignoring unrecognized action");
                Ok(())
            }
            (Action::JoinCall, None) => self.join_call(request).await,
            (Action::JoinCall, Some(_)) => self.reply(request, ResultCode::AlreadyJoined).await,
            (_, None) => self.reply(request, ResultCode::NotInGroupCall).await,
            (Action::LeaveCall, Some(handle)) => self.leave_call(request, handle).await,
            (Action::Pause | Action::Resume, Some(handle)) => {
                self.pause_or_resume(request, action, &handle).await
            }
            (Action::ChangeStream, Some(handle)) => self.change_stream(request, handle).await,
            (Action::MuteStream, Some(handle)) => {
                handle.session.mute();
                self.reply(request, ResultCode::MutedStream).await
            }
            (Action::UnmuteStream, Some(handle)) => {
                handle.session.unmute();
                self.reply(request, ResultCode::UnmutedStream).await
            }
            (Action::PlayedTime, Some(handle)) => {
                let time = handle.session.played_time();
                let msg = Message::mk_played_time(request.chat_id, request.solver_id.clone(), time);
                self.outbound.send_update(msg).await?;
                Ok(())
            }
        }
    }

    async fn join_call(&self, request: &Request) -> Result<(), DispatchError> {
        let chat_id = request.chat_id;
        let params = JoinParams::from_request(request);
        let stream = params.stream.clone();

        let session = match self.factory.create(chat_id, params).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Failed to create session");
                return self.reply(request, e.result_code()).await;
            }
        };

        // registered only once live; the lane holds this chat's other requests
        let joined = session.join().await;
        match joined {
            Ok(()) => {
                self.registry.set(chat_id, SessionHandle::new(chat_id, session, stream));
                tracing::info!(chat_id, sessions = self.registry.len(), "Joined call");
                self.reply(request, ResultCode::JoinedVoiceChat).await
            }
            Err(e) => {
                tracing::error!(chat_id, error = %e, "Join failed, session dropped");
                self.reply(request, e.result_code()).await
            }
        }
    }

    async fn leave_call(&self, request: &Request, handle: SessionHandle) -> Result<(), DispatchError> {
        let chat_id = request.chat_id;

        if request.is_forced_removal() {
            // nobody waits on the teardown, and nothing is reported back
            let session = handle.session;
            tokio::spawn(async move { session.stop().await });
            self.registry.remove(chat_id);
            tracing::info!(chat_id, "Removed from chat, session stopped");
            return Ok(());
        }

        // a failed leave keeps the handle so the controller can retry it
        let outcome = handle.session.leave().await?;
        self.registry.remove(chat_id);

        tracing::info!(chat_id, result = %outcome.result, "Left call");
        let error = (!outcome.is_ok()).then_some(outcome.result);
        let msg = Message::mk_left(chat_id, request.solver_id.clone(), error);
        self.outbound.send_update(msg).await?;
        Ok(())
    }

    async fn pause_or_resume(
        &self,
        request: &Request,
        action: Action,
        handle: &SessionHandle,
    ) -> Result<(), DispatchError> {
        let (result, code) = if action == Action::Pause {
            (handle.session.pause().await, ResultCode::PausedStream)
        } else {
            (handle.session.resume().await, ResultCode::ResumedStream)
        };

        match result {
            Ok(()) => self.reply(request, code).await,
            Err(e) => {
                tracing::error!(chat_id = request.chat_id, error = %e, "Error on {action}");
                Ok(())
            }
        }
    }

    async fn change_stream(&self, request: &Request, handle: SessionHandle) -> Result<(), DispatchError> {
        let chat_id = request.chat_id;
        let stream = StreamParams::from_request(request);

        match handle.session.change_stream(stream.clone()).await {
            Ok(()) => {
                self.registry.set(chat_id, handle.with_stream(stream));
                self.reply(request, ResultCode::ChangedStream).await
            }
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "Stream change failed");
                self.reply(request, ResultCode::StreamDeleted).await
            }
        }
    }

    async fn reply(&self, request: &Request, result: ResultCode) -> Result<(), DispatchError> {
        let msg = Message::mk_update(result, request.chat_id, request.solver_id.clone());
        self.outbound.send_update(msg).await?;
        Ok(())
    }
}
