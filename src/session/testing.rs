//! Scriptable session doubles for dispatcher and transport tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    error::SessionError,
    protocol::request::ChatId,
    session::{JoinParams, LeaveOutcome, Session, SessionFactory, StreamParams},
};

/// How a [`MockSession`] answers each call.
#[derive(Clone, Default)]
pub struct Script {
    pub join_error: Option<String>,
    pub join_panics: bool,
    /// `join` blocks until this is notified.
    pub join_gate: Option<Arc<Notify>>,
    /// Leave result string; `None` means `"OK"`.
    pub leave_result: Option<String>,
    pub leave_fails: bool,
    pub pause_fails: bool,
    pub pause_panics: bool,
    pub resume_fails: bool,
    pub change_stream_fails: bool,
    pub played_time: u64,
}

#[derive(Default)]
pub struct MockSession {
    script: Script,
    calls: Mutex<Vec<&'static str>>,
    muted: AtomicBool,
}

impl MockSession {
    pub fn new(script: Script) -> Self {
        Self { script, ..Self::default() }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Polls until `call` was recorded; panics after a second.
    pub async fn wait_for_call(&self, call: &'static str) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !self.calls().contains(&call) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("`{call}` was never called"));
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Session for MockSession {
    async fn join(&self) -> Result<(), SessionError> {
        self.record("join");
        if let Some(gate) = &self.script.join_gate {
            gate.notified().await;
        }
        if self.script.join_panics {
            panic!("join exploded");
        }
        match &self.script.join_error {
            Some(detail) => Err(SessionError::Rejected(detail.clone())),
            None => Ok(()),
        }
    }

    async fn leave(&self) -> Result<LeaveOutcome, SessionError> {
        self.record("leave");
        if self.script.leave_fails {
            return Err(SessionError::Closed);
        }
        Ok(match &self.script.leave_result {
            Some(result) => LeaveOutcome { result: result.clone() },
            None => LeaveOutcome::ok(),
        })
    }

    async fn stop(&self) {
        self.record("stop");
    }

    async fn pause(&self) -> Result<(), SessionError> {
        self.record("pause");
        if self.script.pause_panics {
            panic!("pause exploded");
        }
        if self.script.pause_fails {
            return Err(SessionError::Stream("pause rejected".into()));
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), SessionError> {
        self.record("resume");
        if self.script.resume_fails {
            return Err(SessionError::Stream("resume rejected".into()));
        }
        Ok(())
    }

    async fn change_stream(&self, _params: StreamParams) -> Result<(), SessionError> {
        self.record("change_stream");
        if self.script.change_stream_fails {
            return Err(SessionError::Stream("encoder gone".into()));
        }
        Ok(())
    }

    fn mute(&self) {
        self.record("mute");
        self.muted.store(true, Ordering::SeqCst);
    }

    fn unmute(&self) {
        self.record("unmute");
        self.muted.store(false, Ordering::SeqCst);
    }

    fn played_time(&self) -> u64 {
        self.script.played_time
    }
}

/// Hands out [`MockSession`]s and remembers them.
#[derive(Default)]
pub struct MockFactory {
    scripts: Mutex<HashMap<ChatId, Script>>,
    create_errors: Mutex<HashMap<ChatId, String>>,
    created: Mutex<Vec<(ChatId, JoinParams, Arc<MockSession>)>>,
}

impl MockFactory {
    pub fn script(self, chat_id: ChatId, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(chat_id, script);
        self
    }

    pub fn fail_create(self, chat_id: ChatId, detail: &str) -> Self {
        self.create_errors.lock().unwrap().insert(chat_id, detail.to_string());
        self
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last_session(&self, chat_id: ChatId) -> Option<Arc<MockSession>> {
        let created = self.created.lock().unwrap();
        created.iter().rev().find(|(id, _, _)| *id == chat_id).map(|(_, _, s)| Arc::clone(s))
    }

    pub fn last_params(&self, chat_id: ChatId) -> Option<JoinParams> {
        let created = self.created.lock().unwrap();
        created.iter().rev().find(|(id, _, _)| *id == chat_id).map(|(_, p, _)| p.clone())
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn create(
        &self,
        chat_id: ChatId,
        params: JoinParams,
    ) -> Result<Arc<dyn Session>, SessionError> {
        if let Some(detail) = self.create_errors.lock().unwrap().get(&chat_id) {
            return Err(SessionError::Rejected(detail.clone()));
        }
        let script = self.scripts.lock().unwrap().get(&chat_id).cloned().unwrap_or_default();
        let session = Arc::new(MockSession::new(script));
        self.created.lock().unwrap().push((chat_id, params, Arc::clone(&session)));
        Ok(session)
    }
}
