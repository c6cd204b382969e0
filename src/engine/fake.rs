//! Deterministic engine for tests and offline runs

use super::{ConversationEngine, EngineMessage, EngineRequest};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Script {
    Reply(Vec<EngineMessage>),
    Fail(String),
    Hang,
}

/// Replays a fixed reply and records every request it receives
#[derive(Clone)]
pub struct ScriptedEngine {
    script: Script,
    requests: Arc<Mutex<Vec<EngineRequest>>>,
}

impl ScriptedEngine {
    /// Reply with `messages` on every invocation
    pub fn replying(messages: Vec<EngineMessage>) -> Self {
        Self::with_script(Script::Reply(messages))
    }

    /// Fail every invocation with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(reason.into()))
    }

    /// Never finish on its own; only cancellation ends the call
    pub fn hanging() -> Self {
        Self::with_script(Script::Hang)
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests seen so far, oldest first
    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ConversationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        request: EngineRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<EngineMessage>> {
        self.requests.lock().push(request);

        match &self.script {
            Script::Reply(messages) => Ok(messages.clone()),
            Script::Fail(reason) => Err(anyhow!("{}", reason)),
            Script::Hang => {
                cancel.cancelled().await;
                Err(anyhow!("Engine invocation cancelled"))
            }
        }
    }
}
