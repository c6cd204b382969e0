//! Prompt dispatch
//!
//! Drives the conversation engine for one prompt, optionally in the context
//! of a session, and records the produced messages on that session.

use crate::config::EngineConfig;
use crate::engine::{Capability, ConversationEngine, EngineMessage, EngineRequest};
use crate::error::{RelayError, RelayResult};
use crate::session::SessionStore;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A prompt to run
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub prompt: String,
    /// Directory used when no live session overrides it
    pub working_directory: PathBuf,
    /// Turn budget; the configured default applies when absent
    pub turn_budget: Option<u32>,
    pub continue_conversation: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub prompt_length: usize,
    pub messages: Vec<EngineMessage>,
    pub working_directory: PathBuf,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Clone)]
pub struct PromptDispatcher {
    engine: Arc<dyn ConversationEngine>,
    sessions: SessionStore,
    timeout: Duration,
    default_max_turns: u32,
    permission_mode: String,
    shutdown: CancellationToken,
}

impl PromptDispatcher {
    pub fn new(
        engine: Arc<dyn ConversationEngine>,
        sessions: SessionStore,
        config: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            sessions,
            timeout: config.timeout(),
            default_max_turns: config.default_max_turns,
            permission_mode: config.permission_mode.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Root token every in-flight dispatch descends from.
    ///
    /// Cancelling it aborts all running engine invocations.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run one prompt to completion.
    ///
    /// `cancel` is the caller's token; the engine sees a token linked to it, so
    /// cancelling either the caller or [`Self::cancellation_token`] stops the call.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        cancel: CancellationToken,
    ) -> RelayResult<DispatchResult> {
        if request.prompt.trim().is_empty() {
            return Err(RelayError::InvalidRequest("Prompt is required".to_string()));
        }
        let max_turns = request.turn_budget.unwrap_or(self.default_max_turns);
        if max_turns == 0 {
            return Err(RelayError::InvalidRequest(
                "maxTurns must be at least 1".to_string(),
            ));
        }

        let mut working_directory = request.working_directory;
        let mut session_id = None;
        let mut resume = None;
        if let Some(id) = request.session_id.as_deref() {
            match self.sessions.get(id) {
                Some(session) => {
                    working_directory = session.working_directory().to_path_buf();
                    if request.continue_conversation {
                        resume = session.engine_session_id().map(str::to_string);
                    }
                    session_id = Some(session.id);
                }
                None => warn!(session_id = %id, "Unknown session, dispatching without one"),
            }
        }

        let engine_request = EngineRequest {
            prompt: request.prompt.clone(),
            working_directory: working_directory.clone(),
            max_turns,
            continue_conversation: request.continue_conversation,
            resume,
            capabilities: Capability::ALL.to_vec(),
            permission_mode: self.permission_mode.clone(),
        };

        let token = self.linked_token(&cancel);
        let _release = token.clone().drop_guard();
        info!(
            engine = self.engine.name(),
            prompt_length = request.prompt.len(),
            session_id = ?session_id,
            cwd = %working_directory.display(),
            "Dispatching prompt"
        );

        let outcome =
            tokio::time::timeout(self.timeout, self.engine.invoke(engine_request, token.clone()))
                .await;
        let messages = match outcome {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                warn!(error = %e, "Prompt dispatch failed");
                return Err(RelayError::DispatchFailure(e));
            }
            Err(_) => {
                token.cancel();
                warn!(timeout_secs = self.timeout.as_secs(), "Prompt dispatch timed out");
                return Err(RelayError::DispatchFailure(anyhow!(
                    "Engine did not finish within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if let Some(id) = &session_id {
            self.sessions.append_and_touch(id, messages.clone(), &request.prompt);
        }

        Ok(DispatchResult {
            message: "Prompt processed successfully".to_string(),
            timestamp: Utc::now(),
            prompt_length: request.prompt.len(),
            message_count: messages.len(),
            messages,
            working_directory,
            session_id,
        })
    }

    /// Token cancelled by either the caller's token or the dispatcher's root
    fn linked_token(&self, caller: &CancellationToken) -> CancellationToken {
        let token = self.shutdown.child_token();
        let linked = token.clone();
        let caller = caller.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = caller.cancelled() => linked.cancel(),
                _ = linked.cancelled() => {}
            }
        });
        token
    }
}
