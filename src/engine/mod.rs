//! Conversation engine abstraction
//!
//! The engine is the external AI coding assistant. It is driven with a prompt,
//! a working directory and a turn budget, and produces an ordered sequence of
//! JSON messages. Two implementations exist: [`ClaudeCliEngine`] spawns the
//! `claude` CLI, [`ScriptedEngine`] replays canned output for tests.

pub mod claude;
pub mod fake;

pub use claude::ClaudeCliEngine;
pub use fake::ScriptedEngine;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// One message produced by the engine.
///
/// Only the `type` tag is interpreted; the rest is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl EngineMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            body: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    /// Engine-side conversation id carried by this message, if any
    pub fn session_id(&self) -> Option<&str> {
        self.body.get("session_id").and_then(Value::as_str)
    }
}

/// Capabilities granted to the engine inside the working directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
    Edit,
    MultiEdit,
    Glob,
    Grep,
    List,
    Shell,
    Git,
}

impl Capability {
    /// The fixed set every dispatch grants
    pub const ALL: [Capability; 9] = [
        Capability::Read,
        Capability::Write,
        Capability::Edit,
        Capability::MultiEdit,
        Capability::Glob,
        Capability::Grep,
        Capability::List,
        Capability::Shell,
        Capability::Git,
    ];

    /// Tool name understood by the engine
    pub fn tool_name(&self) -> &'static str {
        match self {
            Capability::Read => "Read",
            Capability::Write => "Write",
            Capability::Edit => "Edit",
            Capability::MultiEdit => "MultiEdit",
            Capability::Glob => "Glob",
            Capability::Grep => "Grep",
            Capability::List => "LS",
            Capability::Shell => "Bash",
            Capability::Git => "Bash(git:*)",
        }
    }
}

/// Everything the engine needs for one invocation
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub prompt: String,
    pub working_directory: PathBuf,
    pub max_turns: u32,
    pub continue_conversation: bool,
    /// Engine conversation to resume, taken from the session history
    pub resume: Option<String>,
    pub capabilities: Vec<Capability>,
    pub permission_mode: String,
}

#[async_trait]
pub trait ConversationEngine: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run one prompt to completion and return every produced message in
    /// arrival order. Must stop promptly once `cancel` fires.
    async fn invoke(
        &self,
        request: EngineRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<EngineMessage>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_keeps_unknown_fields() {
        let raw = json!({"type": "assistant", "session_id": "abc", "message": {"content": []}});
        let msg: EngineMessage = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(msg.kind, "assistant");
        assert_eq!(msg.session_id(), Some("abc"));
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }

    #[test]
    fn capability_tool_names() {
        let names: Vec<_> = Capability::ALL.iter().map(Capability::tool_name).collect();
        assert_eq!(
            names,
            vec!["Read", "Write", "Edit", "MultiEdit", "Glob", "Grep", "LS", "Bash", "Bash(git:*)"]
        );
    }
}
