//! Engine backed by the `claude` CLI in stream-json mode

use super::{ConversationEngine, EngineMessage, EngineRequest};
use crate::config::EngineConfig;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spawns one `claude -p` process per prompt and collects its output lines
pub struct ClaudeCliEngine {
    command: String,
}

impl ClaudeCliEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.command.clone())
    }

    fn build_args(request: &EngineRequest) -> Vec<String> {
        let tools = request
            .capabilities
            .iter()
            .map(|c| c.tool_name())
            .collect::<Vec<_>>()
            .join(",");

        let mut args = vec![
            "-p".to_string(),
            request.prompt.clone(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
            "--allowedTools".to_string(),
            tools,
            "--permission-mode".to_string(),
            request.permission_mode.clone(),
        ];

        if let Some(id) = &request.resume {
            args.push("--resume".to_string());
            args.push(id.clone());
        } else if request.continue_conversation {
            args.push("--continue".to_string());
        }
        args
    }
}

#[async_trait]
impl ConversationEngine for ClaudeCliEngine {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn invoke(
        &self,
        request: EngineRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<EngineMessage>> {
        let args = Self::build_args(&request);
        info!(
            command = %self.command,
            cwd = %request.working_directory.display(),
            max_turns = request.max_turns,
            resume = request.resume.is_some(),
            "Invoking conversation engine"
        );

        let mut child = Command::new(&self.command)
            .args(&args)
            .current_dir(&request.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.command))?;

        let stdout = child.stdout.take().context("engine stdout not captured")?;
        let mut stderr = child.stderr.take().context("engine stderr not captured")?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut messages = Vec::new();
        loop {
            let line = tokio::select! {
                // Dropping the child kills it
                _ = cancel.cancelled() => bail!("Engine invocation cancelled"),
                line = lines.next_line() => line.context("Failed to read engine output")?,
            };
            let Some(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<EngineMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => debug!(error = %e, "Skipping non-JSON engine output line"),
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => bail!("Engine invocation cancelled"),
            status = child.wait() => status.context("Failed to wait for engine")?,
        };
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!(status = %status, "Conversation engine exited with failure");
            bail!(
                "{} exited with {}: {}",
                self.command,
                status,
                stderr.trim()
            );
        }

        debug!(count = messages.len(), "Engine produced messages");
        Ok(messages)
    }
}
