//! Configuration system
//!
//! Handles loading configuration from multiple sources:
//! - Global config (~/.config/repo-relay/config.toml)
//! - Project config (./repo-relay.toml or .repo-relay/config.toml)
//! - Environment variables (REPO_RELAY_*)

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one subdirectory per cloned repository
    #[serde(default = "default_repos_root")]
    pub repos_root: PathBuf,

    /// API authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Conversation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Git command settings
    #[serde(default)]
    pub git: GitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos_root: default_repos_root(),
            auth: AuthConfig::default(),
            engine: EngineConfig::default(),
            git: GitConfig::default(),
        }
    }
}

fn default_repos_root() -> PathBuf {
    PathBuf::from("repos")
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Static bearer key. Authentication is disabled when unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("api_key_len", &self.api_key.as_ref().map(|k| k.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable used for the conversation engine
    #[serde(default = "default_engine_command")]
    pub command: String,

    /// Turn budget used when a request does not specify one
    #[serde(default = "default_max_turns")]
    pub default_max_turns: u32,

    /// Deadline for a single dispatch
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,

    /// Permission mode handed to the engine
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            default_max_turns: default_max_turns(),
            timeout_secs: default_engine_timeout(),
            permission_mode: default_permission_mode(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_engine_command() -> String {
    "claude".to_string()
}

fn default_max_turns() -> u32 {
    20
}

fn default_engine_timeout() -> u64 {
    900
}

fn default_permission_mode() -> String {
    "acceptEdits".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Deadline for ordinary git commands
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,

    /// Deadline for clones
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_git_timeout(),
            clone_timeout_secs: default_clone_timeout(),
        }
    }
}

fn default_git_timeout() -> u64 {
    120
}

fn default_clone_timeout() -> u64 {
    600
}

impl Config {
    /// Load configuration from all sources (global, project, env)
    pub async fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let content = fs::read_to_string(&global_path).await?;
                let global: PartialConfig = toml::from_str(&content)?;
                config = config.merge(global);
            }
        }

        // Load project config
        for name in ["repo-relay.toml", ".repo-relay/config.toml"] {
            let path = PathBuf::from(name);
            if path.exists() {
                let content = fs::read_to_string(&path).await?;
                let project: PartialConfig = toml::from_str(&content)?;
                config = config.merge(project);
            }
        }

        config.apply_env();

        Ok(config)
    }

    /// Get the global config directory path
    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "repo-relay", "repo-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Merge a partially specified config (other takes precedence)
    fn merge(mut self, other: PartialConfig) -> Self {
        if let Some(root) = other.repos_root {
            self.repos_root = root;
        }
        if let Some(auth) = other.auth {
            if auth.api_key.is_some() {
                self.auth.api_key = auth.api_key;
            }
        }
        if let Some(engine) = other.engine {
            if let Some(command) = engine.command {
                self.engine.command = command;
            }
            if let Some(turns) = engine.default_max_turns {
                self.engine.default_max_turns = turns;
            }
            if let Some(secs) = engine.timeout_secs {
                self.engine.timeout_secs = secs;
            }
            if let Some(mode) = engine.permission_mode {
                self.engine.permission_mode = mode;
            }
        }
        if let Some(git) = other.git {
            if let Some(secs) = git.timeout_secs {
                self.git.timeout_secs = secs;
            }
            if let Some(secs) = git.clone_timeout_secs {
                self.git.clone_timeout_secs = secs;
            }
        }
        self
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("REPO_RELAY_REPOS_ROOT") {
            self.repos_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("REPO_RELAY_API_KEY") {
            if !val.is_empty() {
                self.auth.api_key = Some(val);
            }
        }
        if let Ok(val) = std::env::var("REPO_RELAY_ENGINE_COMMAND") {
            self.engine.command = val;
        }
        apply_number("REPO_RELAY_MAX_TURNS", &mut self.engine.default_max_turns);
        apply_number("REPO_RELAY_ENGINE_TIMEOUT_SECS", &mut self.engine.timeout_secs);
        apply_number("REPO_RELAY_GIT_TIMEOUT_SECS", &mut self.git.timeout_secs);
    }

    /// Whether bearer authentication is enforced
    pub fn auth_enabled(&self) -> bool {
        self.auth.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.auth.api_key.is_some() {
            config.auth.api_key = Some("<REDACTED>".to_string());
        }
        config
    }
}

/// File layer: every section is optional so a file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    repos_root: Option<PathBuf>,
    auth: Option<AuthConfig>,
    engine: Option<PartialEngineConfig>,
    git: Option<PartialGitConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialEngineConfig {
    command: Option<String>,
    default_max_turns: Option<u32>,
    timeout_secs: Option<u64>,
    permission_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialGitConfig {
    timeout_secs: Option<u64>,
    clone_timeout_secs: Option<u64>,
}

fn apply_number<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(val) = std::env::var(name) {
        match val.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(variable = name, value = %val, "Ignoring non-numeric override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.repos_root, PathBuf::from("repos"));
        assert_eq!(config.engine.default_max_turns, 20);
        assert_eq!(config.engine.command, "claude");
        assert!(!config.auth_enabled());
    }

    #[test]
    fn file_layer_only_overrides_named_sections() {
        let partial: PartialConfig = toml::from_str(
            r#"
            repos_root = "/srv/repos"

            [engine]
            default_max_turns = 5
            "#,
        )
        .unwrap();
        let config = Config::default().merge(partial);
        assert_eq!(config.repos_root, PathBuf::from("/srv/repos"));
        assert_eq!(config.engine.default_max_turns, 5);
        assert_eq!(config.engine.command, "claude");
        assert_eq!(config.git.timeout_secs, 120);
    }

    #[test]
    fn later_layer_keeps_unnamed_fields_of_a_section() {
        let global: PartialConfig = toml::from_str(
            r#"
            [engine]
            command = "/opt/bin/claude"
            timeout_secs = 60

            [git]
            clone_timeout_secs = 30
            "#,
        )
        .unwrap();
        let project: PartialConfig = toml::from_str(
            r#"
            [engine]
            default_max_turns = 7

            [git]
            timeout_secs = 10
            "#,
        )
        .unwrap();
        let config = Config::default().merge(global).merge(project);
        assert_eq!(config.engine.command, "/opt/bin/claude");
        assert_eq!(config.engine.timeout_secs, 60);
        assert_eq!(config.engine.default_max_turns, 7);
        assert_eq!(config.engine.permission_mode, "acceptEdits");
        assert_eq!(config.git.clone_timeout_secs, 30);
        assert_eq!(config.git.timeout_secs, 10);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let auth = AuthConfig {
            api_key: Some("super-secret".to_string()),
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn redacted_copy_masks_key() {
        let mut config = Config::default();
        config.auth.api_key = Some("super-secret".to_string());
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("super-secret"));
        assert!(config.redacted().auth_enabled());
    }
}
