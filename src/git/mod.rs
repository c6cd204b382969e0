//! Git collaborator
//!
//! Every version-control operation goes through the [`Vcs`] trait. The
//! production implementation, [`GitCli`], shells out to the `git` binary with a
//! deadline on every invocation.

pub mod status;

pub use status::{ChangeCounts, CommitInfo, Remote, RepoStatus};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `git reset` flavour
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    Soft,
    #[default]
    Mixed,
    Hard,
}

impl ResetMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "soft" => Some(Self::Soft),
            "mixed" => Some(Self::Mixed),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Soft => "--soft",
            Self::Mixed => "--mixed",
            Self::Hard => "--hard",
        }
    }
}

/// Version-control capability used by the relay
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Clone `url` into `dest` (which must not exist yet)
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()>;

    /// Whether `path` is the top level of a work tree
    async fn is_repository(&self, path: &Path) -> bool;

    async fn status(&self, repo: &Path) -> Result<RepoStatus>;

    /// Current branch (if any) and all local branches
    async fn branches(&self, repo: &Path) -> Result<(Option<String>, Vec<String>)>;

    async fn remotes(&self, repo: &Path) -> Result<Vec<Remote>>;

    async fn log(&self, repo: &Path, limit: usize) -> Result<Vec<CommitInfo>>;

    async fn stage_all(&self, repo: &Path) -> Result<()>;

    /// Paths currently in the index that differ from HEAD
    async fn staged_files(&self, repo: &Path) -> Result<Vec<String>>;

    /// Commit the index and return the new commit id
    async fn commit(&self, repo: &Path, message: &str) -> Result<String>;

    async fn push(&self, repo: &Path, remote: &str) -> Result<()>;

    async fn pull(&self, repo: &Path, remote: &str, branch: Option<&str>) -> Result<String>;

    /// Create `branch` from HEAD and check it out
    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<()>;

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<()>;

    async fn reset(&self, repo: &Path, mode: ResetMode, target: &str) -> Result<()>;

    async fn diff(&self, repo: &Path, staged: bool) -> Result<String>;
}

/// Result of a stage-commit-push cycle
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub message: String,
    pub commit_id: Option<String>,
    pub changes: usize,
    pub pushed: bool,
}

/// Stage everything, commit and push to the first configured remote.
///
/// Returns early without committing when nothing ends up staged.
pub async fn save(vcs: &dyn Vcs, repo: &Path, message: &str) -> Result<SaveOutcome> {
    vcs.stage_all(repo).await?;

    let staged = vcs.staged_files(repo).await?;
    if staged.is_empty() {
        debug!(repo = %repo.display(), "Nothing staged, skipping commit");
        return Ok(SaveOutcome {
            message: "No changes to commit".to_string(),
            commit_id: None,
            changes: 0,
            pushed: false,
        });
    }

    let commit_id = vcs.commit(repo, message).await?;
    info!(
        repo = %repo.display(),
        commit = %commit_id,
        changes = staged.len(),
        "Committed changes"
    );

    let remotes = vcs.remotes(repo).await?;
    let pushed = match remotes.iter().find(|r| r.name == "origin").or(remotes.first()) {
        Some(remote) => {
            vcs.push(repo, &remote.name).await?;
            true
        }
        None => {
            warn!(repo = %repo.display(), "No remote configured, commit kept local");
            false
        }
    };

    Ok(SaveOutcome {
        message: if pushed {
            "Changes committed and pushed".to_string()
        } else {
            "Changes committed".to_string()
        },
        commit_id: Some(commit_id),
        changes: staged.len(),
        pushed,
    })
}

/// Reject ref names and remotes that git would read as options or that carry
/// whitespace or control characters.
pub fn validate_ref_arg(value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.starts_with('-') {
        return Err(format!("'{}' must not start with '-'", value));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("'{}' must not contain whitespace", value));
    }
    Ok(())
}

/// [`Vcs`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
    clone_timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration, clone_timeout: Duration) -> Self {
        Self {
            timeout,
            clone_timeout,
        }
    }

    pub fn from_config(config: &crate::config::GitConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.clone_timeout_secs),
        )
    }

    fn command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir)
            // Never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run git in `dir` and return stdout, failing on non-zero exit.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        self.run_with_timeout(dir, args, self.timeout).await
    }

    async fn run_with_timeout(&self, dir: &Path, args: &[&str], limit: Duration) -> Result<String> {
        let subcommand = args.first().copied().unwrap_or("git");
        let mut cmd = self.command(dir);
        cmd.args(args);

        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("git {} timed out after {}s", subcommand, limit.as_secs())
            })?
            .with_context(|| format!("Failed to run git {}", subcommand))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "git {} failed: {}",
                subcommand,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::from_config(&crate::config::GitConfig::default())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Clone target has no parent: {}", dest.display()))?;
        // Relative to `parent`, which is the working directory of the command
        let dest_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid clone target: {}", dest.display()))?;

        info!(url = %url, path = %dest.display(), "Cloning repository");
        self.run_with_timeout(parent, &["clone", "--", url, dest_name], self.clone_timeout)
            .await?;
        Ok(())
    }

    async fn is_repository(&self, path: &Path) -> bool {
        match self.run(path, &["rev-parse", "--show-toplevel"]).await {
            Ok(top) => {
                let top = Path::new(top.trim());
                match (top.canonicalize(), path.canonicalize()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
            Err(_) => false,
        }
    }

    async fn status(&self, repo: &Path) -> Result<RepoStatus> {
        let out = self
            .run(repo, &["status", "--porcelain=v1", "--branch", "--untracked-files=all"])
            .await?;
        Ok(status::parse_status(&out))
    }

    async fn branches(&self, repo: &Path) -> Result<(Option<String>, Vec<String>)> {
        let out = self
            .run(repo, &["branch", "--format=%(HEAD)%(refname:short)"])
            .await?;
        Ok(status::parse_branches(&out))
    }

    async fn remotes(&self, repo: &Path) -> Result<Vec<Remote>> {
        let out = self.run(repo, &["remote", "-v"]).await?;
        Ok(status::parse_remotes(&out))
    }

    async fn log(&self, repo: &Path, limit: usize) -> Result<Vec<CommitInfo>> {
        let count = format!("-n{}", limit);
        match self.run(repo, &["log", count.as_str(), status::LOG_FORMAT]).await {
            Ok(out) => Ok(status::parse_log(&out)),
            // A repository without commits has no log
            Err(e) if e.to_string().contains("does not have any commits") => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn stage_all(&self, repo: &Path) -> Result<()> {
        self.run(repo, &["add", "-A"]).await?;
        Ok(())
    }

    async fn staged_files(&self, repo: &Path) -> Result<Vec<String>> {
        let out = self.run(repo, &["diff", "--cached", "--name-only"]).await?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<String> {
        self.run(repo, &["commit", "-m", message]).await?;
        let head = self.run(repo, &["rev-parse", "HEAD"]).await?;
        Ok(head.trim().to_string())
    }

    async fn push(&self, repo: &Path, remote: &str) -> Result<()> {
        info!(repo = %repo.display(), remote = %remote, "Pushing");
        self.run_with_timeout(repo, &["push", remote, "HEAD"], self.clone_timeout)
            .await?;
        Ok(())
    }

    async fn pull(&self, repo: &Path, remote: &str, branch: Option<&str>) -> Result<String> {
        let mut args = vec!["pull", remote];
        if let Some(branch) = branch {
            args.push(branch);
        }
        let out = self.run_with_timeout(repo, &args, self.clone_timeout).await?;
        Ok(out.trim().to_string())
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<()> {
        self.run(repo, &["checkout", "-b", branch]).await?;
        Ok(())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<()> {
        self.run(repo, &["checkout", branch]).await?;
        Ok(())
    }

    async fn reset(&self, repo: &Path, mode: ResetMode, target: &str) -> Result<()> {
        self.run(repo, &["reset", mode.as_flag(), target, "--"]).await?;
        Ok(())
    }

    async fn diff(&self, repo: &Path, staged: bool) -> Result<String> {
        let args: &[&str] = if staged {
            &["diff", "--cached"]
        } else {
            &["diff"]
        };
        self.run(repo, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn setup_test_repo() -> Result<(TempDir, PathBuf)> {
        let temp = TempDir::new()?;
        let repo_path = temp.path().join("repo");
        std::fs::create_dir_all(&repo_path)?;

        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            StdCommand::new("git")
                .args(&args)
                .current_dir(&repo_path)
                .output()?;
        }

        std::fs::write(repo_path.join("README.md"), "# Test")?;
        StdCommand::new("git")
            .args(["add", "."])
            .current_dir(&repo_path)
            .output()?;
        StdCommand::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(&repo_path)
            .output()?;

        Ok((temp, repo_path))
    }

    #[test]
    fn ref_args_are_validated() {
        assert!(validate_ref_arg("feature/login").is_ok());
        assert!(validate_ref_arg("HEAD~1").is_ok());
        assert!(validate_ref_arg("--upload-pack=evil").is_err());
        assert!(validate_ref_arg("two words").is_err());
        assert!(validate_ref_arg("").is_err());
    }

    #[test]
    fn reset_mode_parsing() {
        assert_eq!(ResetMode::parse("HARD"), Some(ResetMode::Hard));
        assert_eq!(ResetMode::default(), ResetMode::Mixed);
        assert_eq!(ResetMode::parse("keep"), None);
    }

    #[tokio::test]
    async fn save_without_changes_short_circuits() -> Result<()> {
        let (_temp, repo) = setup_test_repo()?;
        let git = GitCli::default();

        let outcome = save(&git, &repo, "nothing").await?;
        assert_eq!(outcome.message, "No changes to commit");
        assert!(outcome.commit_id.is_none());
        assert_eq!(git.log(&repo, 10).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn save_commits_locally_without_remote() -> Result<()> {
        let (_temp, repo) = setup_test_repo()?;
        let git = GitCli::default();
        std::fs::write(repo.join("notes.txt"), "hello")?;

        let outcome = save(&git, &repo, "add notes").await?;
        assert_eq!(outcome.changes, 1);
        assert!(!outcome.pushed);
        let log = git.log(&repo, 10).await?;
        assert_eq!(log[0].message, "add notes");
        assert_eq!(Some(log[0].hash.clone()), outcome.commit_id);
        Ok(())
    }

    #[tokio::test]
    async fn status_and_branches_reflect_worktree() -> Result<()> {
        let (_temp, repo) = setup_test_repo()?;
        let git = GitCli::default();
        std::fs::write(repo.join("untracked.txt"), "x")?;
        std::fs::write(repo.join("README.md"), "# Changed")?;

        let status = git.status(&repo).await?;
        assert_eq!(status.current_branch.as_deref(), Some("main"));
        assert_eq!(status.untracked, vec!["untracked.txt"]);
        assert_eq!(status.modified, vec!["README.md"]);

        git.create_branch(&repo, "feature").await?;
        let (current, branches) = git.branches(&repo).await?;
        assert_eq!(current.as_deref(), Some("feature"));
        assert!(branches.contains(&"main".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn non_repository_is_detected() -> Result<()> {
        let temp = TempDir::new()?;
        let git = GitCli::default();
        assert!(!git.is_repository(temp.path()).await);
        Ok(())
    }
}
