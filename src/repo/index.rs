//! Index of locally cloned repositories

use crate::git::{ChangeCounts, CommitInfo, Remote, Vcs};
use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Summary of one directory under the repos root
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySummary {
    pub name: String,
    pub path: PathBuf,
    pub is_git_repo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahead: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ChangeCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_clean: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<Remote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<CommitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepositorySummary {
    fn failed(name: String, path: PathBuf, error: String) -> Self {
        Self {
            name,
            path,
            is_git_repo: false,
            current_branch: None,
            tracking_branch: None,
            ahead: None,
            behind: None,
            changes: None,
            is_clean: None,
            remotes: Vec::new(),
            last_commit: None,
            error: Some(error),
        }
    }
}

/// Summarise every repository directory under `repos_root`.
///
/// Each directory is probed independently; a failure is reported inline
/// for that entry only. A missing root yields an empty list.
pub async fn list(repos_root: &Path, vcs: &dyn Vcs) -> std::io::Result<Vec<RepositorySummary>> {
    let mut read_dir = match tokio::fs::read_dir(repos_root).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push((name, entry.path()));
        }
    }

    let mut summaries = join_all(
        dirs.into_iter()
            .map(|(name, path)| async move { summarize(vcs, name, path).await }),
    )
    .await;
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(summaries)
}

async fn summarize(vcs: &dyn Vcs, name: String, path: PathBuf) -> RepositorySummary {
    if !vcs.is_repository(&path).await {
        return RepositorySummary::failed(name, path, "Not a git repository".to_string());
    }
    match probe(vcs, &path).await {
        Ok((status, remotes, last_commit)) => RepositorySummary {
            name,
            is_git_repo: true,
            current_branch: status.current_branch.clone(),
            tracking_branch: status.tracking_branch.clone(),
            ahead: Some(status.ahead),
            behind: Some(status.behind),
            changes: Some(status.changes()),
            is_clean: Some(status.is_clean()),
            remotes,
            last_commit,
            error: None,
            path,
        },
        Err(e) => {
            debug!(repo = %name, error = %e, "Repository probe failed");
            RepositorySummary::failed(name, path, format!("{:#}", e))
        }
    }
}

async fn probe(
    vcs: &dyn Vcs,
    path: &Path,
) -> Result<(crate::git::RepoStatus, Vec<Remote>, Option<CommitInfo>)> {
    let status = vcs.status(path).await?;
    let remotes = vcs.remotes(path).await?;
    let last_commit = vcs.log(path, 1).await?.into_iter().next();
    Ok((status, remotes, last_commit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitCli;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        Command::new("git").args(args).current_dir(dir).output().unwrap();
    }

    #[tokio::test]
    async fn missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let repos = list(&temp.path().join("absent"), &GitCli::default())
            .await
            .unwrap();
        assert!(repos.is_empty());
    }

    #[tokio::test]
    async fn failures_are_isolated_per_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let good = root.join("alpha");
        std::fs::create_dir_all(&good).unwrap();
        git(&good, &["init", "-b", "main"]);
        git(&good, &["config", "user.email", "test@test.com"]);
        git(&good, &["config", "user.name", "Test"]);
        std::fs::write(good.join("a.txt"), "a").unwrap();
        git(&good, &["add", "."]);
        git(&good, &["commit", "-m", "first"]);
        std::fs::write(good.join("b.txt"), "b").unwrap();

        std::fs::create_dir_all(root.join("beta")).unwrap();
        std::fs::create_dir_all(root.join(".cache")).unwrap();
        std::fs::write(root.join("stray.txt"), "not a dir").unwrap();

        let repos = list(root, &GitCli::default()).await.unwrap();
        assert_eq!(repos.len(), 2);

        let alpha = &repos[0];
        assert!(alpha.is_git_repo);
        assert_eq!(alpha.current_branch.as_deref(), Some("main"));
        assert_eq!(alpha.changes.unwrap().untracked, 1);
        assert_eq!(alpha.last_commit.as_ref().unwrap().message, "first");

        let beta = &repos[1];
        assert!(!beta.is_git_repo);
        assert!(beta.error.is_some());
    }
}
