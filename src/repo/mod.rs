//! Repository references and local path resolution
//!
//! A repository is addressed either by a short name, which maps directly to
//! `<reposRoot>/<name>`, or by a remote URL, which is cloned on first use.

pub mod files;
pub mod index;
pub mod locks;

pub use locks::{RepoGuard, RepoLocks};

use crate::error::{RelayError, RelayResult};
use crate::git::Vcs;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

/// Name used when a URL has no usable final segment
pub const UNKNOWN_REPO: &str = "unknown-repo";

static REMOTE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https?://[A-Za-z0-9.-]+(?::\d+)?/|git@[A-Za-z0-9.-]+(?::\d+)?[:/])[A-Za-z0-9._~/-]+?(?:\.git)?/?$",
    )
    .expect("remote URL pattern is valid")
});

/// A user-supplied repository identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryReference {
    Name(String),
    Url(String),
}

impl RepositoryReference {
    pub fn parse(raw: &str) -> RelayResult<Self> {
        let raw = raw.trim();
        if looks_like_url(raw) {
            if !is_valid_url(raw) {
                return Err(RelayError::InvalidReference(format!(
                    "'{}' is not a valid git URL",
                    raw
                )));
            }
            return Ok(Self::Url(raw.to_string()));
        }
        validate_name(raw)?;
        Ok(Self::Name(raw.to_string()))
    }

    /// Local directory name for this reference
    pub fn repo_name(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Url(url) => repo_name_from_url(url),
        }
    }
}

fn looks_like_url(raw: &str) -> bool {
    raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with("git@")
}

pub fn is_valid_url(raw: &str) -> bool {
    REMOTE_URL.is_match(raw)
}

/// Final path segment of a remote URL without its `.git` suffix.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default();
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        UNKNOWN_REPO.to_string()
    } else {
        name.to_string()
    }
}

/// A short name must stay a single path component.
pub fn validate_name(name: &str) -> RelayResult<()> {
    if name.is_empty() {
        return Err(RelayError::InvalidReference(
            "repository name must not be empty".to_string(),
        ));
    }
    if name == "." || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(RelayError::InvalidReference(format!(
            "'{}' is not a valid repository name",
            name
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(RelayError::InvalidReference(
            "repository name contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// Outcome of an explicit clone request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClonedRepository {
    pub repo_name: String,
    pub path: PathBuf,
    pub url: String,
}

/// Maps repository references to directories under the repos root
#[derive(Clone)]
pub struct PathResolver {
    repos_root: PathBuf,
    vcs: Arc<dyn Vcs>,
    locks: RepoLocks,
}

impl PathResolver {
    pub fn new(repos_root: impl AsRef<Path>, vcs: Arc<dyn Vcs>, locks: RepoLocks) -> Self {
        let root = repos_root.as_ref();
        let repos_root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            repos_root,
            vcs,
            locks,
        }
    }

    pub fn repos_root(&self) -> &Path {
        &self.repos_root
    }

    pub fn vcs(&self) -> &Arc<dyn Vcs> {
        &self.vcs
    }

    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    /// `<reposRoot>/<name>`, without touching the filesystem.
    pub fn path_for_name(&self, name: &str) -> RelayResult<PathBuf> {
        validate_name(name)?;
        Ok(self.repos_root.join(name))
    }

    /// Resolve a name or URL to a local path, cloning URLs that are not
    /// present yet. Names are never checked for existence.
    pub async fn resolve(&self, reference: &str) -> RelayResult<PathBuf> {
        match RepositoryReference::parse(reference)? {
            RepositoryReference::Name(name) => self.path_for_name(&name),
            RepositoryReference::Url(url) => self.clone_or_fetch(&url).await,
        }
    }

    /// [`resolve`](Self::resolve) followed by an existence check.
    pub async fn resolve_existing(&self, reference: &str) -> RelayResult<PathBuf> {
        let path = self.resolve(reference).await?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(RelayError::NotFound(format!(
                "Repository not found: {}",
                reference
            )));
        }
        Ok(path)
    }

    /// Return the local clone of `url`, cloning it when absent.
    pub async fn clone_or_fetch(&self, url: &str) -> RelayResult<PathBuf> {
        let target = self.clone_target(url)?;
        let _guard = self.locks.lock(&target).await;

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(target);
        }
        self.clone_into(url, &target).await?;
        Ok(target)
    }

    /// Clone `url`, failing with `AlreadyExists` if its directory is present.
    pub async fn init(&self, url: &str) -> RelayResult<ClonedRepository> {
        let url = url.trim();
        if !is_valid_url(url) {
            return Err(RelayError::InvalidReference(format!(
                "'{}' is not a valid git URL",
                url
            )));
        }
        let target = self.clone_target(url)?;
        let repo_name = repo_name_from_url(url);

        let _guard = self.locks.lock(&target).await;
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(RelayError::AlreadyExists(repo_name));
        }
        self.clone_into(url, &target).await?;

        Ok(ClonedRepository {
            repo_name,
            path: target,
            url: url.to_string(),
        })
    }

    fn clone_target(&self, url: &str) -> RelayResult<PathBuf> {
        let name = repo_name_from_url(url);
        self.path_for_name(&name)
    }

    async fn clone_into(&self, url: &str, target: &Path) -> RelayResult<()> {
        tokio::fs::create_dir_all(&self.repos_root).await?;

        if let Err(cause) = self.vcs.clone_repo(url, target).await {
            warn!(url = %url, error = %cause, "Clone failed");
            // A half-written clone must not be mistaken for a finished one
            if tokio::fs::try_exists(target).await.unwrap_or(false) {
                if let Err(e) = tokio::fs::remove_dir_all(target).await {
                    warn!(path = %target.display(), error = %e, "Failed to remove partial clone");
                }
            }
            return Err(RelayError::CloneFailure(cause));
        }

        info!(url = %url, path = %target.display(), "Repository cloned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{CommitInfo, Remote, RepoStatus, ResetMode};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Records clones and fakes them by creating the directory
    #[derive(Default)]
    struct CountingVcs {
        clones: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Vcs for CountingVcs {
        async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<()> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dest)?;
            if self.fail {
                anyhow::bail!("fatal: could not read Username");
            }
            Ok(())
        }
        async fn is_repository(&self, _: &Path) -> bool {
            true
        }
        async fn status(&self, _: &Path) -> Result<RepoStatus> {
            Ok(RepoStatus::default())
        }
        async fn branches(&self, _: &Path) -> Result<(Option<String>, Vec<String>)> {
            Ok((None, Vec::new()))
        }
        async fn remotes(&self, _: &Path) -> Result<Vec<Remote>> {
            Ok(Vec::new())
        }
        async fn log(&self, _: &Path, _: usize) -> Result<Vec<CommitInfo>> {
            Ok(Vec::new())
        }
        async fn stage_all(&self, _: &Path) -> Result<()> {
            Ok(())
        }
        async fn staged_files(&self, _: &Path) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn commit(&self, _: &Path, _: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn push(&self, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }
        async fn pull(&self, _: &Path, _: &str, _: Option<&str>) -> Result<String> {
            Ok(String::new())
        }
        async fn create_branch(&self, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }
        async fn checkout(&self, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }
        async fn reset(&self, _: &Path, _: ResetMode, _: &str) -> Result<()> {
            Ok(())
        }
        async fn diff(&self, _: &Path, _: bool) -> Result<String> {
            Ok(String::new())
        }
    }

    fn resolver(root: &Path, vcs: Arc<CountingVcs>) -> PathResolver {
        PathResolver::new(root.join("repos"), vcs, RepoLocks::new())
    }

    #[test]
    fn repo_name_is_last_segment_without_git_suffix() {
        assert_eq!(repo_name_from_url("https://example.com/org/repo.git"), "repo");
        assert_eq!(repo_name_from_url("https://example.com/org/repo/"), "repo");
        assert_eq!(repo_name_from_url("git@github.com:org/tool.git"), "tool");
        assert_eq!(repo_name_from_url("https://example.com/.git"), UNKNOWN_REPO);
    }

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://example.com/org/repo.git"));
        assert!(is_valid_url("http://localhost:8080/org/repo"));
        assert!(is_valid_url("git@github.com:org/repo.git"));
        assert!(!is_valid_url("https://"));
        assert!(!is_valid_url("ftp://example.com/repo.git"));
        assert!(!is_valid_url("https://example.com/org/repo.git; rm -rf /"));
    }

    #[test]
    fn names_with_separators_are_rejected() {
        for bad in ["", ".", "..", "a/b", "..\\x", "../etc"] {
            assert!(
                matches!(
                    RepositoryReference::parse(bad),
                    Err(RelayError::InvalidReference(_))
                ),
                "{bad:?} should be rejected"
            );
        }
        assert_eq!(
            RepositoryReference::parse("my-repo").unwrap(),
            RepositoryReference::Name("my-repo".into())
        );
    }

    #[tokio::test]
    async fn name_resolution_is_pure() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(CountingVcs::default());
        let resolver = resolver(temp.path(), vcs.clone());

        let first = resolver.resolve("project").await.unwrap();
        let second = resolver.resolve("project").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, resolver.repos_root().join("project"));
        assert!(!resolver.repos_root().exists());
        assert_eq!(vcs.clones.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn url_resolution_clones_once() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(CountingVcs::default());
        let resolver = resolver(temp.path(), vcs.clone());
        let url = "https://example.com/org/repo.git";

        let first = resolver.resolve(url).await.unwrap();
        let second = resolver.resolve(url).await.unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("repo"));
        assert_eq!(vcs.clones.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_refuses_existing_directory() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(CountingVcs::default());
        let resolver = resolver(temp.path(), vcs.clone());
        let url = "https://example.com/org/repo.git";

        let cloned = resolver.init(url).await.unwrap();
        assert_eq!(cloned.repo_name, "repo");
        assert!(matches!(
            resolver.init(url).await,
            Err(RelayError::AlreadyExists(name)) if name == "repo"
        ));
    }

    #[tokio::test]
    async fn failed_clone_leaves_nothing_behind_and_retries() {
        let temp = TempDir::new().unwrap();
        let vcs = Arc::new(CountingVcs {
            fail: true,
            ..Default::default()
        });
        let resolver = resolver(temp.path(), vcs.clone());
        let url = "https://example.com/org/private.git";

        assert!(matches!(
            resolver.resolve(url).await,
            Err(RelayError::CloneFailure(_))
        ));
        assert!(!resolver.repos_root().join("private").exists());
        assert!(resolver.resolve(url).await.is_err());
        assert_eq!(vcs.clones.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn resolve_existing_reports_missing() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver(temp.path(), Arc::new(CountingVcs::default()));
        assert!(matches!(
            resolver.resolve_existing("ghost").await,
            Err(RelayError::NotFound(_))
        ));
    }
}
