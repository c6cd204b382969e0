//! Confined file access inside a repository directory
//!
//! Every requested path is resolved against the repository root and rejected
//! if, after normalisation and symlink resolution, it lands outside that root.

use crate::error::{BinaryFileInfo, RelayError, RelayResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Extensions always treated as text when the MIME probe is unavailable
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "adoc", "rs", "toml", "lock", "json", "jsonc", "yaml", "yml",
    "xml", "html", "htm", "css", "scss", "sass", "less", "js", "mjs", "cjs", "jsx", "ts", "tsx",
    "vue", "svelte", "py", "pyi", "rb", "go", "java", "kt", "kts", "scala", "swift", "c", "h",
    "cc", "cpp", "cxx", "hpp", "hh", "cs", "fs", "php", "pl", "pm", "lua", "r", "sql", "sh",
    "bash", "zsh", "fish", "ps1", "bat", "cmd", "ini", "cfg", "conf", "env", "properties", "gradle",
    "csv", "tsv", "svg", "graphql", "gql", "proto", "tf", "hcl", "dockerfile", "make", "mk",
    "cmake", "ex", "exs", "erl", "hrl", "elm", "hs", "clj", "cljs", "dart", "zig", "nim", "vim",
    "log", "patch", "diff", "gitignore", "gitattributes", "editorconfig",
];

/// Extension-less file names that are text by convention
const TEXT_FILE_NAMES: &[&str] = &[
    "Makefile",
    "Dockerfile",
    "LICENSE",
    "README",
    "CHANGELOG",
    "AUTHORS",
    "CODEOWNERS",
    "Procfile",
    "Gemfile",
    "Rakefile",
    "Jenkinsfile",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Directory,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// A text file read back to the caller
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub mime_type: String,
    pub content: String,
    pub encoding: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: bool,
}

/// Result of content classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub mime_type: String,
    pub is_binary: bool,
}

/// Resolve `requested` inside `root`, rejecting anything that escapes it.
///
/// Runs [`confine`] on the blocking pool.
pub async fn resolve_file(root: &Path, requested: &str) -> RelayResult<PathBuf> {
    let root = root.to_path_buf();
    let requested = requested.to_string();
    tokio::task::spawn_blocking(move || confine(&root, &requested))
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(e)))?
}

/// Blocking core of [`resolve_file`].
///
/// A leading separator is ignored, so `/a/b` and `a/b` address the same file.
/// The returned path is either the canonical root itself or starts with the
/// canonical root followed by a separator.
pub fn confine(root: &Path, requested: &str) -> RelayResult<PathBuf> {
    let canonical_root = root.canonicalize().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            RelayError::NotFound(format!("Repository not found: {}", root.display()))
        }
        _ => RelayError::Io(e),
    })?;

    let relative = requested.trim_start_matches(['/', '\\']);
    let mut lexical = canonical_root.clone();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => lexical.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RelayError::PathTraversal(requested.to_string()));
            }
        }
    }

    if !is_within(&canonical_root, &lexical) {
        debug!(requested = %requested, "Rejected path climbing out of repository");
        return Err(RelayError::PathTraversal(requested.to_string()));
    }

    // Follow symlinks on the part of the path that exists
    let resolved = canonicalize_existing_prefix(&lexical)?;
    if !is_within(&canonical_root, &resolved) {
        debug!(requested = %requested, "Rejected path outside repository");
        return Err(RelayError::PathTraversal(requested.to_string()));
    }
    Ok(resolved)
}

/// String-prefix containment on separator-normalised paths.
fn is_within(root: &Path, candidate: &Path) -> bool {
    let root = normalize_separators(root);
    let candidate = normalize_separators(candidate);
    let root = root.trim_end_matches('/');
    candidate == root || candidate.starts_with(&format!("{}/", root))
}

fn normalize_separators(path: &Path) -> String {
    path.to_string_lossy().replace(MAIN_SEPARATOR, "/")
}

/// Nothing exists at the path, including paths that continue below a file
fn is_absent(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    )
}

fn canonicalize_existing_prefix(path: &Path) -> RelayResult<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(real) => {
                let mut real = real;
                for part in missing.iter().rev() {
                    real.push(part);
                }
                return Ok(real);
            }
            Err(e) if is_absent(&e) => {
                match existing.file_name() {
                    Some(name) => missing.push(name.to_os_string()),
                    None => return Err(RelayError::Io(e)),
                }
                if !existing.pop() {
                    return Err(RelayError::Io(e));
                }
            }
            Err(e) => return Err(RelayError::Io(e)),
        }
    }
}

/// `path` relative to the already canonical `root`, `/`-separated
fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn modified_time(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Classify `path` as text or binary.
///
/// Asks the `file` utility first; when it is missing or fails, falls back to
/// the extension allow-list.
pub async fn detect_content_type(path: &Path) -> ContentType {
    match probe_mime(path).await {
        Some(probed) => probed,
        None => fallback_content_type(path),
    }
}

async fn probe_mime(path: &Path) -> Option<ContentType> {
    let mut cmd = Command::new("file");
    cmd.args(["--brief", "--mime"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        _ => return None,
    };
    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `file --brief --mime` output such as `text/plain; charset=us-ascii`.
fn parse_probe_output(output: &str) -> Option<ContentType> {
    let output = output.trim();
    if output.is_empty() {
        return None;
    }
    let (mime, params) = output.split_once(';').unwrap_or((output, ""));
    let mime = mime.trim().to_string();
    let charset = params
        .split(';')
        .filter_map(|p| p.trim().strip_prefix("charset="))
        .next()
        .unwrap_or("");

    // Empty files report charset=binary but read fine as text
    if mime == "inode/x-empty" {
        return Some(ContentType {
            mime_type: "text/plain".to_string(),
            is_binary: false,
        });
    }
    let is_binary = charset == "binary" && !mime.starts_with("text/");
    Some(ContentType {
        mime_type: mime,
        is_binary,
    })
}

fn fallback_content_type(path: &Path) -> ContentType {
    let guessed = mime_guess::from_path(path).first();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    let listed = match &extension {
        Some(ext) => TEXT_EXTENSIONS.contains(&ext.as_str()),
        None => TEXT_FILE_NAMES.contains(&file_name(path).as_str()),
    };
    // Dotfiles such as ".gitignore" have no extension from Path's point of view
    let dotfile = file_name(path)
        .strip_prefix('.')
        .is_some_and(|rest| TEXT_EXTENSIONS.contains(&rest.to_ascii_lowercase().as_str()));

    if listed || dotfile {
        return ContentType {
            mime_type: guessed
                .filter(|m| m.type_() == "text" || m.subtype() == "json" || m.subtype() == "xml")
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| "text/plain".to_string()),
            is_binary: false,
        };
    }

    match guessed {
        Some(mime) => ContentType {
            is_binary: mime.type_() != "text",
            mime_type: mime.essence_str().to_string(),
        },
        None => ContentType {
            mime_type: "application/octet-stream".to_string(),
            is_binary: true,
        },
    }
}

/// Read a text file. Binary files fail with `BinaryContentRejected`, which
/// carries the file's metadata instead of its content.
pub async fn read_file(root: &Path, requested: &str) -> RelayResult<FileContent> {
    let path = resolve_file(root, requested).await?;
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) if is_absent(&e) => {
            return Err(RelayError::NotFound(format!("File not found: {}", requested)));
        }
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        return Err(RelayError::InvalidRequest(format!(
            "'{}' is a directory",
            requested
        )));
    }

    let name = file_name(&path);
    let rel = relative_display(&tokio::fs::canonicalize(root).await?, &path);
    let modified = modified_time(&meta);
    let content_type = detect_content_type(&path).await;

    let binary = |mime_type: String| {
        RelayError::BinaryContentRejected(Box::new(BinaryFileInfo {
            name: name.clone(),
            path: rel.clone(),
            size: meta.len(),
            modified,
            mime_type,
        }))
    };

    if content_type.is_binary {
        return Err(binary(content_type.mime_type));
    }

    let bytes = tokio::fs::read(&path).await?;
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            warn!(path = %rel, "Classified as text but not valid UTF-8");
            return Err(binary(content_type.mime_type));
        }
    };

    Ok(FileContent {
        name: name.clone(),
        path: rel.clone(),
        size: meta.len(),
        modified,
        mime_type: content_type.mime_type,
        content,
        encoding: "utf-8",
    })
}

/// Create or overwrite a file, creating parent directories as needed.
///
/// `created` comes from an existence check made just before the write; a
/// concurrent writer can make it stale.
pub async fn write_file(root: &Path, requested: &str, content: &str) -> RelayResult<WriteOutcome> {
    let path = resolve_file(root, requested).await?;
    let canonical_root = tokio::fs::canonicalize(root).await?;
    if path == canonical_root {
        return Err(RelayError::InvalidRequest(
            "A file path is required".to_string(),
        ));
    }

    let existed = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => {
            return Err(RelayError::InvalidRequest(format!(
                "'{}' is a directory",
                requested
            )));
        }
        Ok(_) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => {
            return Err(RelayError::InvalidRequest(format!(
                "'{}' is below a file, not a directory",
                requested
            )));
        }
        Err(_) => false,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, content).await?;

    let meta = tokio::fs::metadata(&path).await?;
    Ok(WriteOutcome {
        path: relative_display(&canonical_root, &path),
        size: meta.len(),
        modified: modified_time(&meta),
        created: !existed,
    })
}

/// Recursively list `dir` (which must already be resolved inside `root`).
///
/// Hidden entries are skipped; unreadable subdirectories are left out of the
/// result instead of failing the listing.
pub async fn list_tree(root: &Path, dir: &Path) -> RelayResult<Vec<FileNode>> {
    let root = root.to_path_buf();
    let dir = dir.to_path_buf();
    let top = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<FileNode>> {
        let root = root.canonicalize()?;
        let entries = std::fs::read_dir(&dir)?;
        Ok(walk_entries(&root, entries))
    })
    .await
    .map_err(|e| RelayError::Io(std::io::Error::other(e)))??;
    Ok(top)
}

fn walk_entries(root: &Path, entries: std::fs::ReadDir) -> Vec<FileNode> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let rel = relative_display(root, &path);

        if file_type.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(children) => dirs.push(FileNode {
                    name,
                    path: rel,
                    node_type: NodeType::Directory,
                    size: None,
                    modified: None,
                    mime_type: None,
                    children: Some(walk_entries(root, children)),
                }),
                Err(e) => debug!(path = %rel, error = %e, "Skipping unreadable directory"),
            }
        } else {
            let meta = entry.metadata().ok();
            files.push(FileNode {
                mime_type: Some(
                    mime_guess::from_path(&path)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string(),
                ),
                name,
                path: rel,
                node_type: NodeType::File,
                size: meta.as_ref().map(|m| m.len()),
                modified: meta.as_ref().and_then(modified_time),
                children: None,
            });
        }
    }

    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    files.sort_by(|a, b| a.name.cmp(&b.name));
    dirs.extend(files);
    dirs
}
