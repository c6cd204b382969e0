//! Parsers for git's machine-readable output.

use serde::{Deserialize, Serialize};

/// Working-tree summary of a repository
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    pub current_branch: Option<String>,
    pub tracking_branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub deleted: Vec<String>,
}

impl RepoStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.deleted.is_empty()
    }

    pub fn changes(&self) -> ChangeCounts {
        ChangeCounts {
            staged: self.staged.len(),
            modified: self.modified.len(),
            untracked: self.untracked.len(),
            deleted: self.deleted.len(),
            total: self.staged.len()
                + self.modified.len()
                + self.untracked.len()
                + self.deleted.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeCounts {
    pub staged: usize,
    pub modified: usize,
    pub untracked: usize,
    pub deleted: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub email: String,
    pub date: String,
    pub message: String,
}

/// Field separator used in `--pretty=format:` strings
pub const LOG_FIELD_SEP: char = '\x1f';
pub const LOG_FORMAT: &str = "--pretty=format:%H%x1f%an%x1f%ae%x1f%aI%x1f%s";

/// Parse `git status --porcelain=v1 --branch`.
pub fn parse_status(output: &str) -> RepoStatus {
    let mut status = RepoStatus::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            continue;
        }
        if line.len() < 3 {
            continue;
        }
        let mut chars = line.chars();
        let (x, y) = match (chars.next(), chars.next()) {
            (Some(x), Some(y)) => (x, y),
            _ => continue,
        };
        let raw_path = &line[3..];
        // Renames and copies report "old -> new"
        let path = raw_path
            .rsplit_once(" -> ")
            .map(|(_, new)| new)
            .unwrap_or(raw_path)
            .trim_matches('"')
            .to_string();

        if x == '?' && y == '?' {
            status.untracked.push(path);
            continue;
        }
        if x == 'D' || y == 'D' {
            status.deleted.push(path.clone());
        }
        if matches!(x, 'M' | 'A' | 'R' | 'C' | 'T') {
            status.staged.push(path.clone());
        }
        if matches!(y, 'M' | 'T') {
            status.modified.push(path);
        }
    }

    status
}

fn parse_branch_header(header: &str, status: &mut RepoStatus) {
    // "## main...origin/main [ahead 1, behind 2]" or "## No commits yet on main"
    let (refs, counts) = match header.split_once(" [") {
        Some((refs, rest)) => (refs, Some(rest.trim_end_matches(']'))),
        None => (header, None),
    };

    if let Some(branch) = refs.strip_prefix("No commits yet on ") {
        status.current_branch = Some(branch.to_string());
    } else if refs.starts_with("HEAD (no branch)") {
        status.current_branch = None;
    } else {
        match refs.split_once("...") {
            Some((local, upstream)) => {
                status.current_branch = Some(local.to_string());
                status.tracking_branch = Some(upstream.to_string());
            }
            None => status.current_branch = Some(refs.to_string()),
        }
    }

    if let Some(counts) = counts {
        for part in counts.split(", ") {
            if let Some(n) = part.strip_prefix("ahead ") {
                status.ahead = n.trim().parse().unwrap_or(0);
            } else if let Some(n) = part.strip_prefix("behind ") {
                status.behind = n.trim().parse().unwrap_or(0);
            }
        }
    }
}

/// Parse `git remote -v`, keeping one entry per remote (the fetch URL).
pub fn parse_remotes(output: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        if remotes.iter().any(|r| r.name == name) {
            continue;
        }
        remotes.push(Remote {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
    remotes
}

/// Parse `git log` output produced with [`LOG_FORMAT`].
pub fn parse_log(output: &str) -> Vec<CommitInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(5, LOG_FIELD_SEP);
            Some(CommitInfo {
                hash: fields.next()?.to_string(),
                author: fields.next()?.to_string(),
                email: fields.next()?.to_string(),
                date: fields.next()?.to_string(),
                message: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Parse `git branch --format=%(HEAD)%(refname:short)`.
pub fn parse_branches(output: &str) -> (Option<String>, Vec<String>) {
    let mut current = None;
    let mut branches = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (is_head, name) = match line.strip_prefix('*') {
            Some(rest) => (true, rest.trim()),
            None => (false, line.trim()),
        };
        if name.starts_with('(') {
            // detached HEAD
            continue;
        }
        if is_head {
            current = Some(name.to_string());
        }
        branches.push(name.to_string());
    }
    (current, branches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_splits_changes_by_kind() {
        let out = "## main...origin/main [ahead 2, behind 1]\n\
                   M  src/lib.rs\n\
                   \x20M README.md\n\
                   MM both.rs\n\
                   A  new.rs\n\
                   \x20D gone.rs\n\
                   R  old.rs -> renamed.rs\n\
                   ?? scratch.txt\n";
        let status = parse_status(out);
        assert_eq!(status.current_branch.as_deref(), Some("main"));
        assert_eq!(status.tracking_branch.as_deref(), Some("origin/main"));
        assert_eq!((status.ahead, status.behind), (2, 1));
        assert_eq!(status.staged, vec!["src/lib.rs", "both.rs", "new.rs", "renamed.rs"]);
        assert_eq!(status.modified, vec!["README.md", "both.rs"]);
        assert_eq!(status.deleted, vec!["gone.rs"]);
        assert_eq!(status.untracked, vec!["scratch.txt"]);
        assert!(!status.is_clean());
        assert_eq!(status.changes().total, 8);
    }

    #[test]
    fn status_handles_fresh_repository() {
        let status = parse_status("## No commits yet on main\n");
        assert_eq!(status.current_branch.as_deref(), Some("main"));
        assert!(status.tracking_branch.is_none());
        assert!(status.is_clean());
    }

    #[test]
    fn status_without_upstream() {
        let status = parse_status("## feature/x\n");
        assert_eq!(status.current_branch.as_deref(), Some("feature/x"));
        assert_eq!((status.ahead, status.behind), (0, 0));
    }

    #[test]
    fn remotes_are_deduplicated() {
        let out = "origin\thttps://example.com/a.git (fetch)\n\
                   origin\thttps://example.com/a.git (push)\n\
                   upstream\tgit@example.com:b/a.git (fetch)\n";
        let remotes = parse_remotes(out);
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[1].name, "upstream");
    }

    #[test]
    fn log_fields_survive_separators_in_subject() {
        let line = "abc123\x1fAda\x1fada@example.com\x1f2024-01-01T00:00:00+00:00\x1ffix: a | b";
        let commits = parse_log(line);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "fix: a | b");
        assert_eq!(commits[0].email, "ada@example.com");
    }

    #[test]
    fn branches_report_head() {
        let (current, branches) = parse_branches(" develop\n*main\n (HEAD detached at 1234)\n");
        assert_eq!(current.as_deref(), Some("main"));
        assert_eq!(branches, vec!["develop", "main"]);
    }
}
