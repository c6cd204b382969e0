//! Route registry served by `/api/docs`

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteDoc {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const fn route(method: &'static str, path: &'static str, description: &'static str) -> RouteDoc {
    RouteDoc {
        method,
        path,
        description,
    }
}

/// Every route mounted by [`super::router`]; keep in sync when adding one.
pub const ROUTES: &[RouteDoc] = &[
    route("GET", "/health", "Liveness check"),
    route("GET", "/api/docs", "This route listing"),
    route("POST", "/git/init", "Clone a repository from a remote URL"),
    route("GET", "/git/repos", "List local repositories with their status"),
    route("GET", "/git/status/{repo}", "Working tree status, branches and remotes"),
    route("POST", "/git/save", "Stage everything, commit and push"),
    route("POST", "/git/pull", "Pull from a remote"),
    route("POST", "/git/branch", "Create and check out a branch, or list branches"),
    route("POST", "/git/checkout", "Check out an existing branch"),
    route("GET", "/git/log/{repo}", "Recent commits (?limit=, default 10, max 100)"),
    route("POST", "/git/reset", "Reset to a target (soft, mixed or hard)"),
    route("GET", "/git/diff/{repo}", "Unified diff (?staged=true for the index)"),
    route("DELETE", "/git/repo/{repo}", "Delete a local repository"),
    route("GET", "/git/repos/{name}/files", "File tree of a repository"),
    route("GET", "/git/repos/{name}/files/{*path}", "Read a file or list a directory"),
    route("PUT", "/git/repos/{name}/files/{*path}", "Create or overwrite a file"),
    route("POST", "/claude/sessions", "Create a conversation session"),
    route("GET", "/claude/sessions", "List sessions"),
    route("GET", "/claude/sessions/{id}", "Fetch a session with its messages"),
    route("DELETE", "/claude/sessions/{id}", "Delete a session"),
    route("POST", "/claude/prompt", "Send a prompt to the coding assistant"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn routes_are_unique() {
        let seen: HashSet<_> = ROUTES.iter().map(|r| (r.method, r.path)).collect();
        assert_eq!(seen.len(), ROUTES.len());
    }
}
