use crate::error::VcsError;
use std::path::Path;

/// Detect the current branch name from HEAD.
///
/// Returns the short branch name (e.g., "main", "feat/auth"). Returns an
/// error if the repo cannot be opened or HEAD is detached — job submission
/// falls back to the repository's configured `default_ref` in that case.
pub fn detect_head_branch(repo_root: &Path) -> Result<String, VcsError> {
    let repo = git2::Repository::open(repo_root).map_err(|_| VcsError::NotGitRepo {
        path: repo_root.display().to_string(),
    })?;

    let head = repo
        .head()
        .map_err(|e| VcsError::GitError(format!("failed to read HEAD: {e}")))?;

    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| VcsError::GitError("HEAD is detached or unnamed".to_string()))
}

/// Check if a directory is a git repository.
pub fn is_git_repo(path: &Path) -> bool {
    git2::Repository::open(path).is_ok()
}

/// Get the current HEAD commit hash (short form, 12 characters).
pub fn detect_head_commit(repo_root: &Path) -> Result<String, VcsError> {
    let repo = git2::Repository::open(repo_root).map_err(|_| VcsError::NotGitRepo {
        path: repo_root.display().to_string(),
    })?;

    let head = repo
        .head()
        .map_err(|e| VcsError::GitError(format!("failed to read HEAD: {e}")))?;

    let commit = head
        .peel_to_commit()
        .map_err(|e| VcsError::GitError(format!("failed to peel to commit: {e}")))?;

    let oid = commit.id().to_string();
    Ok(oid[..12].to_string())
}

/// Resolve the effective ref for a job: explicit override, else current HEAD
/// branch, else the repository's configured default.
pub fn resolve_effective_ref(repo_root: &Path, r#ref: Option<&str>, default_ref: &str) -> String {
    if let Some(explicit) = r#ref {
        return explicit.to_string();
    }
    detect_head_branch(repo_root).unwrap_or_else(|_| default_ref.to_string())
}
