//! Repository URL parsing.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Owner and name of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Parses `https://github.com/owner/repo(.git)` or a bare `owner/repo`.
pub fn parse_repo_url(input: &str) -> Result<RepoRef> {
    let input = input.trim();
    let invalid = || SyncError::Validation(format!("Invalid repository URL: '{}'", input));

    if let Ok(url) = Url::parse(input) {
        let parts: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if parts.len() < 2 {
            return Err(invalid());
        }
        let repo = parts[1].strip_suffix(".git").unwrap_or(parts[1]);
        if repo.is_empty() {
            return Err(invalid());
        }
        return Ok(RepoRef::new(parts[0], repo));
    }

    match input.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(RepoRef::new(*owner, *repo)),
        _ => Err(invalid()),
    }
}
