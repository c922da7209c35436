//! Owner/repository extraction from source URLs.

use std::fmt;

/// Owner and repository name on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub repo: String,
}

impl RepositoryIdentity {
    /// Parse a clone URL.
    ///
    /// Accepted shapes:
    /// - `https://github.com/owner/repo` (optionally `.git`, trailing `/`, or extra path)
    /// - `ssh://git@github.com/owner/repo.git`
    /// - `git@github.com:owner/repo.git`
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();

        let path = if let Some((_, rest)) = url.split_once("://") {
            // Drop host (and any credentials) up to the first '/'.
            rest.split_once('/')?.1
        } else if let Some((host, path)) = url.split_once(':') {
            if !host.contains('@') && !host.contains('.') {
                return None;
            }
            path
        } else {
            return None;
        };

        let mut segments = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty());
        let owner = segments.next()?;
        let repo = segments.next()?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        if owner.is_empty() || repo.is_empty() {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
