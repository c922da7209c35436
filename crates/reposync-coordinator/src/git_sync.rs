//! Working-copy sync using the `git` command line.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::collaborators::WorkingCopySync;
use crate::error::CollaboratorError;

/// Runs `git pull --ff-only` in the local clone.
#[derive(Debug, Clone)]
pub struct GitCliSync {
    program: String,
    remote: String,
}

impl Default for GitCliSync {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl GitCliSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different git executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Pull from a remote other than `origin`.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }
}

#[async_trait]
impl WorkingCopySync for GitCliSync {
    async fn pull(&self, local_path: &Path, branch: &str) -> Result<(), CollaboratorError> {
        debug!(path = %local_path.display(), branch = %branch, "Pulling working copy");

        let output = Command::new(&self.program)
            .arg("-C")
            .arg(local_path)
            .args(["pull", "--ff-only", &self.remote, branch])
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                path = %local_path.display(),
                branch = %branch,
                status = %output.status,
                "git pull failed"
            );
            return Err(CollaboratorError::Command(format!(
                "git pull exited with {}: {}",
                output.status, stderr
            )));
        }

        Ok(())
    }
}
