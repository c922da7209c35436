//! Update pipeline delegated to an external program.
//!
//! The program receives a JSON request on stdin:
//!
//! ```json
//! {"repository": "my-api", "local_path": "/srv/my-api",
//!  "base_sha": "abc1234", "head_sha": "def5678",
//!  "files": [{"path": "src/lib.rs", "kind": "modified"}]}
//! ```
//!
//! and must print `{"stats": {...}, "errors": [...]}` on stdout. Per-file
//! failures belong in `errors`; a non-zero exit fails the whole run.
//!
//! The request is streamed while stdout and stderr are drained, so a program
//! that logs before it has read all of its input cannot stall the run.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use reposync_types::{ChangedFile, PipelineSettings};

use crate::collaborators::{PipelineOptions, PipelineOutput, UpdatePipeline};
use crate::error::CollaboratorError;

#[derive(Serialize)]
struct PipelineRequest<'a> {
    #[serde(flatten)]
    options: &'a PipelineOptions,
    files: &'a [ChangedFile],
}

/// Runs a configured program for each update.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
}

impl CommandPipeline {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from settings; `None` when no program is configured.
    pub fn from_settings(settings: &PipelineSettings) -> Option<Self> {
        settings
            .program
            .as_ref()
            .map(|program| Self::new(program.clone(), settings.args.clone()))
    }
}

#[async_trait]
impl UpdatePipeline for CommandPipeline {
    async fn process_changes(
        &self,
        files: &[ChangedFile],
        options: &PipelineOptions,
    ) -> Result<PipelineOutput, CollaboratorError> {
        let request = serde_json::to_vec(&PipelineRequest { options, files })?;

        debug!(
            program = %self.program,
            repository = %options.repository,
            files = files.len(),
            "Starting update pipeline"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&options.local_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let write_request = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&request).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (written, output) = tokio::join!(write_request, child.wait_with_output());
        let output = output?;

        match written {
            Ok(()) => {}
            // The program stopped reading; its exit status decides the run.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(
                    program = %self.program,
                    repository = %options.repository,
                    "Update pipeline closed stdin before the whole request was written"
                );
            }
            Err(e) => return Err(e.into()),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                program = %self.program,
                repository = %options.repository,
                status = %output.status,
                "Update pipeline exited unsuccessfully"
            );
            return Err(CollaboratorError::Command(format!(
                "{} exited with {}: {}",
                self.program, output.status, stderr
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    use reposync_types::ChangeKind;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> PipelineOptions {
        PipelineOptions {
            repository: "my-api".to_string(),
            local_path: dir.path().to_path_buf(),
            base_sha: "abc1234".to_string(),
            head_sha: "def5678".to_string(),
        }
    }

    fn sh(script: &str) -> CommandPipeline {
        CommandPipeline::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_reads_output_json() {
        let dir = TempDir::new().unwrap();
        let pipeline = sh(
            r#"cat > /dev/null; echo '{"stats": {"files_modified": 1, "chunks_upserted": 7}, "errors": []}'"#,
        );

        let output = pipeline
            .process_changes(
                &[ChangedFile::new("src/lib.rs", ChangeKind::Modified)],
                &options(&dir),
            )
            .await
            .unwrap();
        assert_eq!(output.stats.files_modified, 1);
        assert_eq!(output.stats.chunks_upserted, 7);
        assert!(output.errors.is_empty());
    }

    #[tokio::test]
    async fn test_request_written_to_stdin() {
        let dir = TempDir::new().unwrap();
        // Echo the request back as a file error so it can be inspected
        let pipeline = sh(
            r#"req=$(cat); case "$req" in *'"head_sha":"def5678"'*'"path":"a.rs"'*) ok=yes;; *) ok=no;; esac; echo "{\"errors\": [{\"path\": \"a.rs\", \"error\": \"$ok\"}]}""#,
        );

        let output = pipeline
            .process_changes(
                &[ChangedFile::new("a.rs", ChangeKind::Added)],
                &options(&dir),
            )
            .await
            .unwrap();
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].error, "yes");
    }

    fn many_files(count: usize) -> Vec<ChangedFile> {
        (0..count)
            .map(|i| {
                ChangedFile::new(
                    format!("services/billing/src/generated/client_{i:05}/mod.rs"),
                    ChangeKind::Modified,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_program_logging_before_reading_does_not_stall() {
        let dir = TempDir::new().unwrap();
        // 1 MiB of progress output on stderr before stdin is consumed
        let pipeline = sh(
            r#"head -c 1048576 /dev/zero | tr '\0' '.' >&2; cat > /dev/null; echo '{"stats": {"files_modified": 3000}}'"#,
        );
        let files = many_files(3_000);

        let output = tokio::time::timeout(
            Duration::from_secs(30),
            pipeline.process_changes(&files, &options(&dir)),
        )
        .await
        .expect("pipeline stalled")
        .unwrap();
        assert_eq!(output.stats.files_modified, 3_000);
    }

    #[tokio::test]
    async fn test_program_ignoring_stdin_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let pipeline = sh(r#"echo '{"stats": {"chunks_deleted": 2}}'"#);

        let output = pipeline
            .process_changes(&many_files(3_000), &options(&dir))
            .await
            .unwrap();
        assert_eq!(output.stats.chunks_deleted, 2);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_fatal() {
        let dir = TempDir::new().unwrap();
        let pipeline = sh("cat > /dev/null; echo 'embedding backend down' >&2; exit 3");

        let err = pipeline.process_changes(&[], &options(&dir)).await.unwrap_err();
        match err {
            CollaboratorError::Command(message) => {
                assert!(message.contains("embedding backend down"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_output_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = sh("cat > /dev/null; echo 'not json'");

        let err = pipeline.process_changes(&[], &options(&dir)).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Serialization(_)));
    }

    #[test]
    fn test_from_settings() {
        assert!(CommandPipeline::from_settings(&PipelineSettings::default()).is_none());

        let settings = PipelineSettings {
            program: Some("reindex".to_string()),
            args: vec!["--incremental".to_string()],
        };
        let pipeline = CommandPipeline::from_settings(&settings).unwrap();
        assert_eq!(pipeline.program, "reindex");
        assert_eq!(pipeline.args, vec!["--incremental".to_string()]);
    }
}
