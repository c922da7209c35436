//! Metadata store persisted as a single JSON document.
//!
//! The file maps repository name to snapshot. Writes are serialised by an
//! async mutex and land via a temp file renamed over the original, so a
//! reader never observes a half-written document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use reposync_types::RepositorySnapshot;

use crate::collaborators::MetadataStore;
use crate::error::CollaboratorError;

type Document = BTreeMap<String, RepositorySnapshot>;

/// JSON-file metadata store.
#[derive(Debug)]
pub struct JsonMetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored snapshots, ordered by name.
    pub async fn list_repositories(&self) -> Result<Vec<RepositorySnapshot>, CollaboratorError> {
        Ok(self.read_document().await?.into_values().collect())
    }

    async fn read_document(&self) -> Result<Document, CollaboratorError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &Document) -> Result<(), CollaboratorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn get_repository(
        &self,
        name: &str,
    ) -> Result<Option<RepositorySnapshot>, CollaboratorError> {
        Ok(self.read_document().await?.remove(name))
    }

    async fn update_repository(
        &self,
        snapshot: &RepositorySnapshot,
    ) -> Result<(), CollaboratorError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        document.insert(snapshot.name.clone(), snapshot.clone());
        self.write_document(&document).await?;

        debug!(
            repository = %snapshot.name,
            path = %self.path.display(),
            "Repository metadata written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(name: &str) -> RepositorySnapshot {
        RepositorySnapshot::new(
            name,
            format!("https://github.com/acme/{name}"),
            "main",
            format!("/srv/{name}"),
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonMetadataStore::new(dir.path().join("repositories.json"));

        assert!(store.get_repository("my-api").await.unwrap().is_none());
        assert!(store.list_repositories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("repositories.json");
        let store = JsonMetadataStore::new(&path);

        store.update_repository(&snapshot("web")).await.unwrap();
        store
            .update_repository(&snapshot("api").with_indexed_commit("abc1234"))
            .await
            .unwrap();

        let api = store.get_repository("api").await.unwrap().unwrap();
        assert_eq!(api.last_indexed_commit_sha.as_deref(), Some("abc1234"));

        let names: Vec<String> = store
            .list_repositories()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["api".to_string(), "web".to_string()]);

        // No temp file left behind
        assert!(!dir.path().join("nested").join("repositories.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reopen_sees_previous_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repositories.json");

        JsonMetadataStore::new(&path)
            .update_repository(&snapshot("api").with_counts(3, 30))
            .await
            .unwrap();

        let reopened = JsonMetadataStore::new(&path);
        let api = reopened.get_repository("api").await.unwrap().unwrap();
        assert_eq!(api.chunk_count, 30);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repositories.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonMetadataStore::new(&path);
        let err = store.get_repository("api").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Serialization(_)));
    }
}
