//! In-process metadata store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use reposync_types::RepositorySnapshot;

use crate::collaborators::MetadataStore;
use crate::error::CollaboratorError;

/// Metadata store backed by a map. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    repositories: RwLock<HashMap<String, RepositorySnapshot>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `snapshots`.
    pub fn with_repositories(snapshots: impl IntoIterator<Item = RepositorySnapshot>) -> Self {
        let repositories = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.name.clone(), snapshot))
            .collect();
        Self {
            repositories: RwLock::new(repositories),
        }
    }

    /// Insert or replace a snapshot.
    pub fn insert(&self, snapshot: RepositorySnapshot) {
        self.repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.name.clone(), snapshot);
    }

    /// Snapshot for `name`, if present.
    pub fn get(&self, name: &str) -> Option<RepositorySnapshot> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_repository(
        &self,
        name: &str,
    ) -> Result<Option<RepositorySnapshot>, CollaboratorError> {
        Ok(self.get(name))
    }

    async fn update_repository(
        &self,
        snapshot: &RepositorySnapshot,
    ) -> Result<(), CollaboratorError> {
        self.insert(snapshot.clone());
        Ok(())
    }
}
