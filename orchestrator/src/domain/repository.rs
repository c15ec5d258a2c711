use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{now_ms, IndexValue, Record};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle state of a [`Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    #[default]
    Active,
    Deleted,
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// An uploaded repository. `local_path` is a content-addressed directory
/// name (hash of the upload) and only exists on disk while `status` is
/// [`RepositoryStatus::Active`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub display_name: String,
    pub full_name: String,
    pub content_hash: String,
    pub local_path: String,
    pub status: RepositoryStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Repository {
    pub fn new(display_name: impl Into<String>, full_name: impl Into<String>, content_hash: impl Into<String>) -> Self {
        let now = now_ms();
        let content_hash = content_hash.into();
        Self {
            id: Uuid::now_v7().to_string(),
            display_name: display_name.into(),
            full_name: full_name.into(),
            local_path: content_hash.clone(),
            content_hash,
            status: RepositoryStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Soft-delete: flip status, but keep rows. `local_path` is no longer
    /// considered to exist on disk once this is set.
    pub fn mark_deleted(&mut self) {
        debug!(id = %self.id, "Repository::mark_deleted");
        self.status = RepositoryStatus::Deleted;
        self.updated_at = now_ms();
    }

    pub fn is_active(&self) -> bool {
        self.status == RepositoryStatus::Active
    }
}

impl Record for Repository {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "repositories"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("full_name".to_string(), IndexValue::String(self.full_name.clone()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert(
            "content_hash".to_string(),
            IndexValue::String(self.content_hash.clone()),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_repository_is_active_with_content_addressed_path() {
        let repo = Repository::new("My Repo", "alice/my-repo", "abc123");
        assert!(repo.is_active());
        assert_eq!(repo.local_path, "abc123");
    }

    #[test]
    fn mark_deleted_flips_status() {
        let mut repo = Repository::new("My Repo", "alice/my-repo", "abc123");
        repo.mark_deleted();
        assert!(!repo.is_active());
        assert_eq!(repo.status, RepositoryStatus::Deleted);
    }

    #[test]
    fn indexed_fields_cover_uniqueness_and_dedup_lookups() {
        let repo = Repository::new("My Repo", "alice/my-repo", "abc123");
        let fields = repo.indexed_fields();
        assert_eq!(
            fields.get("full_name"),
            Some(&IndexValue::String("alice/my-repo".to_string()))
        );
        assert_eq!(fields.get("content_hash"), Some(&IndexValue::String("abc123".to_string())));
    }
}
