use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{now_ms, IndexValue, Record};
use uuid::Uuid;

/// The generated README for a task's repository. 1:1 with [`super::Task`]:
/// the Document stage either creates this once or overwrites its content
/// on a retry, it never produces a second one for the same task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadmeArtifact {
    pub id: String,
    pub task_id: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ReadmeArtifact {
    pub fn new(task_id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7().to_string(),
            task_id: task_id.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn replace_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = now_ms();
    }
}

impl Record for ReadmeArtifact {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "readme_artifacts"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_readme_is_keyed_by_task() {
        let readme = ReadmeArtifact::new("task-1", "# Hello");
        assert_eq!(readme.task_id, "task-1");
        assert_eq!(readme.content, "# Hello");
    }

    #[test]
    fn replace_content_updates_timestamp() {
        let mut readme = ReadmeArtifact::new("task-1", "# Hello");
        let before = readme.updated_at;
        readme.replace_content("# Updated");
        assert_eq!(readme.content, "# Updated");
        assert!(readme.updated_at >= before);
    }
}
