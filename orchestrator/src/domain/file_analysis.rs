use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{now_ms, IndexValue, Record};
use uuid::Uuid;

/// Terminal-ness of a single file's analysis within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileAnalysisStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for FileAnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One file's worth of analysis result within a [`super::Task`]. Keyed by
/// `(task_id, path)` at the store layer — the upsert policy there
/// (preserve a prior `Success`, never overwrite it with a later retry's
/// `Failed`) is what makes the pipeline's retry loop safe, not anything
/// enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub id: String,
    pub task_id: String,
    pub path: String,
    pub language: Option<String>,
    pub size: u64,
    pub code_lines: u64,
    pub status: FileAnalysisStatus,
    pub summary: Option<String>,
    pub dependencies: Vec<String>,
    pub error: Option<String>,
    pub attempt: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FileAnalysis {
    pub fn new(task_id: impl Into<String>, path: impl Into<String>, language: Option<String>, size: u64, code_lines: u64) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7().to_string(),
            task_id: task_id.into(),
            path: path.into(),
            language,
            size,
            code_lines,
            status: FileAnalysisStatus::Pending,
            summary: None,
            dependencies: Vec::new(),
            error: None,
            attempt: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_success(&mut self, summary: impl Into<String>, dependencies: Vec<String>) {
        self.status = FileAnalysisStatus::Success;
        self.summary = Some(summary.into());
        self.dependencies = dependencies;
        self.error = None;
        self.updated_at = now_ms();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = FileAnalysisStatus::Failed;
        self.error = Some(error.into());
        self.attempt += 1;
        self.updated_at = now_ms();
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, FileAnalysisStatus::Pending)
    }
}

impl Record for FileAnalysis {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "file_analyses"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert("path".to_string(), IndexValue::String(self.path.clone()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_analysis_is_pending() {
        let fa = FileAnalysis::new("task-1", "src/a.rs", Some("rust".to_string()), 128, 10);
        assert_eq!(fa.status, FileAnalysisStatus::Pending);
        assert_eq!(fa.size, 128);
        assert_eq!(fa.code_lines, 10);
        assert!(!fa.is_terminal());
    }

    #[test]
    fn mark_failed_increments_attempt_and_keeps_error() {
        let mut fa = FileAnalysis::new("task-1", "src/a.rs", None, 0, 0);
        fa.mark_failed("boom");
        assert_eq!(fa.attempt, 1);
        assert_eq!(fa.status, FileAnalysisStatus::Failed);
        assert_eq!(fa.error.as_deref(), Some("boom"));
    }

    #[test]
    fn mark_success_clears_any_prior_error_and_records_dependencies() {
        let mut fa = FileAnalysis::new("task-1", "src/a.rs", None, 0, 0);
        fa.mark_failed("boom");
        fa.mark_success("looks good", vec!["serde".to_string()]);
        assert_eq!(fa.status, FileAnalysisStatus::Success);
        assert!(fa.error.is_none());
        assert_eq!(fa.dependencies, vec!["serde".to_string()]);
        assert!(fa.is_terminal());
    }

    #[test]
    fn indexed_fields_support_task_and_path_lookup() {
        let fa = FileAnalysis::new("task-1", "src/a.rs", None, 0, 0);
        let fields = fa.indexed_fields();
        assert_eq!(fields.get("task_id"), Some(&IndexValue::String("task-1".to_string())));
        assert_eq!(fields.get("path"), Some(&IndexValue::String("src/a.rs".to_string())));
    }
}
