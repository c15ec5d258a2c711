use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{now_ms, IndexValue, Record};
use uuid::Uuid;

/// One discrete finding produced while analyzing a file (a symbol, a
/// dependency edge, a note worth surfacing in the README). Append-only:
/// nothing in the pipeline ever mutates an existing item, it only adds
/// more for the same `file_analysis_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisItem {
    pub id: String,
    pub task_id: String,
    pub file_analysis_id: String,
    pub kind: String,
    pub title: String,
    pub detail: String,
    pub language: Option<String>,
    pub source_excerpt: Option<String>,
    pub code_snippet: Option<String>,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub created_at: i64,
}

impl AnalysisItem {
    pub fn new(
        task_id: impl Into<String>,
        file_analysis_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            task_id: task_id.into(),
            file_analysis_id: file_analysis_id.into(),
            kind: kind.into(),
            title: title.into(),
            detail: detail.into(),
            language: None,
            source_excerpt: None,
            code_snippet: None,
            start_line: None,
            end_line: None,
            created_at: now_ms(),
        }
    }

    /// Attaches the source location this finding refers to.
    pub fn with_location(
        mut self,
        language: Option<String>,
        source_excerpt: Option<String>,
        code_snippet: Option<String>,
        start_line: Option<u32>,
        end_line: Option<u32>,
    ) -> Result<Self, String> {
        if let (Some(start), Some(end)) = (start_line, end_line) {
            if start > end {
                return Err(format!("start_line {start} > end_line {end}"));
            }
        }
        self.language = language;
        self.source_excerpt = source_excerpt;
        self.code_snippet = code_snippet;
        self.start_line = start_line;
        self.end_line = end_line;
        Ok(self)
    }
}

impl Record for AnalysisItem {
    fn id(&self) -> &str {
        &self.id
    }

    // Append-only: updated_at tracks the store's write clock via
    // created_at, since these records are never revised in place.
    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "analysis_items"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert(
            "file_analysis_id".to_string(),
            IndexValue::String(self.file_analysis_id.clone()),
        );
        fields.insert("kind".to_string(), IndexValue::String(self.kind.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_carries_its_parent_file_analysis() {
        let item = AnalysisItem::new("task-1", "fa-1", "dependency", "serde", "used for (de)serialization");
        assert_eq!(item.task_id, "task-1");
        assert_eq!(item.file_analysis_id, "fa-1");
    }

    #[test]
    fn with_location_accepts_ordered_range() {
        let item = AnalysisItem::new("task-1", "fa-1", "symbol", "Store", "persistence entry point")
            .with_location(Some("rust".to_string()), None, Some("struct Store { .. }".to_string()), Some(10), Some(20))
            .unwrap();
        assert_eq!(item.start_line, Some(10));
        assert_eq!(item.end_line, Some(20));
    }

    #[test]
    fn with_location_rejects_inverted_range() {
        let err = AnalysisItem::new("task-1", "fa-1", "symbol", "Store", "persistence entry point")
            .with_location(None, None, None, Some(20), Some(10))
            .unwrap_err();
        assert!(err.contains("start_line"));
    }

    #[test]
    fn indexed_fields_support_lookup_by_file_analysis() {
        let item = AnalysisItem::new("task-1", "fa-1", "symbol", "Store", "persistence entry point");
        let fields = item.indexed_fields();
        assert_eq!(
            fields.get("file_analysis_id"),
            Some(&IndexValue::String("fa-1".to_string()))
        );
    }
}
