use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::{now_ms, IndexValue, Record};
use uuid::Uuid;

/// Task status. Monotone except for the fixed `pending -> running ->
/// {completed, failed}` path (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                // re-entry: resuming a running task persists the same status
                | (TaskStatus::Running, TaskStatus::Running)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Tagged dispatch variant for the four pipeline stages (§9 design note:
/// no runtime registry, a single dispatcher matches on this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Scan,
    Index,
    Analyze,
    Document,
}

impl PipelineStage {
    pub fn as_step(self) -> u8 {
        match self {
            PipelineStage::Scan => 0,
            PipelineStage::Index => 1,
            PipelineStage::Analyze => 2,
            PipelineStage::Document => 3,
        }
    }

    pub fn from_step(step: u8) -> Option<Self> {
        match step {
            0 => Some(PipelineStage::Scan),
            1 => Some(PipelineStage::Index),
            2 => Some(PipelineStage::Analyze),
            3 => Some(PipelineStage::Document),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        PipelineStage::from_step(self.as_step() + 1)
    }
}

/// One end-to-end analysis run for a repository version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub repository_id: String,
    pub status: TaskStatus,
    pub current_step: PipelineStage,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,

    pub total_files: u32,
    pub successful_files: u32,
    pub failed_files: u32,
    pub code_lines: u64,
    pub module_count: u32,

    pub vector_index_name: Option<String>,
    pub current_file: Option<String>,

    pub analysis_total_files: u32,
    pub analysis_success_files: u32,
    pub analysis_failed_files: u32,

    pub document_job_handle: Option<String>,

    pub config: serde_json::Value,
    pub error_message: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(repository_id: impl Into<String>, config: serde_json::Value) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7().to_string(),
            repository_id: repository_id.into(),
            status: TaskStatus::Pending,
            current_step: PipelineStage::Scan,
            start_time: None,
            end_time: None,
            total_files: 0,
            successful_files: 0,
            failed_files: 0,
            code_lines: 0,
            module_count: 0,
            vector_index_name: None,
            current_file: None,
            analysis_total_files: 0,
            analysis_success_files: 0,
            analysis_failed_files: 0,
            document_job_handle: None,
            config,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Admission: pending -> running/step=0.
    pub fn admit(&mut self) -> Result<(), String> {
        if !self.status.can_transition_to(TaskStatus::Running) {
            return Err(format!("cannot admit task in status {}", self.status));
        }
        self.status = TaskStatus::Running;
        self.start_time = Some(now_ms());
        self.touch();
        Ok(())
    }

    /// Advance to the next stage. Enforces §8 invariant 5: `current_step`
    /// only increases until terminal.
    pub fn advance_stage(&mut self, stage: PipelineStage) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err("cannot advance stage on a terminal task".to_string());
        }
        if stage < self.current_step {
            return Err(format!(
                "stage regression: {:?} -> {:?} not allowed",
                self.current_step, stage
            ));
        }
        self.current_step = stage;
        self.touch();
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), String> {
        if !self.status.can_transition_to(TaskStatus::Completed) {
            return Err(format!("cannot complete task in status {}", self.status));
        }
        self.status = TaskStatus::Completed;
        self.end_time = Some(now_ms());
        self.touch();
        Ok(())
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) -> Result<(), String> {
        if !self.status.can_transition_to(TaskStatus::Failed) {
            return Err(format!("cannot fail task in status {}", self.status));
        }
        self.status = TaskStatus::Failed;
        self.end_time = Some(now_ms());
        self.error_message = Some(error_message.into());
        self.touch();
        Ok(())
    }

    /// Record the Scan stage's tally. Idempotent: callers re-running Scan
    /// after a crash pass the same (or larger, if new files appeared)
    /// total.
    pub fn set_scan_totals(&mut self, total_files: u32, code_lines: u64) {
        self.total_files = total_files;
        self.code_lines = code_lines;
        self.touch();
    }

    pub fn set_vector_index_name(&mut self, index_name: impl Into<String>) -> Result<(), String> {
        if self.current_step < PipelineStage::Index {
            return Err("vector_index_name requires Scan to have completed".to_string());
        }
        self.vector_index_name = Some(index_name.into());
        self.touch();
        Ok(())
    }

    pub fn set_analysis_totals(&mut self, total: u32) {
        self.analysis_total_files = total;
        self.touch();
    }

    /// Record one FileAnalysis reaching a terminal state during Analyze.
    /// Enforces §8 invariant 2: successful + failed <= total.
    pub fn record_file_outcome(&mut self, path: &str, success: bool) -> Result<(), String> {
        if self.successful_files + self.failed_files >= self.total_files {
            return Err("successful_files + failed_files would exceed total_files".to_string());
        }
        if success {
            self.successful_files += 1;
            self.analysis_success_files += 1;
        } else {
            self.failed_files += 1;
            self.analysis_failed_files += 1;
        }
        self.current_file = Some(path.to_string());
        self.touch();
        Ok(())
    }

    pub fn set_document_job_handle(&mut self, handle: impl Into<String>) {
        self.document_job_handle = Some(handle.into());
        self.touch();
    }

    /// Open Question (module_count): count distinct top-level directory
    /// components among the given file paths; a bare filename with no
    /// directory component counts as its own module.
    pub fn compute_module_count(paths: &[String]) -> u32 {
        let mut modules: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for path in paths {
            let top = path.split('/').next().unwrap_or(path);
            modules.insert(top);
        }
        modules.len() as u32
    }

    pub fn set_module_count(&mut self, module_count: u32) {
        self.module_count = module_count;
        self.touch();
    }

    pub fn is_analyze_complete(&self) -> bool {
        self.analysis_success_files + self.analysis_failed_files >= self.analysis_total_files
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert(
            "repository_id".to_string(),
            IndexValue::String(self.repository_id.clone()),
        );
        fields.insert(
            "created_at".to_string(),
            IndexValue::Int(self.created_at),
        );
        fields
    }
}
