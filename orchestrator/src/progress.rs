//! Progress Publisher (C6) — a pure derivation from [`Task`] state, no
//! side effects and no I/O, so the same task always reports the same
//! progress regardless of who's asking or when.

use serde::Serialize;

use crate::domain::{PipelineStage, Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    Queued,
    Scan,
    Index,
    Analyze,
    Document,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub step: ProgressStep,
    pub percent: f64,
    pub current_file: Option<String>,
}

/// Derive UI progress from task state per the fixed rules:
/// - pending -> queued, 0%.
/// - running + Scan incomplete -> Scan, 0-25% by file ratio.
/// - vector_index_name unset -> Index, 25%.
/// - Analyze incomplete -> Analyze, 25-75% by analysis ratio.
/// - else -> Document, 75-100% by `doc_progress_percent` (0-100 from the
///   last docgen poll; defaults to 0 before the first poll).
/// - completed -> 100%. failed -> percent frozen at last computed value.
pub fn derive_progress(task: &Task, doc_progress_percent: u8) -> Progress {
    if task.status == TaskStatus::Pending {
        return Progress {
            step: ProgressStep::Queued,
            percent: 0.0,
            current_file: None,
        };
    }

    let (step, percent) = if task.status == TaskStatus::Failed {
        frozen_progress(task, doc_progress_percent)
    } else if task.status == TaskStatus::Completed {
        (ProgressStep::Document, 100.0)
    } else if task.total_files > 0 && task.successful_files < task.total_files {
        let ratio = task.successful_files as f64 / task.total_files as f64;
        (ProgressStep::Scan, ratio * 25.0)
    } else if task.vector_index_name.is_none() {
        (ProgressStep::Index, 25.0)
    } else if task.analysis_total_files > 0 && task.analysis_success_files < task.analysis_total_files {
        let ratio = task.analysis_success_files as f64 / task.analysis_total_files as f64;
        (ProgressStep::Analyze, 25.0 + ratio * 50.0)
    } else {
        let ratio = doc_progress_percent as f64 / 100.0;
        (ProgressStep::Document, 75.0 + ratio * 25.0)
    };

    Progress {
        step,
        percent,
        current_file: task.current_file.clone(),
    }
}

/// Best-effort reconstruction of "last-known" step/percent for a failed
/// task, used only to freeze the display — the task's own `current_step`
/// records which stage it was in at the moment of failure.
fn frozen_progress(task: &Task, doc_progress_percent: u8) -> (ProgressStep, f64) {
    match task.current_step {
        PipelineStage::Scan => {
            let ratio = if task.total_files > 0 {
                task.successful_files as f64 / task.total_files as f64
            } else {
                0.0
            };
            (ProgressStep::Scan, ratio * 25.0)
        }
        PipelineStage::Index => (ProgressStep::Index, 25.0),
        PipelineStage::Analyze => {
            let ratio = if task.analysis_total_files > 0 {
                task.analysis_success_files as f64 / task.analysis_total_files as f64
            } else {
                0.0
            };
            (ProgressStep::Analyze, 25.0 + ratio * 50.0)
        }
        PipelineStage::Document => {
            let ratio = doc_progress_percent as f64 / 100.0;
            (ProgressStep::Document, 75.0 + ratio * 25.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_task() -> Task {
        Task::new("repo-1", json!({}))
    }

    #[test]
    fn pending_task_is_queued_at_zero() {
        let task = base_task();
        let progress = derive_progress(&task, 0);
        assert_eq!(progress.step, ProgressStep::Queued);
        assert_eq!(progress.percent, 0.0);
    }

    #[test]
    fn scanning_task_scales_within_first_quarter() {
        let mut task = base_task();
        task.admit().unwrap();
        task.set_scan_totals(4, 100);
        task.record_file_outcome("a.rs", true).unwrap();
        let progress = derive_progress(&task, 0);
        assert_eq!(progress.step, ProgressStep::Scan);
        assert!((progress.percent - 6.25).abs() < 1e-9);
    }

    #[test]
    fn index_stage_reports_flat_25_percent() {
        let mut task = base_task();
        task.admit().unwrap();
        task.set_scan_totals(0, 0);
        task.advance_stage(PipelineStage::Index).unwrap();
        let progress = derive_progress(&task, 0);
        assert_eq!(progress.step, ProgressStep::Index);
        assert_eq!(progress.percent, 25.0);
    }

    #[test]
    fn analyze_stage_scales_between_25_and_75() {
        let mut task = base_task();
        task.admit().unwrap();
        task.set_scan_totals(0, 0);
        task.advance_stage(PipelineStage::Index).unwrap();
        task.set_vector_index_name("ix").unwrap();
        task.advance_stage(PipelineStage::Analyze).unwrap();
        task.set_analysis_totals(2);
        task.analysis_success_files = 1;
        let progress = derive_progress(&task, 0);
        assert_eq!(progress.step, ProgressStep::Analyze);
        assert_eq!(progress.percent, 50.0);
    }

    #[test]
    fn completed_task_is_always_100_percent() {
        let mut task = base_task();
        task.admit().unwrap();
        task.mark_completed().unwrap();
        let progress = derive_progress(&task, 0);
        assert_eq!(progress.percent, 100.0);
    }
}
