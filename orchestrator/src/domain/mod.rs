//! Domain types for the Analysis Orchestrator.
//!
//! Repository, Task, FileAnalysis, AnalysisItem, ReadmeArtifact — each
//! implements taskstore's `Record` trait so the generic `Store` can persist
//! it without a bespoke schema.

mod analysis_item;
mod file_analysis;
mod readme;
mod repository;
mod task;

pub use analysis_item::AnalysisItem;
pub use file_analysis::{FileAnalysis, FileAnalysisStatus};
pub use readme::ReadmeArtifact;
pub use repository::{Repository, RepositoryStatus};
pub use task::{PipelineStage, Task, TaskStatus};

// Re-export taskstore types for convenience at call sites.
pub use taskstore::{Filter, FilterOp, IndexValue, Record, Store};
