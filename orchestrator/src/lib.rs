//! Orchestrator - automated repository analysis pipeline.
//!
//! Given an uploaded repository, the orchestrator scans its files, builds
//! a semantic vector index over them, analyzes each file with an LLM, and
//! generates a project README, all as one resumable [`domain::Task`].
//!
//! # Core Concepts
//!
//! - **Resumable by construction**: a task's `status` and `current_step`
//!   fully describe where it is; re-driving it after a crash picks up
//!   exactly where it left off.
//! - **State in the TaskStore**: progress persists via the generic
//!   `taskstore` crate, not in process memory.
//! - **External services behind adapters**: the LLM, vector index, and
//!   document generator are each a trait with a local/deterministic
//!   implementation, so the whole pipeline runs without real network
//!   dependencies.
//!
//! # Modules
//!
//! - [`domain`] - persisted record types (Task, Repository, FileAnalysis, ...)
//! - [`store`] - the TaskStore actor wrapping `taskstore::Store`
//! - [`admission`] - FIFO admission queue gating concurrent tasks
//! - [`pipeline`] - the Scan/Index/Analyze/Document stage driver
//! - [`workers`] - the bounded worker pool used by the Analyze stage
//! - [`adapters`] - LLM, Vector Index, and Document-Generation adapters
//! - [`progress`] - derives a task's displayable progress
//! - [`health`] - queue depth and worker health introspection
//! - [`config`] - configuration types and loading
//! - [`orchestrator`] - top-level admission loop and task lifecycle
//! - [`cli`] - command-line interface

#![allow(dead_code)]

pub mod adapters;
pub mod admission;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod workers;

pub mod orchestrator;

pub use adapters::{
    AnthropicLlmAdapter, CompletionRequest, CompletionResponse, DocGenAdapter, DocGenStatus, LlmAdapter,
    LocalDocGenAdapter, Message, MockLlmAdapter, TokenUsage, VectorAdapter,
};
pub use admission::{AdmissionQueue, AdmissionResult};
pub use config::Config;
pub use domain::{
    AnalysisItem, FileAnalysis, FileAnalysisStatus, PipelineStage, ReadmeArtifact, Repository, RepositoryStatus, Task,
    TaskStatus,
};
pub use error::OrchestratorError;
pub use health::{HealthMonitor, HealthReport, WorkerHealth};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use pipeline::{DocumentOutcome, PipelineDriver};
pub use progress::{derive_progress, Progress, ProgressStep};
pub use store::{TaskStore, TaskStoreError};
pub use workers::{CancellationToken, RateLimiter, WorkerPool};
