//! External Adapters (C5): LLM, Vector Index, and Document-Generation.
//!
//! Each is a thin trait with a production-shaped implementation and a
//! local/deterministic one, so the crate can run the full pipeline
//! without any real external service.

pub mod docgen;
pub mod llm;
pub mod vector;

pub use docgen::{DocGenAdapter, DocGenStatus, LocalDocGenAdapter};
pub use llm::{AnthropicLlmAdapter, CompletionRequest, CompletionResponse, LlmAdapter, Message, MockLlmAdapter, TokenUsage};
pub use vector::VectorAdapter;
