//! Stage 3 — Document: submit the repository to the Document-Generation
//! adapter and poll until it reports completion, failure, or timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::adapters::{DocGenAdapter, DocGenStatus};
use crate::config::DocConfig;
use crate::error::OrchestratorError;

pub enum DocumentOutcome {
    Completed { markdown: String },
    Failed { reason: String },
    TimedOut,
}

/// Poll bound ≤ `config.max_total_ms`; previously persisted FileAnalyses
/// and AnalysisItems are untouched regardless of the outcome here.
pub async fn run(docgen: &dyn DocGenAdapter, local_path: &str, config: &DocConfig) -> Result<DocumentOutcome, OrchestratorError> {
    let job_id = docgen.submit(local_path, &HashMap::new()).await?;
    let deadline = Instant::now() + Duration::from_millis(config.max_total_ms);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    loop {
        match docgen.poll(&job_id).await? {
            DocGenStatus::Complete { markdown } => return Ok(DocumentOutcome::Completed { markdown }),
            DocGenStatus::Failed { error } => {
                warn!(%error, "document generation reported failure");
                return Ok(DocumentOutcome::Failed { reason: error });
            }
            DocGenStatus::Progressing { percent, current_stage } => {
                debug!(percent, %current_stage, "document generation in progress");
                if Instant::now() >= deadline {
                    return Ok(DocumentOutcome::TimedOut);
                }
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
