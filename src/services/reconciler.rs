use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::db::{JobStore, PersistenceError};
use crate::models::job::{JobStatus, PrintJob};
use crate::services::pipeline::PipelineError;

/// Writes the terminal status of a processed job and cleans up after it.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Mark the job printed and remove its temporary raster.
    ///
    /// If the status write fails the job stays in `processing` and the file
    /// is left in place. If the claim was superseded the newer claim owns
    /// the row and the file, so neither is touched.
    pub async fn printed(&self, job: &PrintJob, output: &Path) -> Result<bool, PersistenceError> {
        let updated = self
            .store
            .finish(job.id, job.attempts, JobStatus::Printed, None, None)
            .await
            .inspect_err(|e| {
                error!(job_id = %job.id, error = %e, "Failed to mark job printed");
            })?;
        if !updated {
            warn!(
                job_id = %job.id,
                attempt = job.attempts,
                "Claim superseded before the job was marked printed"
            );
            return Ok(false);
        }

        match tokio::fs::remove_file(output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                job_id = %job.id,
                output = %output.display(),
                error = %e,
                "Failed to remove printed sticker"
            ),
        }

        metrics::counter!("sticker_jobs_printed_total").increment(1);
        info!(job_id = %job.id, order_id = %job.order_id, "Job printed");
        Ok(true)
    }

    /// Mark the job failed, keeping `output` (if any) for inspection.
    pub async fn failed(
        &self,
        job: &PrintJob,
        failure: &PipelineError,
        output: Option<&Path>,
    ) -> Result<bool, PersistenceError> {
        let stage = failure.stage();
        let stage_label: &'static str = stage.into();
        error!(
            job_id = %job.id,
            order_id = %job.order_id,
            stage = stage_label,
            error = %failure,
            "Print job failed"
        );
        metrics::counter!("sticker_jobs_failed_total", "stage" => stage_label).increment(1);

        let message = failure.to_string();
        let output = output.map(|p| p.to_string_lossy().into_owned());
        let updated = self
            .store
            .finish(
                job.id,
                job.attempts,
                JobStatus::Failed,
                Some(&message),
                output.as_deref(),
            )
            .await
            .inspect_err(|e| {
                error!(job_id = %job.id, error = %e, "Failed to mark job failed");
            })?;
        if !updated {
            warn!(
                job_id = %job.id,
                attempt = job.attempts,
                "Claim superseded before the job was marked failed"
            );
        }
        Ok(updated)
    }
}
