use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::services::pipeline::{Outcome, PrintPipeline};

/// Runs print jobs from the feed with bounded concurrency.
pub struct WorkerPool {
    pipeline: Arc<PrintPipeline>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(pipeline: Arc<PrintPipeline>, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    /// Drain `jobs` until every sender is gone, then wait for in-flight work.
    pub async fn run(self, mut jobs: mpsc::Receiver<Uuid>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        info!(concurrency = self.concurrency, "Worker pool started");

        while let Some(job_id) = jobs.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let pipeline = self.pipeline.clone();
            tasks.spawn(async move {
                let _permit = permit;
                run_one(&pipeline, job_id).await
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        info!("Worker pool drained");
    }
}

async fn run_one(pipeline: &PrintPipeline, job_id: Uuid) -> Option<Outcome> {
    match pipeline.process(job_id).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            // The job keeps its current status; the reaper picks it up later.
            error!(%job_id, error = %e, "Job status could not be persisted");
            None
        }
    }
}

fn log_join(joined: Result<Option<Outcome>, tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Print task panicked");
    }
}
